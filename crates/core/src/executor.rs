use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::FilterStep;
use crate::filter::FilterInputs;
use crate::registry::FilterRegistry;
use crate::source::ClipSource;
use crate::types::Frame;

/// Clip id under which a job's source clip is reachable.
pub const INPUT_CLIP_ID: &str = "input";
/// Clip role that overrides a step's main input.
pub const MAIN_CLIP_ROLE: &str = "clip";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl FrameSink for Box<dyn FrameSink> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Pulls every frame of a clip in order and hands it to a sink.
///
/// In parallel mode frames are requested in batches across the rayon pool;
/// the sink still receives them in frame order.
pub struct ClipExecutor {
    mode: ExecutionMode,
    chunk_size: usize,
}

impl ClipExecutor {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            chunk_size: 0,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    fn effective_chunk_size(&self) -> usize {
        match (self.mode, self.chunk_size) {
            (ExecutionMode::Sequential, 0) => 16,
            (ExecutionMode::Parallel, 0) => rayon::current_num_threads().max(1) * 2,
            (_, size) => size,
        }
    }

    /// Returns the number of frames written.
    pub fn run(&self, clip: &dyn ClipSource, sink: &mut dyn FrameSink) -> Result<usize> {
        let total = clip.info().num_frames;
        let chunk_size = self.effective_chunk_size();
        let started = Instant::now();
        info!(
            clip = clip.name(),
            frames = total,
            mode = ?self.mode,
            chunk_size,
            "starting clip execution"
        );

        let mut written = 0usize;
        let mut start = 0usize;
        while start < total {
            let end = (start + chunk_size).min(total);
            let frames = match self.mode {
                ExecutionMode::Sequential => (start..end)
                    .map(|n| render_frame(clip, n))
                    .collect::<Result<Vec<_>>>()?,
                ExecutionMode::Parallel => (start..end)
                    .into_par_iter()
                    .map(|n| render_frame(clip, n))
                    .collect::<Result<Vec<_>>>()?,
            };

            for (offset, frame) in frames.iter().enumerate() {
                sink.write_frame(frame)
                    .with_context(|| format!("failed to write frame {}", start + offset))?;
            }
            written += frames.len();
            info!(done = written, total, "processed frames");
            start = end;
        }

        sink.finish().context("failed to finish output")?;
        info!(
            frames = written,
            elapsed_ms = format!("{:.0}", started.elapsed().as_secs_f64() * 1000.0),
            "clip execution finished"
        );
        Ok(written)
    }

    pub fn collect(&self, clip: &dyn ClipSource) -> Result<Vec<Frame>> {
        let mut frames = Vec::with_capacity(clip.info().num_frames);
        self.run(clip, &mut frames)?;
        Ok(frames)
    }
}

fn render_frame(clip: &dyn ClipSource, n: usize) -> Result<Arc<Frame>> {
    clip.get_frame(n)
        .with_context(|| format!("failed to render frame {n} of '{}'", clip.name()))
}

/// Chain the configured steps onto `input` and return the last step's clip.
pub fn build_pipeline(
    registry: &FilterRegistry,
    input: Arc<dyn ClipSource>,
    steps: &[FilterStep],
) -> Result<Arc<dyn ClipSource>> {
    let mut clips: HashMap<String, Arc<dyn ClipSource>> = HashMap::new();
    clips.insert(INPUT_CLIP_ID.to_string(), input.clone());
    let mut current = input;

    for (index, step) in steps.iter().enumerate() {
        let step_id = step.step_id(index);
        if clips.contains_key(&step_id) {
            bail!("duplicate step id '{step_id}'");
        }

        let main = match step.clips.get(MAIN_CLIP_ROLE) {
            Some(reference) => lookup_clip(&clips, &step_id, reference)?,
            None => current.clone(),
        };
        let mut inputs = FilterInputs::new(main, step.params.clone());
        for (role, reference) in &step.clips {
            if role != MAIN_CLIP_ROLE {
                inputs = inputs.with_clip(role, lookup_clip(&clips, &step_id, reference)?);
            }
        }

        let filter = registry
            .create(&step.name, &inputs)
            .with_context(|| format!("failed to configure step '{step_id}' ({})", step.name))?;
        debug!(step = %step_id, filter = %step.name, "configured pipeline step");

        clips.insert(step_id, filter.clone());
        current = filter;
    }

    info!(steps = steps.len(), "pipeline ready");
    Ok(current)
}

fn lookup_clip(
    clips: &HashMap<String, Arc<dyn ClipSource>>,
    step_id: &str,
    reference: &str,
) -> Result<Arc<dyn ClipSource>> {
    clips
        .get(reference)
        .cloned()
        .ok_or_else(|| anyhow!("step '{step_id}' references unknown clip '{reference}'"))
}
