use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use framesmooth_core::config::{data_dir, JobConfig};
use framesmooth_core::executor::{build_pipeline, ClipExecutor, ExecutionMode};
use framesmooth_core::filter::ParamDefinition;
use framesmooth_core::logging::{self, FileSinkPlan, LoggingInitOptions, DEFAULT_LOG_FILTER};
use framesmooth_core::registry::{build_default_registry, FilterRegistry};

pub mod raw;

use raw::{read_raw_clip, RawFrameWriter};

#[derive(Parser)]
#[command(name = "framesmooth", about = "Windowed smoothing and denoising for raw planar video")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true, help = "Directory for persistent logs")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a TOML job file.
    Run(RunArgs),
    /// List registered filters and their parameters.
    List,
}

#[derive(Args)]
struct RunArgs {
    #[arg(help = "Path to job TOML file")]
    job: PathBuf,
    #[arg(short = 'i', long, help = "Override input path in the job")]
    input: Option<PathBuf>,
    #[arg(short = 'o', long, help = "Override output path in the job")]
    output: Option<PathBuf>,
    #[arg(long, value_parser = parse_mode, help = "Override execution mode (sequential|parallel)")]
    mode: Option<ExecutionMode>,
}

fn parse_mode(value: &str) -> Result<ExecutionMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "sequential" => Ok(ExecutionMode::Sequential),
        "parallel" => Ok(ExecutionMode::Parallel),
        other => Err(format!("unknown execution mode '{other}'")),
    }
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());
    init_logging(
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
    );
    info!(
        pid = std::process::id(),
        data_dir = %resolved_data_dir.display(),
        "framesmooth starting"
    );

    run_command(&build_default_registry(), cli.command)
}

fn run_command(registry: &FilterRegistry, command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => {
            run_job(registry, args.job, args.input, args.output, args.mode)?;
        }
        Commands::List => print!("{}", describe_filters(registry)),
    }
    Ok(())
}

fn init_logging(data_dir: Option<&Path>, verbose: u8, cli_log_filter: Option<&str>) {
    let init_options = LoggingInitOptions {
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let init_plan = logging::compose_logging_init_plan(&init_options);
    let filter = init_plan.filter;

    match init_plan.file_sink {
        FileSinkPlan::Ready(ready) => {
            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(parse_env_filter_with_fallback(&filter, "console")),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(ready.appender)
                        .with_filter(parse_env_filter_with_fallback(&filter, "file")),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let attempted_log_dir = fallback
                .attempted_log_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<none>".to_string());

            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(parse_env_filter_with_fallback(&filter, "console")),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }

            warn!(
                attempted_log_dir = %attempted_log_dir,
                reason = %fallback.reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

/// Load a job, apply command-line overrides, run it, and return frames written.
pub fn run_job(
    registry: &FilterRegistry,
    job_path: PathBuf,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    mode: Option<ExecutionMode>,
) -> Result<usize> {
    info!("Loading job: {}", job_path.display());
    let mut job = JobConfig::load_from_path(&job_path)?;
    if let Some(input) = input {
        job.input.path = input;
    }
    if let Some(output) = output {
        job.output.path = Some(output);
    }
    if let Some(mode) = mode {
        job.execution.mode = mode;
    }
    execute_job(registry, &job)
}

pub fn execute_job(registry: &FilterRegistry, job: &JobConfig) -> Result<usize> {
    let output_path = job
        .output
        .path
        .as_deref()
        .context("no output path: set [output] path in the job or pass -o")?;
    let format = job.video_format()?;
    let input = read_raw_clip(&job.input.path, format, job.input.width, job.input.height)?;

    let pipeline = build_pipeline(registry, std::sync::Arc::new(input), &job.filters)
        .context("failed to build filter chain")?;
    let mut writer = RawFrameWriter::create(output_path)?;

    let started = Instant::now();
    let written = ClipExecutor::new(job.execution.mode)
        .with_chunk_size(job.execution.chunk_size)
        .run(pipeline.as_ref(), &mut writer)
        .context("job execution failed")?;

    info!(
        frames = written,
        output = %output_path.display(),
        elapsed = %format_duration(started.elapsed().as_secs_f64()),
        "Job completed successfully"
    );
    Ok(written)
}

/// One line per filter, parameters indented below it.
pub fn describe_filters(registry: &FilterRegistry) -> String {
    let mut out = String::new();
    for filter_type in registry.list_filter_types() {
        out.push_str(filter_type);
        out.push('\n');
        for definition in registry.definitions(filter_type).unwrap_or_default() {
            out.push_str(&format!("  {}\n", describe_param(definition)));
        }
    }
    out
}

fn describe_param(definition: &ParamDefinition) -> String {
    let kind = format!("{:?}", definition.param_type);
    match (&definition.default_value, definition.required) {
        (_, true) => format!("{} ({kind}, required)", definition.name),
        (Some(default), false) => format!("{} ({kind}) = {default}", definition.name),
        (None, false) => format!("{} ({kind})", definition.name),
    }
}

fn format_duration(secs: f64) -> String {
    let total = secs as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
