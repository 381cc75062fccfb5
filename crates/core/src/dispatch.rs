use rayon::prelude::*;

use crate::error::FilterResult;
use crate::sample::Plane;
use crate::types::Frame;

/// Build an output frame plane by plane.
///
/// Planes whose `process` entry is `false` (or missing) are copied verbatim;
/// the others are produced by `f(plane_index, source_plane)`. Planes run in
/// parallel. Frame properties are carried over from `src`.
pub fn dispatch_planes<F>(src: &Frame, process: &[bool], f: F) -> FilterResult<Frame>
where
    F: Fn(usize, &Plane) -> FilterResult<Plane> + Sync,
{
    let planes = src
        .planes
        .par_iter()
        .enumerate()
        .map(|(index, plane)| {
            if process.get(index).copied().unwrap_or(false) {
                f(index, plane)
            } else {
                Ok(plane.clone())
            }
        })
        .collect::<FilterResult<Vec<_>>>()?;

    Ok(Frame {
        format: src.format,
        planes,
        props: src.props.clone(),
    })
}

pub fn any_selected(process: &[bool]) -> bool {
    process.iter().any(|selected| *selected)
}
