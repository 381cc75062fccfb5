//! Windowed smoothing and denoising filters over planar video frames.

pub mod boundary;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod filter;
pub mod filters;
pub mod logging;
pub mod params;
pub mod registry;
pub mod sample;
pub mod source;
pub mod types;
pub mod window;

#[cfg(test)]
pub(crate) mod test_support;
