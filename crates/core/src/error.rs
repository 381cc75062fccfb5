use thiserror::Error;

/// Failures surfaced by filter configuration and per-frame processing.
///
/// Configuration errors (`InvalidParameter`, `InvalidPlaneIndex`, clip
/// `FormatMismatch`) are raised when a filter is constructed; the rest are
/// raised by `get_frame`. A failing call never produces a partial frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("plane index {index} does not exist (frame has {plane_count} plane(s))")]
    InvalidPlaneIndex { index: i64, plane_count: usize },
    #[error("format mismatch: {0}")]
    FormatMismatch(String),
    #[error("clip `{clip}` could not supply frame {frame}")]
    MissingNeighborFrame { clip: String, frame: usize },
    #[error("unknown filter type: {0}")]
    UnknownFilter(String),
}

pub type FilterResult<T> = std::result::Result<T, FilterError>;

impl FilterError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
