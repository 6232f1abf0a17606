//! Error type for bundling runs and snapshot I/O.

use thiserror::Error;

/// Result alias used across the crate.
pub type BundleResult<T> = std::result::Result<T, BundleError>;

/// Everything that can stop a bundling run.
///
/// Configuration problems are reported before any computation starts, so a
/// failed call never leaves partial output behind. Degenerate edges
/// (self-loops, zero length) are not errors: they pass through as straight
/// segments.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BundleError {
    /// An edge references a node id that has no coordinates.
    #[error("edge {edge} references node `{node}` which has no coordinates")]
    MissingNode { edge: usize, node: String },

    /// Two nodes share one id.
    #[error("node `{0}` is defined more than once")]
    DuplicateNode(String),

    /// A node position is NaN or infinite.
    #[error("node `{node}` has non-finite coordinates")]
    NonFiniteCoordinate { node: String },

    /// Edge weights must be finite and non-negative.
    #[error("edge {edge} has invalid weight {weight}")]
    InvalidWeight { edge: usize, weight: f32 },

    /// A configuration option is out of range.
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption { option: &'static str, reason: String },

    /// The run was cancelled between passes.
    #[error("bundling cancelled after {completed} of {total} passes")]
    Cancelled { completed: usize, total: usize },

    /// A relaxed polyline contained NaN or infinity.
    #[error("edge {edge} produced non-finite coordinates")]
    NonFiniteResult { edge: usize },

    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),

    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TomlError: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BundleError {
    /// True for errors caused by the caller's graph or options.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BundleError::MissingNode { .. }
                | BundleError::DuplicateNode(_)
                | BundleError::NonFiniteCoordinate { .. }
                | BundleError::InvalidWeight { .. }
                | BundleError::InvalidOption { .. }
        )
    }

    pub(crate) fn option(option: &'static str, reason: impl Into<String>) -> Self {
        BundleError::InvalidOption {
            option,
            reason: reason.into(),
        }
    }
}
