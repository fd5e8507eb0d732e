//! Error types for the separator engine

use crate::eigen::EigenError;

/// Errors raised while building or running a [`Separator`](crate::Separator)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeparatorError {
    /// Invalid construction input (shapes, bin count, shift/cut, noise pairing)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Binning input whose shape disagrees with the configured layout
    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// No eigenmode of the bin cleared the cut, so the accumulated sum vanished
    #[error("Degenerate bin {bin} (effective mode {mode}): no eigenmode above cut")]
    DegenerateBin { bin: usize, mode: f64 },

    /// Binned noise RMS that cannot be used for whitening
    #[error("Non-positive binned noise RMS {value} in bin {bin}, channel {channel}")]
    NonPositiveNoise {
        bin: usize,
        channel: usize,
        value: f64,
    },

    /// Eigendecomposition of a bin failed
    #[error("Eigendecomposition failed in bin {bin}: {source}")]
    Eigen {
        bin: usize,
        #[source]
        source: EigenError,
    },
}

impl SeparatorError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SeparatorError::Configuration(msg.into())
    }
}
