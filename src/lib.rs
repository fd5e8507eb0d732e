//! # abs-rust: Analytical method of Blind Separation
//!
//! Blind reconstruction of the angular power spectrum of a single target
//! component (e.g. the CMB) from the cross power spectra of a multi-frequency
//! measurement, without a spectral model of the contaminants.
//! See arXiv:1608.03707 for the method.

pub mod binning; // Angular-mode binning and Cl -> Dl conversion
pub mod eigen;
pub mod error;
pub mod estimator; // Pluggable pseudo-spectrum estimators
pub mod observables; // Keyed map/mask/spectrum archives
pub mod separator;

pub use binning::{band_power_factor, BandPowerWeighting, BinLayout, Binning};
pub use eigen::{eigen_decompose, eigen_decompose_above, EigenDecomposition, EigenError};
pub use error::SeparatorError;
pub use estimator::{
    cross_spectrum_matrix, EstimateError, EstimatedSpectra, Field, PowerSpectrumEstimator,
};
pub use observables::{ArchiveError, ArchiveKind, ObservableArchive, ObservableKey};
pub use separator::{
    BinEstimate, SeparationResult, Separator, SeparatorBuilder, SeparatorConfig,
    DEFAULT_CUT, DEFAULT_SHIFT,
};

// Re-export external dependencies for convenience
pub use nalgebra;
pub use ndarray;

// Test utilities (only available in test mode)
#[cfg(test)]
pub mod test_utils;
