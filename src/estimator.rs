//! Power-spectrum estimator interface
//!
//! Pseudo-spectrum estimation from sky maps (mask apodization, mode coupling,
//! band binning) is left to external libraries. They plug in through
//! [`PowerSpectrumEstimator`], and [`cross_spectrum_matrix`] assembles the
//! per-pair estimates of a multi-channel measurement into the (L, F, F)
//! cross spectrum that [`crate::Separator`] consumes.

use ndarray::Array3;

/// Sky field handed to an estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// Scalar (temperature-like) map
    Scalar(&'a [f64]),
    /// Spin-2 polarisation map given as Q and U
    Spin2 { q: &'a [f64], u: &'a [f64] },
    /// Scalar and spin-2 maps of the same sky
    Full {
        t: &'a [f64],
        q: &'a [f64],
        u: &'a [f64],
    },
}

impl Field<'_> {
    /// Number of spectra an estimate of this field carries
    ///
    /// `Scalar` gives TT, `Spin2` gives EE and BB, `Full` gives TT, EE and BB.
    pub fn spectra(&self) -> usize {
        match self {
            Field::Scalar(_) => 1,
            Field::Spin2 { .. } => 2,
            Field::Full { .. } => 3,
        }
    }

    fn same_kind(&self, other: &Field<'_>) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Band-power estimate for one pair of fields: `(modes, spectrum[, ...])`
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatedSpectra {
    /// Integer mode label of every row
    pub modes: Vec<usize>,
    /// One spectrum per component, each as long as `modes`
    pub spectra: Vec<Vec<f64>>,
}

/// Pseudo-power-spectrum estimator
///
/// Implementors carry their own settings (apodization scale, band width).
/// `cross` must return the same modes for every pair of fields with the same
/// pixelisation.
pub trait PowerSpectrumEstimator {
    type Error: std::error::Error + 'static;

    /// Cross spectra of two fields of the same kind
    fn cross(
        &self,
        a: &Field<'_>,
        b: &Field<'_>,
        mask: Option<&[f64]>,
    ) -> Result<EstimatedSpectra, Self::Error>;

    /// Auto spectra of one field
    fn auto(&self, field: &Field<'_>, mask: Option<&[f64]>) -> Result<EstimatedSpectra, Self::Error> {
        self.cross(field, field, mask)
    }
}

/// Errors raised while assembling a cross-spectrum matrix
#[derive(Debug, thiserror::Error)]
pub enum EstimateError<E: std::error::Error + 'static> {
    #[error("No fields supplied")]
    NoFields,
    #[error("Field of channel {channel} differs in kind from channel 0")]
    MixedFields { channel: usize },
    #[error("Component {component} requested but the fields carry {available} spectra")]
    MissingComponent { component: usize, available: usize },
    #[error("Estimator failed for channels ({a}, {b})")]
    Estimator {
        a: usize,
        b: usize,
        #[source]
        source: E,
    },
    #[error("Channels ({a}, {b}) returned modes different from channels (0, 0)")]
    InconsistentModes { a: usize, b: usize },
    #[error("Channels ({a}, {b}) returned {actual} spectra for {modes} modes, expected {expected} spectra of matching length")]
    MalformedEstimate {
        a: usize,
        b: usize,
        expected: usize,
        actual: usize,
        modes: usize,
    },
}

/// Estimate all channel pairs and stack `component` into shape (L, F, F)
///
/// The diagonal uses [`PowerSpectrumEstimator::auto`], the off-diagonal
/// entries [`PowerSpectrumEstimator::cross`] for `i < j`, mirrored to `j > i`.
/// Returns the mode labels of the rows with the matrix, ready for
/// `Separator::builder(matrix, lbin).modes(modes)`.
pub fn cross_spectrum_matrix<P: PowerSpectrumEstimator>(
    estimator: &P,
    fields: &[Field<'_>],
    mask: Option<&[f64]>,
    component: usize,
) -> Result<(Vec<usize>, Array3<f64>), EstimateError<P::Error>> {
    let first = fields.first().ok_or(EstimateError::NoFields)?;
    if let Some(channel) = fields.iter().position(|f| !f.same_kind(first)) {
        return Err(EstimateError::MixedFields { channel });
    }
    let available = first.spectra();
    if component >= available {
        return Err(EstimateError::MissingComponent {
            component,
            available,
        });
    }

    let nf = fields.len();
    let mut modes: Vec<usize> = Vec::new();
    let mut matrix = Array3::<f64>::zeros((0, nf, nf));

    for a in 0..nf {
        for b in a..nf {
            let estimate = if a == b {
                estimator.auto(&fields[a], mask)
            } else {
                estimator.cross(&fields[a], &fields[b], mask)
            }
            .map_err(|source| EstimateError::Estimator { a, b, source })?;

            if estimate.spectra.len() != available
                || estimate.spectra.iter().any(|s| s.len() != estimate.modes.len())
            {
                return Err(EstimateError::MalformedEstimate {
                    a,
                    b,
                    expected: available,
                    actual: estimate.spectra.len(),
                    modes: estimate.modes.len(),
                });
            }

            // (0, 0) comes first and fixes the rows
            if a == 0 && b == 0 {
                matrix = Array3::zeros((estimate.modes.len(), nf, nf));
                modes = estimate.modes;
            } else if estimate.modes != modes {
                return Err(EstimateError::InconsistentModes { a, b });
            }

            for (l, &value) in estimate.spectra[component].iter().enumerate() {
                matrix[[l, a, b]] = value;
                matrix[[l, b, a]] = value;
            }
        }
    }

    log::debug!(
        "assembled {} channel cross spectrum with {} modes",
        nf,
        matrix.len_of(ndarray::Axis(0))
    );
    Ok((modes, matrix))
}
