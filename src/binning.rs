//! Angular-mode binning and Cl → Dl conversion
//!
//! The sample of `N` modes is split into `B` contiguous bins whose sizes differ
//! by at most one; the `N mod B` leading bins carry the extra element. Binned
//! quantities are band powers, i.e. spectra weighted by `l(l+1)/2π` before
//! (or, with [`BandPowerWeighting::BinCentre`], after) averaging.

use crate::error::SeparatorError;
use ndarray::{Array, Array2, Array3, ArrayView, ArrayView2, ArrayView3, Axis, RemoveAxis};
use std::f64::consts::PI;
use std::ops::Range;

/// How the `l(l+1)/2π` factor enters the bin average
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandPowerWeighting {
    /// Weight every mode by its own factor, then average
    #[default]
    PerMode,
    /// Average first, then weight by the factor at the bin's effective mode
    BinCentre,
}

/// Band-power conversion factor `0.5 l (l + 1) / π`
#[inline]
pub fn band_power_factor(l: f64) -> f64 {
    0.5 * l * (l + 1.0) / PI
}

/// Partition of `sample_size` consecutive rows into `bins` contiguous ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinLayout {
    sample_size: usize,
    bins: usize,
}

impl BinLayout {
    /// Create a layout; requires `0 < bins <= sample_size`
    pub fn new(sample_size: usize, bins: usize) -> Result<Self, SeparatorError> {
        if bins == 0 || bins > sample_size {
            return Err(SeparatorError::config(format!(
                "lbin must be in (0, {}], got {}",
                sample_size, bins
            )));
        }
        Ok(Self { sample_size, bins })
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Half-open row range of bin `i`
    pub fn range(&self, i: usize) -> Range<usize> {
        let res = self.sample_size % self.bins;
        let quot = self.sample_size / self.bins;
        let begin = res.min(i) + i * quot;
        let end = res.min(i) + (i + 1) * quot + usize::from(i < res);
        begin..end
    }

    /// All bin ranges in order
    pub fn ranges(&self) -> Vec<Range<usize>> {
        (0..self.bins).map(|i| self.range(i)).collect()
    }

    /// Number of rows in each bin
    pub fn sizes(&self) -> Vec<usize> {
        self.ranges().into_iter().map(|r| r.len()).collect()
    }
}

/// Binning of per-mode spectra into band powers
///
/// Holds the mode labels of the sample (one per row), the bin layout and the
/// number of frequency channels every input must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Binning {
    layout: BinLayout,
    modes: Vec<usize>,
    channels: usize,
    weighting: BandPowerWeighting,
}

impl Binning {
    /// Create a binning over `modes` (one label per row) into `bins` bins
    pub fn new(
        modes: Vec<usize>,
        bins: usize,
        channels: usize,
        weighting: BandPowerWeighting,
    ) -> Result<Self, SeparatorError> {
        let layout = BinLayout::new(modes.len(), bins)?;
        Ok(Self {
            layout,
            modes,
            channels,
            weighting,
        })
    }

    pub fn layout(&self) -> &BinLayout {
        &self.layout
    }

    /// Mode labels of the sample rows
    pub fn modes(&self) -> &[usize] {
        &self.modes
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn weighting(&self) -> BandPowerWeighting {
        self.weighting
    }

    /// Effective mode of each bin: midpoint of its first and last label
    pub fn effective_modes(&self) -> Vec<f64> {
        self.layout
            .ranges()
            .into_iter()
            .map(|r| self.effective_mode(&r))
            .collect()
    }

    fn effective_mode(&self, range: &Range<usize>) -> f64 {
        0.5 * (self.modes[range.start] as f64 + self.modes[range.end - 1] as f64)
    }

    /// Bin a cross power spectrum of shape `(N, F, F)` into `(B, F, F)` band powers
    pub fn bin_cross(&self, input: &ArrayView3<f64>) -> Result<Array3<f64>, SeparatorError> {
        let (n, f1, f2) = input.dim();
        if f1 != f2 {
            return Err(SeparatorError::ShapeMismatch {
                what: "cross spectrum (not square)",
                expected: vec![n, f1, f1],
                actual: vec![n, f1, f2],
            });
        }
        if n != self.layout.sample_size || f1 != self.channels {
            return Err(SeparatorError::ShapeMismatch {
                what: "cross spectrum",
                expected: vec![self.layout.sample_size, self.channels, self.channels],
                actual: vec![n, f1, f2],
            });
        }
        log::debug!("binning cross spectrum {:?} into {} bins", input.dim(), self.layout.bins);
        Ok(self.bin_rows(input.view()))
    }

    /// Bin an auto power spectrum of shape `(N, F)` into `(B, F)` band powers
    pub fn bin_auto(&self, input: &ArrayView2<f64>) -> Result<Array2<f64>, SeparatorError> {
        let (n, f) = input.dim();
        if n != self.layout.sample_size || f != self.channels {
            return Err(SeparatorError::ShapeMismatch {
                what: "auto spectrum",
                expected: vec![self.layout.sample_size, self.channels],
                actual: vec![n, f],
            });
        }
        log::debug!("binning auto spectrum {:?} into {} bins", input.dim(), self.layout.bins);
        Ok(self.bin_rows(input.view()))
    }

    /// Average rows of `input` within each bin; the result is freshly allocated
    fn bin_rows<D: RemoveAxis>(&self, input: ArrayView<f64, D>) -> Array<f64, D> {
        let mut dim = input.raw_dim();
        dim[0] = self.layout.bins;
        let mut result = Array::<f64, D>::zeros(dim);

        for (i, range) in self.layout.ranges().into_iter().enumerate() {
            let count = range.len() as f64;
            let mut row = result.index_axis_mut(Axis(0), i);
            match self.weighting {
                BandPowerWeighting::PerMode => {
                    for k in range {
                        let w = band_power_factor(self.modes[k] as f64);
                        row.scaled_add(w, &input.index_axis(Axis(0), k));
                    }
                    row.mapv_inplace(|x| x / count);
                }
                BandPowerWeighting::BinCentre => {
                    let w = band_power_factor(self.effective_mode(&range));
                    for k in range {
                        row.scaled_add(1.0, &input.index_axis(Axis(0), k));
                    }
                    row.mapv_inplace(|x| x * w / count);
                }
            }
        }

        result
    }
}

#[cfg(test)]
#[path = "binning_tests.rs"]
mod tests;
