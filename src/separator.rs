//! ABS separator engine
//!
//! Reconstructs the band power of a component with flat spectral response
//! across frequency channels, following Eq. (3) of arXiv:1608.03707:
//!
//! 1. bin the total (and noise) cross spectra into band powers,
//! 2. whiten by the binned noise RMS and add `shift · f fᵀ`,
//! 3. eigendecompose every bin and keep modes with eigenvalue `≥ cut`,
//! 4. `D_b = (Σ G_i² / λ_i)⁻¹ − shift` with `G_i = f · v_i`.

use crate::binning::{BandPowerWeighting, BinLayout, Binning};
use crate::eigen::eigen_decompose_above;
use crate::error::SeparatorError;
use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};
use num_complex::Complex;
use rayon::prelude::*;

/// Default shift added to the target covariance
pub const DEFAULT_SHIFT: f64 = 10.0;

/// Default eigenvalue cut (signal-to-noise threshold)
pub const DEFAULT_CUT: f64 = 1.0;

/// Noise cross spectrum together with the RMS of the noise auto spectrum
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct NoiseModel {
    /// Ensemble-averaged noise cross spectrum, shape (L, F, F)
    pub cross: Array3<f64>,
    /// RMS of the noise auto spectrum, shape (L, F)
    pub rms: Array2<f64>,
}

/// Validated, immutable separator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SeparatorConfig {
    total_ps: Array3<f64>,
    noise: Option<NoiseModel>,
    binning: Binning,
    lmax: usize,
    prebin: bool,
    shift: f64,
    cut: f64,
    parallel: bool,
}

impl SeparatorConfig {
    /// Total cross spectrum, shape (L, F, F)
    pub fn total_ps(&self) -> &Array3<f64> {
        &self.total_ps
    }

    pub fn noise_ps(&self) -> Option<&Array3<f64>> {
        self.noise.as_ref().map(|n| &n.cross)
    }

    pub fn noise_rms(&self) -> Option<&Array2<f64>> {
        self.noise.as_ref().map(|n| &n.rms)
    }

    /// Whether noise statistics take part in the separation
    pub fn noise_flag(&self) -> bool {
        self.noise.is_some()
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn lbin(&self) -> usize {
        self.binning.layout().bins()
    }

    /// Mode labels of the rows in use
    pub fn llist(&self) -> &[usize] {
        self.binning.modes()
    }

    /// True when the mode list is shorter than the row budget
    pub fn prebin(&self) -> bool {
        self.prebin
    }

    /// Number of rows partitioned into bins
    pub fn sample_size(&self) -> usize {
        self.binning.layout().sample_size()
    }

    /// Number of frequency channels
    pub fn channels(&self) -> usize {
        self.binning.channels()
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    pub fn cut(&self) -> f64 {
        self.cut
    }

    pub fn weighting(&self) -> BandPowerWeighting {
        self.binning.weighting()
    }

    pub fn parallel(&self) -> bool {
        self.parallel
    }

    pub fn layout(&self) -> &BinLayout {
        self.binning.layout()
    }
}

/// Builder for [`Separator`]
///
/// # Example
/// ```ignore
/// let sep = Separator::builder(total_ps, 3)
///     .noise_ps(noise_ps)
///     .noise_rms(noise_rms)
///     .shift(23.0)
///     .build()?;
/// let (modes, band_powers) = sep.run()?;
/// ```
#[derive(Debug, Clone)]
pub struct SeparatorBuilder {
    total_ps: Array3<f64>,
    noise_ps: Option<Array3<f64>>,
    noise_rms: Option<Array2<f64>>,
    lbin: usize,
    llist: Option<Vec<usize>>,
    lmax: Option<usize>,
    shift: f64,
    cut: f64,
    weighting: BandPowerWeighting,
    parallel: bool,
}

impl SeparatorBuilder {
    pub fn new(total_ps: Array3<f64>, lbin: usize) -> Self {
        Self {
            total_ps,
            noise_ps: None,
            noise_rms: None,
            lbin,
            llist: None,
            lmax: None,
            shift: DEFAULT_SHIFT,
            cut: DEFAULT_CUT,
            weighting: BandPowerWeighting::default(),
            parallel: true,
        }
    }

    /// Ensemble-averaged noise cross spectrum, shape (L, F, F)
    pub fn noise_ps(mut self, noise_ps: Array3<f64>) -> Self {
        self.noise_ps = Some(noise_ps);
        self
    }

    /// RMS of the noise auto spectrum, shape (L, F)
    pub fn noise_rms(mut self, noise_rms: Array2<f64>) -> Self {
        self.noise_rms = Some(noise_rms);
        self
    }

    /// Mode label of every row (non-decreasing)
    pub fn modes(mut self, llist: Vec<usize>) -> Self {
        self.llist = Some(llist);
        self
    }

    pub fn lmax(mut self, lmax: usize) -> Self {
        self.lmax = Some(lmax);
        self
    }

    pub fn shift(mut self, shift: f64) -> Self {
        self.shift = shift;
        self
    }

    pub fn cut(mut self, cut: f64) -> Self {
        self.cut = cut;
        self
    }

    pub fn weighting(mut self, weighting: BandPowerWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Evaluate bins on the rayon pool
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Validate every field and build the separator
    pub fn build(self) -> Result<Separator, SeparatorError> {
        let (rows, f1, f2) = self.total_ps.dim();
        if rows == 0 || f1 == 0 {
            return Err(SeparatorError::config(format!(
                "total_ps must be non-empty, got shape {:?}",
                self.total_ps.shape()
            )));
        }
        if f1 != f2 {
            return Err(SeparatorError::config(format!(
                "total_ps must be square in its last two axes, got shape {:?}",
                self.total_ps.shape()
            )));
        }
        check_finite("total_ps", self.total_ps.iter())?;
        log::debug!("total cross-PS read, shape {:?}", self.total_ps.shape());

        let noise = match (self.noise_ps, self.noise_rms) {
            (None, None) => {
                log::debug!("without noise cross-PS");
                None
            }
            (Some(cross), Some(rms)) => {
                if cross.dim() != (rows, f1, f1) {
                    return Err(SeparatorError::config(format!(
                        "noise_ps shape {:?} differs from total_ps shape {:?}",
                        cross.shape(),
                        self.total_ps.shape()
                    )));
                }
                if rms.dim() != (rows, f1) {
                    return Err(SeparatorError::config(format!(
                        "noise_rms shape {:?} must be [{}, {}]",
                        rms.shape(),
                        rows,
                        f1
                    )));
                }
                check_finite("noise_ps", cross.iter())?;
                check_finite("noise_rms", rms.iter())?;
                log::debug!("noise cross-PS and noise RMS auto-PS read");
                Some(NoiseModel { cross, rms })
            }
            (Some(_), None) => {
                return Err(SeparatorError::config(
                    "noise_ps supplied without noise_rms",
                ))
            }
            (None, Some(_)) => {
                return Err(SeparatorError::config(
                    "noise_rms supplied without noise_ps",
                ))
            }
        };

        // Sample size first; everything below depends on it
        let (modes, lmax, prebin) = resolve_modes(self.llist, self.lmax, rows)?;
        log::debug!(
            "angular modes {:?} (lmax {}, pre-binned: {})",
            modes,
            lmax,
            prebin
        );

        let binning = Binning::new(modes, self.lbin, f1, self.weighting)?;

        if !(self.shift.is_finite() && self.shift > 0.0) {
            return Err(SeparatorError::config(format!(
                "shift must be a positive real, got {}",
                self.shift
            )));
        }
        if !(self.cut.is_finite() && self.cut > 0.0) {
            return Err(SeparatorError::config(format!(
                "cut must be a positive real, got {}",
                self.cut
            )));
        }
        log::debug!(
            "{} bins, shift {}, cut {}, with noise: {}",
            self.lbin,
            self.shift,
            self.cut,
            noise.is_some()
        );

        Ok(Separator {
            config: SeparatorConfig {
                total_ps: self.total_ps,
                noise,
                binning,
                lmax,
                prebin,
                shift: self.shift,
                cut: self.cut,
                parallel: self.parallel,
            },
        })
    }
}

fn check_finite<'a>(
    name: &str,
    mut values: impl Iterator<Item = &'a f64>,
) -> Result<(), SeparatorError> {
    if values.any(|x| !x.is_finite()) {
        return Err(SeparatorError::config(format!(
            "{} contains non-finite entries",
            name
        )));
    }
    Ok(())
}

/// Resolve the mode labels in use, the effective lmax and the pre-binned flag
///
/// Without a mode list, `lmax` counts leading rows. With one, labels above an
/// explicit `lmax` are dropped; a list shorter than the row budget marks the
/// input as pre-binned and sets the sample size to its length.
fn resolve_modes(
    llist: Option<Vec<usize>>,
    lmax: Option<usize>,
    rows: usize,
) -> Result<(Vec<usize>, usize, bool), SeparatorError> {
    match llist {
        None => {
            let lmax = lmax.unwrap_or(rows);
            if lmax == 0 || lmax > rows {
                return Err(SeparatorError::config(format!(
                    "lmax must be in (0, {}], got {}",
                    rows, lmax
                )));
            }
            Ok(((0..lmax).collect(), lmax, false))
        }
        Some(list) => {
            if list.windows(2).any(|w| w[0] > w[1]) {
                return Err(SeparatorError::config(
                    "mode list must be non-decreasing",
                ));
            }
            let mut modes: Vec<usize> = match lmax {
                Some(limit) => list.into_iter().filter(|&l| l <= limit).collect(),
                None => list,
            };
            if modes.is_empty() {
                return Err(SeparatorError::config("mode list is empty after lmax filter"));
            }
            if lmax.is_none() && modes.len() > rows {
                return Err(SeparatorError::config(format!(
                    "mode list has {} entries but only {} rows are available",
                    modes.len(),
                    rows
                )));
            }
            let budget = lmax.unwrap_or(rows);
            if budget == 0 {
                return Err(SeparatorError::config("lmax must be positive"));
            }
            let prebin = modes.len() < budget;
            if !prebin {
                if budget > rows {
                    return Err(SeparatorError::config(format!(
                        "lmax {} exceeds the {} available rows",
                        budget, rows
                    )));
                }
                modes.truncate(budget);
            }
            if modes.len() > rows {
                return Err(SeparatorError::config(format!(
                    "mode list has {} entries but only {} rows are available",
                    modes.len(),
                    rows
                )));
            }
            Ok((modes, budget, prebin))
        }
    }
}

/// Per-bin outcome of a separation
#[derive(Debug, Clone, PartialEq)]
pub struct BinEstimate {
    /// Effective mode of the bin
    pub mode: f64,
    /// Reconstructed target band power
    pub band_power: f64,
    /// Full spectrum of the shifted, whitened covariance
    pub eigenvalues: Vec<Complex<f64>>,
    /// Number of eigenmodes at or above the cut
    pub retained: usize,
}

/// Full result of [`Separator::run_detailed`]
#[derive(Debug, Clone, PartialEq)]
pub struct SeparationResult {
    pub bins: Vec<BinEstimate>,
}

impl SeparationResult {
    pub fn modes(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.mode).collect()
    }

    pub fn band_powers(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.band_power).collect()
    }

    /// Split into `(modes, band_powers)`
    pub fn into_pair(self) -> (Vec<f64>, Vec<f64>) {
        self.bins
            .into_iter()
            .map(|b| (b.mode, b.band_power))
            .unzip()
    }
}

/// The ABS blind separator
#[derive(Debug, Clone, PartialEq)]
pub struct Separator {
    config: SeparatorConfig,
}

impl Separator {
    /// Start building a separator from the total cross spectrum and a bin count
    pub fn builder(total_ps: Array3<f64>, lbin: usize) -> SeparatorBuilder {
        SeparatorBuilder::new(total_ps, lbin)
    }

    pub fn config(&self) -> &SeparatorConfig {
        &self.config
    }

    /// Effective mode of every bin
    pub fn effective_modes(&self) -> Vec<f64> {
        self.config.binning.effective_modes()
    }

    /// Bin a cross spectrum of shape (sample_size, F, F) into band powers
    pub fn bin_cross(&self, cps: &ArrayView3<f64>) -> Result<Array3<f64>, SeparatorError> {
        self.config.binning.bin_cross(cps)
    }

    /// Bin an auto spectrum of shape (sample_size, F) into band powers
    pub fn bin_auto(&self, aps: &ArrayView2<f64>) -> Result<Array2<f64>, SeparatorError> {
        self.config.binning.bin_auto(aps)
    }

    /// Separate the target component: `(effective modes, band powers)`
    pub fn run(&self) -> Result<(Vec<f64>, Vec<f64>), SeparatorError> {
        Ok(self.run_detailed()?.into_pair())
    }

    /// Separate the target component, keeping per-bin eigen diagnostics
    pub fn run_detailed(&self) -> Result<SeparationResult, SeparatorError> {
        let (dl, f) = self.shifted_band_powers()?;
        let modes = self.effective_modes();
        let nbins = modes.len();

        let estimates: Vec<Result<BinEstimate, SeparatorError>> = if self.config.parallel {
            (0..nbins)
                .into_par_iter()
                .map(|ell| self.solve_bin(ell, modes[ell], &dl, &f))
                .collect()
        } else {
            (0..nbins)
                .map(|ell| self.solve_bin(ell, modes[ell], &dl, &f))
                .collect()
        };

        // First failing bin in bin order, independent of scheduling
        let bins = estimates.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(SeparationResult { bins })
    }

    /// Binned covariance after noise whitening and shift, with the response `f`
    fn shifted_band_powers(&self) -> Result<(Array3<f64>, Array2<f64>), SeparatorError> {
        let cfg = &self.config;
        let n = cfg.sample_size();
        let nf = cfg.channels();
        let shift = cfg.shift;

        let mut dl = self.bin_cross(&cfg.total_ps.slice(s![..n, .., ..]))?;
        let mut f = Array2::<f64>::ones((cfg.lbin(), nf));

        match &cfg.noise {
            Some(noise) => {
                let ndl = self.bin_cross(&noise.cross.slice(s![..n, .., ..]))?;
                let nrms = self.bin_auto(&noise.rms.slice(s![..n, ..]))?;
                if let Some(((bin, channel), &value)) = nrms
                    .indexed_iter()
                    .find(|&(_, &v)| !(v.is_finite() && v > 0.0))
                {
                    return Err(SeparatorError::NonPositiveNoise {
                        bin,
                        channel,
                        value,
                    });
                }

                f /= &nrms;
                dl -= &ndl;
                for i in 0..nf {
                    for j in 0..nf {
                        for b in 0..cfg.lbin() {
                            let norm = (nrms[[b, i]] * nrms[[b, j]]).sqrt();
                            dl[[b, i, j]] = dl[[b, i, j]] / norm + shift * f[[b, i]] * f[[b, j]];
                        }
                    }
                }
            }
            None => {
                for i in 0..nf {
                    for j in 0..nf {
                        for b in 0..cfg.lbin() {
                            dl[[b, i, j]] += shift * f[[b, i]] * f[[b, j]];
                        }
                    }
                }
            }
        }

        Ok((dl, f))
    }

    fn solve_bin(
        &self,
        ell: usize,
        mode: f64,
        dl: &Array3<f64>,
        f: &Array2<f64>,
    ) -> Result<BinEstimate, SeparatorError> {
        let nf = self.config.channels();
        let block = dl.index_axis(Axis(0), ell);
        let matrix = DMatrix::from_fn(nf, nf, |i, j| block[[i, j]]);
        let response = DVector::from_iterator(nf, f.index_axis(Axis(0), ell).iter().copied());

        // Only modes with real part >= cut enter the sum and must be real
        let eig = eigen_decompose_above(&matrix, self.config.cut)
            .map_err(|source| SeparatorError::Eigen { bin: ell, source })?;
        log::debug!("angular mode {} with eigen values {:?}", mode, eig.spectrum);

        let mut sum = 0.0;
        let mut retained = 0;
        for (i, &lambda) in eig.values.iter().enumerate() {
            let v = eig.vectors.column(i);
            let v = v / v.norm_squared();
            let g = response.dot(&v);
            sum += g * g / lambda;
            retained += 1;
        }

        let inv = 1.0 / sum;
        if sum == 0.0 || !inv.is_finite() {
            return Err(SeparatorError::DegenerateBin { bin: ell, mode });
        }
        log::trace!("bin {}: {} eigenmodes retained", ell, retained);

        Ok(BinEstimate {
            mode,
            band_power: inv - self.config.shift,
            eigenvalues: eig.spectrum,
            retained,
        })
    }
}

#[cfg(test)]
#[path = "separator_tests.rs"]
mod tests;
