//! Common test utilities

use crate::binning::band_power_factor;
use ndarray::{Array2, Array3};

/// Simple deterministic pseudo-random number generator (LCG)
///
/// Linear Congruential Generator for reproducible random numbers in tests.
/// Uses the common parameters: a = 1664525, c = 1013904223 (from Numerical Recipes)
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next f64 in range [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        ((self.state >> 16) as f64) / ((1u64 << 48) as f64)
    }
}

/// Random symmetric cross spectrum of shape (n, f, f) with entries in [0, 1)
pub fn random_cross(rng: &mut SimpleRng, n: usize, f: usize) -> Array3<f64> {
    let mut cps = Array3::<f64>::zeros((n, f, f));
    for l in 0..n {
        for i in 0..f {
            for j in i..f {
                let v = rng.next_f64();
                cps[[l, i, j]] = v;
                cps[[l, j, i]] = v;
            }
        }
    }
    cps
}

/// Random cross spectrum of shape (n, f, f) without any symmetry, entries in [0, 1)
pub fn random_asymmetric_cross(rng: &mut SimpleRng, n: usize, f: usize) -> Array3<f64> {
    let mut cps = Array3::<f64>::zeros((n, f, f));
    for v in cps.iter_mut() {
        *v = rng.next_f64();
    }
    cps
}

/// Random auto spectrum of shape (n, f) with entries in [0, 1)
pub fn random_auto(rng: &mut SimpleRng, n: usize, f: usize) -> Array2<f64> {
    let mut aps = Array2::<f64>::zeros((n, f));
    for v in aps.iter_mut() {
        *v = rng.next_f64();
    }
    aps
}

/// Cross spectrum whose per-mode band power is `band[i][j]` at every mode
///
/// Row `k` holds `band / (0.5 l (l + 1) / π)` with `l = modes[k]`; modes must
/// be positive.
pub fn flat_band_power_cross(modes: &[usize], band: &Array2<f64>) -> Array3<f64> {
    let f = band.nrows();
    Array3::from_shape_fn((modes.len(), f, f), |(k, i, j)| {
        band[[i, j]] / band_power_factor(modes[k] as f64)
    })
}

/// Auto spectrum whose per-mode band power is `band[i]` at every mode
pub fn flat_band_power_auto(modes: &[usize], band: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((modes.len(), band.len()), |(k, i)| {
        band[i] / band_power_factor(modes[k] as f64)
    })
}
