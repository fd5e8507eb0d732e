//! Tests for bin layout and band-power binning

use super::*;
use crate::test_utils::{random_auto, random_cross, SimpleRng};
use approx::assert_abs_diff_eq;

fn default_modes(n: usize) -> Vec<usize> {
    (0..n).collect()
}

#[test]
fn test_layout_ten_into_three() {
    let layout = BinLayout::new(10, 3).unwrap();
    assert_eq!(layout.ranges(), vec![0..4, 4..7, 7..10]);
    assert_eq!(layout.sizes(), vec![4, 3, 3]);
}

#[test]
fn test_layout_hundred_into_three() {
    let layout = BinLayout::new(100, 3).unwrap();
    assert_eq!(layout.ranges(), vec![0..34, 34..67, 67..100]);
}

#[test]
fn test_layout_partition_properties() {
    for n in 1..60 {
        for b in 1..=n {
            let layout = BinLayout::new(n, b).unwrap();
            let ranges = layout.ranges();
            assert_eq!(ranges.len(), b);

            // Contiguous cover of [0, n)
            assert_eq!(ranges[0].start, 0);
            assert_eq!(ranges[b - 1].end, n);
            for w in ranges.windows(2) {
                assert_eq!(w[0].end, w[1].start, "gap or overlap for n={} b={}", n, b);
            }

            let sizes = layout.sizes();
            assert_eq!(sizes.iter().sum::<usize>(), n);
            let larger = sizes.iter().filter(|&&s| s == n.div_ceil(b)).count();
            let smaller = sizes.iter().filter(|&&s| s == n / b).count();
            if n % b == 0 {
                assert_eq!(smaller, b);
            } else {
                assert_eq!(larger, n % b);
                assert_eq!(smaller, b - n % b);
                // Extra elements go to the leading bins
                assert!(sizes[..n % b].iter().all(|&s| s == n / b + 1));
            }
        }
    }
}

#[test]
fn test_layout_rejects_bad_bin_count() {
    assert!(matches!(
        BinLayout::new(5, 0),
        Err(SeparatorError::Configuration(_))
    ));
    assert!(matches!(
        BinLayout::new(5, 6),
        Err(SeparatorError::Configuration(_))
    ));
    assert!(BinLayout::new(5, 5).is_ok());
}

#[test]
fn test_effective_modes_default_labels() {
    let binning = Binning::new(default_modes(10), 3, 3, BandPowerWeighting::PerMode).unwrap();
    assert_eq!(binning.effective_modes(), vec![1.5, 5.0, 8.0]);
}

#[test]
fn test_effective_modes_prebinned_labels() {
    let modes: Vec<usize> = (2..16).step_by(2).collect();
    let binning = Binning::new(modes, 3, 3, BandPowerWeighting::PerMode).unwrap();
    assert_eq!(binning.effective_modes(), vec![4.0, 9.0, 13.0]);
}

#[test]
fn test_bin_cross_per_mode() {
    let mut rng = SimpleRng::new(7);
    let cps = random_cross(&mut rng, 10, 3);
    let binning = Binning::new(default_modes(10), 3, 3, BandPowerWeighting::PerMode).unwrap();
    let binned = binning.bin_cross(&cps.view()).unwrap();
    assert_eq!(binned.dim(), (3, 3, 3));

    for (b, range) in [0..4, 4..7, 7..10].into_iter().enumerate() {
        for i in 0..3 {
            for j in 0..3 {
                let count = range.len() as f64;
                let expected: f64 = range
                    .clone()
                    .map(|l| cps[[l, i, j]] * 0.5 * (l * (l + 1)) as f64 / std::f64::consts::PI)
                    .sum::<f64>()
                    / count;
                assert_abs_diff_eq!(binned[[b, i, j]], expected, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn test_bin_auto_bin_centre() {
    let mut rng = SimpleRng::new(11);
    let aps = random_auto(&mut rng, 10, 3);
    let binning = Binning::new(default_modes(10), 3, 3, BandPowerWeighting::BinCentre).unwrap();
    let binned = binning.bin_auto(&aps.view()).unwrap();

    let factors = [band_power_factor(1.5), band_power_factor(5.0), band_power_factor(8.0)];
    for (b, range) in [0..4, 4..7, 7..10].into_iter().enumerate() {
        for i in 0..3 {
            let mean = range.clone().map(|l| aps[[l, i]]).sum::<f64>() / range.len() as f64;
            assert_abs_diff_eq!(binned[[b, i]], mean * factors[b], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_binning_leaves_input_untouched() {
    let mut rng = SimpleRng::new(3);
    let cps = random_cross(&mut rng, 12, 2);
    let aps = random_auto(&mut rng, 12, 2);
    let cps_snapshot = cps.clone();
    let aps_snapshot = aps.clone();

    let binning = Binning::new(default_modes(12), 5, 2, BandPowerWeighting::PerMode).unwrap();
    let _ = binning.bin_cross(&cps.view()).unwrap();
    let _ = binning.bin_auto(&aps.view()).unwrap();

    assert_eq!(cps, cps_snapshot);
    assert_eq!(aps, aps_snapshot);
}

#[test]
fn test_bin_cross_shape_mismatch() {
    let binning = Binning::new(default_modes(10), 3, 3, BandPowerWeighting::PerMode).unwrap();

    let wrong_rows = ndarray::Array3::<f64>::zeros((9, 3, 3));
    match binning.bin_cross(&wrong_rows.view()) {
        Err(SeparatorError::ShapeMismatch { expected, actual, .. }) => {
            assert_eq!(expected, vec![10, 3, 3]);
            assert_eq!(actual, vec![9, 3, 3]);
        }
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }

    let not_square = ndarray::Array3::<f64>::zeros((10, 3, 2));
    assert!(matches!(
        binning.bin_cross(&not_square.view()),
        Err(SeparatorError::ShapeMismatch { .. })
    ));

    let wrong_channels = ndarray::Array2::<f64>::zeros((10, 4));
    assert!(matches!(
        binning.bin_auto(&wrong_channels.view()),
        Err(SeparatorError::ShapeMismatch { .. })
    ));
}
