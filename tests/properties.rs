mod common;

use approx::assert_abs_diff_eq;
use ndarray::{s, Array1, Array2, Array3, Array4};
use rppg_ptt::config::{RenderConfig, RenderMode, TimeDelayConfig, ValidityConfig};
use rppg_ptt::processing::patch_grid::PatchGrid;
use rppg_ptt::processing::pool::PatchPool;
use rppg_ptt::processing::reference::ReferenceSelector;
use rppg_ptt::processing::time_delay::TimeDelayEstimator;
use rppg_ptt::processing::validity::ValidityScorer;
use rppg_ptt::visualization::{HeatmapRenderer, RenderInput};
use rppg_ptt::PipelineError;

use common::{noise, random_mask, random_volume};

#[test]
fn patch_mask_is_the_and_of_each_window() {
    for (seed, window) in [(1u64, 3usize), (2, 5), (3, 7)] {
        let mask = random_mask(37, 29, 0.93, seed);
        let grid = PatchGrid::new(mask.view(), window).unwrap();
        assert_eq!(grid.shape(), (37 / window, 29 / window));
        // At most window - 1 pixels are cropped from each axis.
        assert!(37 - grid.n_patches_h * window < window);
        assert!(29 - grid.n_patches_w * window < window);
        for ((i, j), &inside) in grid.mask.indexed_iter() {
            let block = mask.slice(s![i * window..(i + 1) * window, j * window..(j + 1) * window]);
            assert_eq!(inside, block.iter().all(|&v| v));
        }
    }
}

#[test]
fn exact_shifts_are_recovered_and_large_ones_are_clamped() {
    let n = 90;
    let margin = 20;
    let x = noise(n + 2 * margin, 17);
    let reference = Array1::from(x[margin..margin + n].to_vec());
    let shifts: Vec<isize> = vec![-10, -4, 0, 3, 10, 15, -15];

    let mut volume = Array3::<f64>::zeros((1, shifts.len(), n));
    for (j, &lag) in shifts.iter().enumerate() {
        let start = (margin as isize - lag) as usize;
        volume
            .slice_mut(s![0, j, ..])
            .assign(&Array1::from(x[start..start + n].to_vec()));
    }
    let valid = Array2::from_elem((1, shifts.len()), true);
    let pool = PatchPool::new(3).unwrap();
    let estimator = TimeDelayEstimator::new(TimeDelayConfig::default());
    let delays = estimator
        .estimate(volume.view(), reference.view(), valid.view(), 30.0, &pool)
        .unwrap();

    let max_lag = estimator.max_lag_frames(30.0) as f64;
    for (j, &lag) in shifts.iter().enumerate() {
        let d = delays[[0, j]];
        if (lag.unsigned_abs() as f64) <= max_lag {
            assert_abs_diff_eq!(d, lag as f64 / 30.0, epsilon = 1e-12);
        } else {
            assert!(d.abs() <= max_lag / 30.0 + 1e-12);
            assert_ne!(d, lag as f64 / 30.0);
        }
    }
}

#[test]
fn validity_is_scale_invariant_and_deterministic() {
    let volume = random_volume(5, 6, 64, 23);
    let seg = random_mask(5, 6, 0.8, 4);
    let scorer = ValidityScorer::new(ValidityConfig::default());

    let a = scorer.score(volume.view(), seg.view(), 30.0, (1.8, 2.2));
    let scaled = volume.mapv(|v| v * 250.0);
    let b = scorer.score(scaled.view(), seg.view(), 30.0, (1.8, 2.2));
    for (x, y) in a.snr.iter().zip(b.snr.iter()) {
        if x.is_nan() {
            assert!(y.is_nan());
        } else {
            assert_abs_diff_eq!(x, y, epsilon = 1e-9);
        }
    }

    let c = scorer.score(volume.view(), seg.view(), 30.0, (1.8, 2.2));
    assert_eq!(a.valid_mask, c.valid_mask);
    assert!(a
        .valid_mask
        .indexed_iter()
        .all(|(idx, &valid)| !valid || seg[idx]));
}

#[test]
fn references_stay_in_the_unit_range() {
    let selector = ReferenceSelector::new(1);
    for seed in 0..5 {
        let volume = random_volume(6, 6, 40, seed);
        let seg = random_mask(6, 6, 0.6, seed + 100);
        match selector.select(volume.view(), seg.view(), (2, 3)) {
            Ok(reference) => {
                assert_eq!(reference.len(), 40);
                assert!(reference.iter().all(|&v| (0.0..=1.0).contains(&v)));
            }
            Err(PipelineError::NoValidReferenceRegion { .. }) => {
                let block = seg.slice(s![1..4, 2..5]);
                assert!(block.iter().all(|&v| !v));
            }
            Err(other) => panic!("unexpected error {}", other),
        }
    }
}

#[test]
fn all_false_validity_leaves_the_video_untouched() {
    let n = 12;
    let video = Array4::from_shape_fn((n, 9, 12, 3), |(t, y, x, c)| ((t * 13 + y * 7 + x * 3 + c * 50) % 256) as u8);
    let segmentation = Array2::from_elem((9, 12), true);
    let volume = random_volume(3, 4, n, 9);
    let reference = Array1::from_shape_fn(n, |t| t as f64 / (n - 1) as f64);
    let delays = Array2::from_elem((3, 4), 0.1);
    let valid = Array2::from_elem((3, 4), false);

    for mode in [RenderMode::Intensity, RenderMode::Delay] {
        let renderer = HeatmapRenderer::new(&RenderConfig {
            mode,
            ..RenderConfig::default()
        });
        let out = renderer
            .render(&RenderInput {
                video: video.view(),
                segmentation: segmentation.view(),
                volume: volume.view(),
                reference: reference.view(),
                delays: Some(delays.view()),
                valid: valid.view(),
                window_size: 3,
                fps: 30.0,
            })
            .unwrap();
        assert_eq!(out, video);
    }
}
