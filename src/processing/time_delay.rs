use log::info;
use ndarray::{s, Array2, ArrayView1, ArrayView2, ArrayView3};

use crate::config::TimeDelayConfig;
use crate::error::{PatchIndex, Result, Stage};
use crate::processing::patch_grid::masked_indices;
use crate::processing::pool::PatchPool;

/// Lag (in samples) in `[-max_lag, max_lag]` maximising the full
/// cross-correlation `c[k] = sum_n a[n + k] * v[n]`. Positive lags mean `a`
/// trails `v`. Ties resolve to the most negative lag. `None` when no lag is
/// admissible.
pub fn best_lag(a: &[f64], v: &[f64], max_lag: usize) -> Option<isize> {
    let n = a.len().min(v.len());
    if n == 0 {
        return None;
    }
    let bound = max_lag.min(n - 1) as isize;
    let mut best: Option<(isize, f64)> = None;
    for k in -bound..=bound {
        let c: f64 = (0..n as isize)
            .filter(|&i| i + k >= 0 && i + k < n as isize)
            .map(|i| a[(i + k) as usize] * v[i as usize])
            .sum();
        match best {
            Some((_, b)) if c <= b => {}
            _ => best = Some((k, c)),
        }
    }
    best.map(|(k, _)| k)
}

fn centered(x: ArrayView1<f64>) -> Vec<f64> {
    let mean = x.mean().unwrap_or(0.0);
    x.iter().map(|v| v - mean).collect()
}

/// Read-only state shared by every delay worker.
pub struct DelayContext<'a> {
    pub volume: ArrayView3<'a, f64>,
    /// Zero-mean reference waveform.
    pub reference: Vec<f64>,
    pub fps: f64,
    pub max_lag_frames: usize,
}

impl<'a> DelayContext<'a> {
    pub fn new(volume: ArrayView3<'a, f64>, reference: ArrayView1<f64>, fps: f64, max_lag_frames: usize) -> Self {
        DelayContext {
            volume,
            reference: centered(reference),
            fps,
            max_lag_frames,
        }
    }

    /// Delay of patch `(i, j)` behind the reference, in seconds. `NaN` if the
    /// lag window is empty or either waveform is flat.
    pub fn delay(&self, (i, j): PatchIndex) -> f64 {
        let patch = centered(self.volume.slice(s![i, j, ..]));
        let flat = |x: &[f64]| x.iter().all(|v| *v == 0.0);
        if flat(&patch) || flat(&self.reference) {
            return f64::NAN;
        }
        match best_lag(&patch, &self.reference, self.max_lag_frames) {
            Some(lag) => lag as f64 / self.fps,
            None => f64::NAN,
        }
    }
}

pub struct TimeDelayEstimator {
    config: TimeDelayConfig,
}

impl TimeDelayEstimator {
    pub fn new(config: TimeDelayConfig) -> Self {
        TimeDelayEstimator { config }
    }

    pub fn max_lag_frames(&self, fps: f64) -> usize {
        (self.config.max_lag_seconds * fps).round().max(0.0) as usize
    }

    /// Delay map in seconds for every patch set in `valid`; all other
    /// patches are `NaN`.
    pub fn estimate(
        &self,
        volume: ArrayView3<f64>,
        reference: ArrayView1<f64>,
        valid: ArrayView2<bool>,
        fps: f64,
        pool: &PatchPool,
    ) -> Result<Array2<f64>> {
        let (h, w, _) = volume.dim();
        let max_lag = self.max_lag_frames(fps);
        let ctx = DelayContext::new(volume, reference, fps, max_lag);
        let tasks: Vec<PatchIndex> = masked_indices(valid)
            .into_iter()
            .filter(|&(i, j)| i < h && j < w)
            .collect();
        info!(
            "estimating delays for {} patches (max lag {} frames)",
            tasks.len(),
            max_lag
        );

        let results = pool.run(Stage::TimeDelay, &ctx, &tasks, |ctx, patch| Ok(ctx.delay(patch)))?;

        let mut delays = Array2::<f64>::from_elem((h, w), f64::NAN);
        for (patch, delay) in results {
            delays[patch] = delay;
        }
        Ok(delays)
    }
}
