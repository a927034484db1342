//! Pulse-extraction strategies: each turns a `(time, height, width, rgb)` patch
//! volume into one pulsatile waveform with one sample per frame.

pub mod chrom;
pub mod green;
pub mod pca;
pub mod pos;

use ndarray::{ArrayView4, Axis};

use crate::config::{ExtractionConfig, ExtractionMethod};

pub use chrom::Chrom;
pub use green::Green;
pub use pca::Pca;
pub use pos::Pos;

pub trait PulseExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns a waveform of length `patch.len_of(Axis(0))`.
    fn extract(&self, patch: ArrayView4<f32>) -> Vec<f64>;
}

impl ExtractionMethod {
    pub fn build(self, fps: f64, config: &ExtractionConfig) -> Box<dyn PulseExtractor> {
        match self {
            ExtractionMethod::Pos => Box::new(Pos::new(fps, config.pos_window_seconds)),
            ExtractionMethod::Chrom => Box::new(Chrom),
            ExtractionMethod::Pca => Box::new(Pca),
            ExtractionMethod::Green => Box::new(Green),
        }
    }
}

// RGB TRACE COMPONENT ----------------------------------------------------------

/// Per-frame spatial mean of each colour channel.
#[derive(Debug, Clone, Default)]
pub struct RgbTrace {
    pub r: Vec<f64>,
    pub g: Vec<f64>,
    pub b: Vec<f64>,
}

impl RgbTrace {
    pub fn from_patch(patch: ArrayView4<f32>) -> Self {
        let (n_frames, height, width, channels) = patch.dim();
        let mut trace = RgbTrace {
            r: vec![0.0; n_frames],
            g: vec![0.0; n_frames],
            b: vec![0.0; n_frames],
        };
        let n_pixels = height * width;
        if n_pixels == 0 || channels < 3 {
            return trace;
        }

        for (t, frame) in patch.axis_iter(Axis(0)).enumerate() {
            let mut sums = [0.0f64; 3];
            for px in frame.lanes(Axis(2)) {
                for (c, sum) in sums.iter_mut().enumerate() {
                    *sum += f64::from(px[c]);
                }
            }
            trace.r[t] = sums[0] / n_pixels as f64;
            trace.g[t] = sums[1] / n_pixels as f64;
            trace.b[t] = sums[2] / n_pixels as f64;
        }
        trace
    }

    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// Each channel divided by its own temporal mean over `range`.
    pub fn normalized(&self, range: std::ops::Range<usize>) -> RgbTrace {
        RgbTrace {
            r: normalize_by_mean(&self.r[range.clone()]),
            g: normalize_by_mean(&self.g[range.clone()]),
            b: normalize_by_mean(&self.b[range]),
        }
    }
}

/// `x / mean(x)`; a zero-mean channel maps to all ones so it carries no pulse.
pub fn normalize_by_mean(x: &[f64]) -> Vec<f64> {
    let m = mean(x);
    if m.abs() < f64::EPSILON {
        return vec![1.0; x.len()];
    }
    x.iter().map(|v| v / m).collect()
}

pub fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    x.iter().sum::<f64>() / x.len() as f64
}

/// Population standard deviation.
pub fn std_dev(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let m = mean(x);
    (x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / x.len() as f64).sqrt()
}

/// `std(num) / std(den)`, or 0 when the denominator is flat.
pub(crate) fn std_ratio(num: &[f64], den: &[f64]) -> f64 {
    let sd = std_dev(den);
    if sd < 1e-12 {
        0.0
    } else {
        std_dev(num) / sd
    }
}
