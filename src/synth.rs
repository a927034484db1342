//! Synthetic skin videos with a known pulse, for tests and dry runs.

use ndarray::Array4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

use crate::error::{PipelineError, Result};
use crate::io::Video;

#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    pub n_frames: usize,
    pub height: usize,
    pub width: usize,
    pub fps: f64,
    pub pulse_hz: f64,
    /// Mean skin colour (RGB).
    pub base: [f64; 3],
    /// Per-channel pulse amplitude; a chrominance change, not pure intensity.
    pub amplitude: [f64; 3],
    /// Pulse arrival delay (seconds) growing linearly from the left edge to the right edge.
    pub delay_across_width: f64,
    /// Standard deviation of additive Gaussian pixel noise.
    pub noise_std: f64,
    pub seed: u64,
}

impl Default for SyntheticVideo {
    fn default() -> Self {
        SyntheticVideo {
            n_frames: 90,
            height: 64,
            width: 64,
            fps: 30.0,
            pulse_hz: 2.0,
            base: [160.0, 110.0, 90.0],
            amplitude: [2.0, 6.0, 1.0],
            delay_across_width: 0.0,
            noise_std: 0.0,
            seed: 0,
        }
    }
}

impl SyntheticVideo {
    /// Pulse arrival delay of pixel column `col`, in seconds.
    pub fn delay_at(&self, col: usize) -> f64 {
        if self.width <= 1 {
            return 0.0;
        }
        self.delay_across_width * col as f64 / (self.width - 1) as f64
    }

    pub fn generate(&self) -> Result<Video> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = if self.noise_std != 0.0 {
            let normal = Normal::new(0.0, self.noise_std)
                .map_err(|e| PipelineError::InvalidConfig(format!("noise_std {}: {}", self.noise_std, e)))?;
            Some(normal)
        } else {
            None
        };
        let mut frames = Array4::<u8>::zeros((self.n_frames, self.height, self.width, 3));
        for ((t, _, x, c), px) in frames.indexed_iter_mut() {
            let time = t as f64 / self.fps - self.delay_at(x);
            let pulse = (2.0 * PI * self.pulse_hz * time).sin();
            let mut value = self.base[c] + self.amplitude[c] * pulse;
            if let Some(normal) = &noise {
                value += normal.sample(&mut rng);
            }
            *px = value.round().clamp(0.0, 255.0) as u8;
        }
        Video::new(frames, self.fps)
    }
}
