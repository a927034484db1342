use ndarray::ArrayView4;

use super::{PulseExtractor, RgbTrace};

/// Mean-normalised green channel, `G / mean(G) - 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Green;

impl PulseExtractor for Green {
    fn name(&self) -> &'static str {
        "Green"
    }

    fn extract(&self, patch: ArrayView4<f32>) -> Vec<f64> {
        let trace = RgbTrace::from_patch(patch);
        trace
            .normalized(0..trace.len())
            .g
            .into_iter()
            .map(|g| g - 1.0)
            .collect()
    }
}
