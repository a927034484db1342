use ndarray::ArrayView4;

use super::{mean, std_ratio, PulseExtractor, RgbTrace};

/// Chrominance method on mean-normalised traces: `S = X - (std X / std Y) * Y`
/// with `X = 3R - 2G` and `Y = 1.5R + G - 1.5B`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chrom;

impl PulseExtractor for Chrom {
    fn name(&self) -> &'static str {
        "CHROM"
    }

    fn extract(&self, patch: ArrayView4<f32>) -> Vec<f64> {
        let trace = RgbTrace::from_patch(patch);
        if trace.is_empty() {
            return Vec::new();
        }
        let cn = trace.normalized(0..trace.len());

        let x: Vec<f64> = cn.r.iter().zip(&cn.g).map(|(r, g)| 3.0 * r - 2.0 * g).collect();
        let y: Vec<f64> = cn
            .r
            .iter()
            .zip(cn.g.iter().zip(&cn.b))
            .map(|(r, (g, b))| 1.5 * r + g - 1.5 * b)
            .collect();

        let alpha = std_ratio(&x, &y);
        let s: Vec<f64> = x.iter().zip(&y).map(|(x, y)| x - alpha * y).collect();
        let offset = mean(&s);
        s.into_iter().map(|v| v - offset).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{correlation_with_sine, pulsing_patch};
    use super::*;

    #[test]
    fn recovers_pulse_with_opposing_chroma() {
        // Red and green move in opposite directions, so X and Y are not collinear.
        let patch = pulsing_patch(90, 30.0, 2.0, [160.0, 110.0, 90.0], [1.0, 5.0, -2.0]);
        let pulse = Chrom.extract(patch.view());
        assert_eq!(pulse.len(), 90);
        let r = correlation_with_sine(&pulse, 30.0, 2.0).abs();
        assert!(r > 0.99, "correlation {}", r);
    }
}
