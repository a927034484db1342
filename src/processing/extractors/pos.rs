use ndarray::ArrayView4;

use super::{mean, std_ratio, PulseExtractor, RgbTrace};

/// Plane-orthogonal-to-skin projection over sliding windows, overlap-added.
#[derive(Debug, Clone)]
pub struct Pos {
    window: usize,
}

impl Pos {
    pub fn new(fps: f64, window_seconds: f64) -> Self {
        let window = (window_seconds * fps).ceil().max(1.0) as usize;
        Pos { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn project(trace: &RgbTrace, start: usize, end: usize) -> Vec<f64> {
        let cn = trace.normalized(start..end);
        let s1: Vec<f64> = cn.g.iter().zip(&cn.b).map(|(g, b)| g - b).collect();
        let s2: Vec<f64> = cn
            .r
            .iter()
            .zip(cn.g.iter().zip(&cn.b))
            .map(|(r, (g, b))| g + b - 2.0 * r)
            .collect();
        let alpha = std_ratio(&s1, &s2);
        let h: Vec<f64> = s1.iter().zip(&s2).map(|(a, b)| a + alpha * b).collect();
        let h_mean = mean(&h);
        h.into_iter().map(|v| v - h_mean).collect()
    }
}

impl PulseExtractor for Pos {
    fn name(&self) -> &'static str {
        "POS"
    }

    fn extract(&self, patch: ArrayView4<f32>) -> Vec<f64> {
        let trace = RgbTrace::from_patch(patch);
        let n = trace.len();
        let mut pulse = vec![0.0; n];
        if n == 0 {
            return pulse;
        }

        // Short clips get a single window covering the whole trace.
        let l = self.window.min(n);
        for start in 0..=n - l {
            let h = Pos::project(&trace, start, start + l);
            for (acc, v) in pulse[start..start + l].iter_mut().zip(h) {
                *acc += v;
            }
        }
        pulse
    }
}
