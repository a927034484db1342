use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::{PipelineError, Result};

// Digital Butterworth band-pass in transfer-function form, direct form II transposed.
#[derive(Debug, Clone)]
pub struct BandPassFilter {
    b: Vec<f64>,
    a: Vec<f64>,
    z: Vec<f64>,
}

impl BandPassFilter {
    /// Designs an `order`-th order Butterworth band-pass (`2 * order` poles) for the
    /// pass band `[f_low, f_high]` Hz at sampling rate `fs`.
    pub fn butterworth(order: usize, f_low: f64, f_high: f64, fs: f64) -> Result<Self> {
        let nyquist = 0.5 * fs;
        if order == 0 || !(f_low > 0.0 && f_low < f_high && f_high < nyquist) {
            return Err(PipelineError::InvalidConfig(format!(
                "band-pass [{}, {}] Hz of order {} is not realisable at fs = {} Hz",
                f_low, f_high, order, fs
            )));
        }

        // Pre-warp the normalised edges (scipy convention: digital fs = 2).
        let warp = |f: f64| 4.0 * (PI * (f / nyquist) / 2.0).tan();
        let w_low = warp(f_low);
        let w_high = warp(f_high);
        let bw = w_high - w_low;
        let wo2 = w_low * w_high;

        // Analog low-pass prototype poles on the left half of the unit circle.
        let n = order as f64;
        let prototype: Vec<Complex64> = (0..order)
            .map(|k| {
                let m = -(order as f64) + 1.0 + 2.0 * k as f64;
                -Complex64::from_polar(1.0, PI * m / (2.0 * n))
            })
            .collect();

        // Low-pass to band-pass: every prototype pole splits into two.
        let mut poles = Vec::with_capacity(2 * order);
        for p in &prototype {
            let p_lp = *p * (bw / 2.0);
            let root = (p_lp * p_lp - wo2).sqrt();
            poles.push(p_lp + root);
            poles.push(p_lp - root);
        }
        let gain = bw.powi(order as i32);

        // Bilinear transform. The `order` zeros at s = 0 map to z = 1, the
        // remaining `order` zeros at infinity map to z = -1.
        let fs2 = Complex64::new(4.0, 0.0);
        let z_poles: Vec<Complex64> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
        let denom: Complex64 = poles.iter().map(|&p| fs2 - p).product();
        let z_gain = gain * (fs2.powi(order as i32) / denom).re;

        let mut zeros = vec![Complex64::new(1.0, 0.0); order];
        zeros.extend(std::iter::repeat(Complex64::new(-1.0, 0.0)).take(order));

        let b: Vec<f64> = poly(&zeros).iter().map(|c| c.re * z_gain).collect();
        let a: Vec<f64> = poly(&z_poles).iter().map(|c| c.re).collect();

        Ok(Self::from_coefficients(b, a))
    }

    /// Builds a filter from raw coefficients, normalising by `a[0]`.
    pub fn from_coefficients(mut b: Vec<f64>, mut a: Vec<f64>) -> Self {
        let len = b.len().max(a.len());
        b.resize(len, 0.0);
        a.resize(len, 0.0);
        let a0 = a[0];
        if a0 != 1.0 && a0 != 0.0 {
            b.iter_mut().for_each(|v| *v /= a0);
            a.iter_mut().for_each(|v| *v /= a0);
        }
        BandPassFilter {
            b,
            a,
            z: vec![0.0; len - 1],
        }
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Filter an input sample and update the internal state
    pub fn filter_sample(&mut self, input: f64) -> f64 {
        let order = self.z.len();
        if order == 0 {
            return self.b[0] * input;
        }
        let output = self.b[0] * input + self.z[0];
        for i in 0..order - 1 {
            self.z[i] = self.b[i + 1] * input + self.z[i + 1] - self.a[i + 1] * output;
        }
        self.z[order - 1] = self.b[order] * input - self.a[order] * output;
        output
    }

    /// Steady-state initial conditions for a unit step input.
    pub fn steady_state(&self) -> Vec<f64> {
        let m = self.z.len();
        if m == 0 {
            return Vec::new();
        }
        // (I - companion(a)^T) zi = b[1..] - a[1..] * b[0]
        let lhs = DMatrix::from_fn(m, m, |i, j| {
            let identity = if i == j { 1.0 } else { 0.0 };
            let first = if j == 0 { self.a[i + 1] } else { 0.0 };
            let shift = if j == i + 1 { 1.0 } else { 0.0 };
            identity + first - shift
        });
        let rhs = DVector::from_fn(m, |i, _| self.b[i + 1] - self.a[i + 1] * self.b[0]);
        match lhs.lu().solve(&rhs) {
            Some(zi) => zi.iter().copied().collect(),
            None => vec![0.0; m],
        }
    }

    /// Forward-backward (zero-phase) filtering with odd extension at both ends.
    pub fn filtfilt(&self, signal: &[f64]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }
        let edge = (3 * self.b.len()).min(n - 1);
        let first = signal[0];
        let last = signal[n - 1];

        let mut extended = Vec::with_capacity(n + 2 * edge);
        extended.extend((1..=edge).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=edge).map(|i| 2.0 * last - signal[n - 1 - i]));

        let zi = self.steady_state();
        let mut forward = self.clone();

        forward.z = zi.iter().map(|v| v * extended[0]).collect();
        let mut pass: Vec<f64> = extended.iter().map(|&x| forward.filter_sample(x)).collect();

        pass.reverse();
        forward.z = zi.iter().map(|v| v * pass[0]).collect();
        let mut backward: Vec<f64> = pass.iter().map(|&x| forward.filter_sample(x)).collect();
        backward.reverse();

        backward[edge..edge + n].to_vec()
    }
}

/// Polynomial coefficients (highest power first) with the given roots.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += *c;
            next[i + 1] -= *c * *root;
        }
        coeffs = next;
    }
    coeffs
}
