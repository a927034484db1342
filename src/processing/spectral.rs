//! Frequency-domain helpers shared by heart-rate estimation and SNR scoring.

use num_complex::Complex64;
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Welch power spectral density estimate.
#[derive(Debug, Clone, Default)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

impl Psd {
    /// Frequency of the (first) largest PSD bin.
    pub fn peak_frequency(&self) -> Option<f64> {
        let idx = argmax(&self.power)?;
        self.freqs.get(idx).copied()
    }
}

/// Index of the first maximum, ignoring NaNs.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Welch PSD with a periodic Hann window, 50% overlap, constant detrend,
/// density scaling and a one-sided spectrum. `nperseg` is clamped to the
/// signal length.
pub fn welch(signal: &[f64], fs: f64, nperseg: usize) -> Psd {
    let n = signal.len();
    if n == 0 || nperseg == 0 {
        return Psd::default();
    }
    let nperseg = nperseg.min(n);
    let noverlap = nperseg / 2;
    let step = nperseg - noverlap;
    let n_segments = (n - noverlap) / step;

    let window: Vec<f64> = (0..nperseg)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / nperseg as f64).cos())
        .collect();
    let scale = 1.0 / (fs * window.iter().map(|w| w * w).sum::<f64>());

    let n_bins = nperseg / 2 + 1;
    let mut power = vec![0.0; n_bins];

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);
    let mut buffer = vec![Complex64::new(0.0, 0.0); nperseg];

    for seg in 0..n_segments {
        let segment = &signal[seg * step..seg * step + nperseg];
        let mean = segment.iter().sum::<f64>() / nperseg as f64;
        for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&window) {
            *slot = Complex64::new((x - mean) * w, 0.0);
        }
        fft.process(&mut buffer);
        for (acc, c) in power.iter_mut().zip(&buffer) {
            *acc += c.norm_sqr() * scale;
        }
    }

    // One-sided: double everything except DC and (for even lengths) Nyquist.
    let last_doubled = if nperseg % 2 == 0 { n_bins - 1 } else { n_bins };
    for (k, p) in power.iter_mut().enumerate() {
        *p /= n_segments.max(1) as f64;
        if k > 0 && k < last_doubled {
            *p *= 2.0;
        }
    }

    let freqs = (0..n_bins).map(|k| k as f64 * fs / nperseg as f64).collect();
    Psd { freqs, power }
}

/// Non-negative half of the two-sided spectrum, `|FFT|^2 / N`, using the
/// `fftfreq` layout (for even `N` the Nyquist bin counts as negative).
pub struct PowerSpectrum {
    planner: FftPlanner<f64>,
}

impl PowerSpectrum {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Returns `(freqs, power)` for the non-negative frequency bins.
    pub fn compute(&mut self, signal: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
        let n = signal.len();
        if n == 0 {
            return (Vec::new(), Vec::new());
        }
        let fft = self.planner.plan_fft_forward(n);
        let mut buffer: Vec<Complex64> = signal.iter().map(|&x| Complex64::new(x, 0.0)).collect();
        fft.process(&mut buffer);

        let n_pos = (n + 1) / 2;
        let freqs = (0..n_pos).map(|k| k as f64 * fs / n as f64).collect();
        let power = buffer[..n_pos]
            .iter()
            .map(|c| c.norm_sqr() / n as f64)
            .collect();
        (freqs, power)
    }
}

impl Default for PowerSpectrum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn welch_peaks_at_tone() {
        let psd = welch(&sine(2.0, 30.0, 90), 30.0, 256);
        assert_eq!(psd.freqs.len(), 46);
        assert_abs_diff_eq!(psd.freqs[1], 30.0 / 90.0, epsilon = 1e-12);
        assert_abs_diff_eq!(psd.peak_frequency().unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn welch_averages_overlapping_segments() {
        let psd = welch(&sine(1.25, 20.0, 512), 20.0, 128);
        assert_eq!(psd.freqs.len(), 65);
        assert_abs_diff_eq!(psd.peak_frequency().unwrap(), 1.25, epsilon = 1e-9);
    }

    #[test]
    fn welch_integrates_to_variance() {
        // Density scaling: sum(psd) * df approximates the signal power.
        let x = sine(3.0, 30.0, 300);
        let psd = welch(&x, 30.0, 300);
        let df = psd.freqs[1] - psd.freqs[0];
        let total: f64 = psd.power.iter().sum::<f64>() * df;
        // Hann window leakage conserves power for a bin-centred tone.
        assert_abs_diff_eq!(total, 0.5, epsilon = 0.02);
    }

    #[test]
    fn welch_of_empty_signal_has_no_bins() {
        let psd = welch(&[], 30.0, 256);
        assert!(psd.freqs.is_empty());
        assert!(psd.peak_frequency().is_none());
    }

    #[test]
    fn power_spectrum_uses_fftfreq_layout() {
        let mut spectrum = PowerSpectrum::new();
        let (freqs, power) = spectrum.compute(&sine(2.0, 30.0, 90), 30.0);
        assert_eq!(freqs.len(), 45);
        assert_abs_diff_eq!(*freqs.last().unwrap(), 44.0 / 3.0, epsilon = 1e-12);
        assert_eq!(argmax(&power), Some(6));
        // |X_k|^2 / N for a unit sine is N / 4 at the tone bin.
        assert_abs_diff_eq!(power[6], 90.0 / 4.0, epsilon = 1e-9);

        let (odd_freqs, _) = spectrum.compute(&[1.0, 2.0, 3.0], 3.0);
        assert_eq!(odd_freqs, vec![0.0, 1.0]);
    }

    #[test]
    fn argmax_skips_nan_and_keeps_first() {
        assert_eq!(argmax(&[f64::NAN, 1.0, 3.0, 3.0]), Some(2));
        assert_eq!(argmax(&[f64::NAN]), None);
    }
}
