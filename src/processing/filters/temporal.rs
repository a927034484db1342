use nalgebra::{Matrix3, Vector3};
use ndarray::{s, Array4, ArrayView4};
use num_complex::Complex32;
use rustfft::FftPlanner;

fn rgb_to_yiq() -> Matrix3<f32> {
    Matrix3::new(
        0.299, 0.587, 0.114, //
        0.596, -0.274, -0.322, //
        0.211, -0.523, 0.312,
    )
}

/// Parameters of the Eulerian amplification pass.
#[derive(Debug, Clone, Copy)]
pub struct TemporalBand {
    pub f_low: f64,
    pub f_high: f64,
    pub alpha: f32,
    pub attenuation: f32,
}

/// Ideal temporal band-pass per pixel in YIQ space. Output is
/// `yiq + alpha * bandpassed`, with the chroma channels further scaled by
/// `attenuation`, converted back to RGB. Shape is preserved.
pub fn temporal_filter(video: ArrayView4<f32>, fps: f64, band: TemporalBand) -> Array4<f32> {
    let (n_frames, height, width, channels) = video.dim();
    let mut out = video.to_owned();
    if n_frames == 0 || channels != 3 {
        return out;
    }

    let to_yiq = rgb_to_yiq();
    let Some(to_rgb) = to_yiq.try_inverse() else {
        return out;
    };
    let keep: Vec<bool> = (0..n_frames)
        .map(|k| {
            let f = fft_frequency(k, n_frames, fps).abs();
            f >= band.f_low && f <= band.f_high
        })
        .collect();
    if !keep.iter().any(|&k| k) {
        return out;
    }

    let gains = [
        band.alpha,
        band.alpha * band.attenuation,
        band.alpha * band.attenuation,
    ];

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(n_frames);
    let inverse = planner.plan_fft_inverse(n_frames);
    let norm = 1.0 / n_frames as f32;

    let mut yiq = vec![Vector3::<f32>::zeros(); n_frames];
    let mut buffer = vec![Complex32::new(0.0, 0.0); n_frames];

    for y in 0..height {
        for x in 0..width {
            let series = video.slice(s![.., y, x, ..]);
            for (t, px) in series.outer_iter().enumerate() {
                yiq[t] = to_yiq * Vector3::new(px[0], px[1], px[2]);
            }

            for ch in 0..3 {
                for (slot, sample) in buffer.iter_mut().zip(&yiq) {
                    *slot = Complex32::new(sample[ch], 0.0);
                }
                forward.process(&mut buffer);
                for (bin, &k) in buffer.iter_mut().zip(&keep) {
                    if !k {
                        *bin = Complex32::new(0.0, 0.0);
                    }
                }
                inverse.process(&mut buffer);
                for (sample, c) in yiq.iter_mut().zip(&buffer) {
                    sample[ch] += gains[ch] * c.re * norm;
                }
            }

            for (t, sample) in yiq.iter().enumerate() {
                let rgb = to_rgb * sample;
                for c in 0..3 {
                    out[[t, y, x, c]] = rgb[c];
                }
            }
        }
    }
    out
}

/// Frequency of FFT bin `k` for a length-`n` transform (`fftfreq` layout).
pub fn fft_frequency(k: usize, n: usize, fs: f64) -> f64 {
    let signed = if k < (n + 1) / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    };
    signed * fs / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::PI;

    fn pulsing_video(freq: f32, fps: f32, n: usize) -> Array4<f32> {
        Array4::from_shape_fn((n, 2, 2, 3), |(t, _, _, c)| {
            let base = [150.0, 100.0, 80.0][c];
            base + (2.0 * PI * freq * t as f32 / fps).sin()
        })
    }

    #[test]
    fn color_space_round_trip() {
        let to_yiq = rgb_to_yiq();
        let inv = to_yiq.try_inverse().unwrap();
        let rgb = Vector3::new(200.0, 50.0, 12.0);
        let back = inv * (to_yiq * rgb);
        for c in 0..3 {
            assert_abs_diff_eq!(back[c], rgb[c], epsilon = 1e-3);
        }
    }

    #[test]
    fn fftfreq_layout() {
        assert_eq!(fft_frequency(0, 4, 4.0), 0.0);
        assert_eq!(fft_frequency(1, 4, 4.0), 1.0);
        assert_eq!(fft_frequency(2, 4, 4.0), -2.0);
        assert_eq!(fft_frequency(3, 4, 4.0), -1.0);
        assert_eq!(fft_frequency(2, 5, 5.0), 2.0);
    }

    #[test]
    fn in_band_tone_is_amplified() {
        let video = pulsing_video(2.0, 30.0, 90);
        let band = TemporalBand {
            f_low: 1.85,
            f_high: 2.15,
            alpha: 2.0,
            attenuation: 1.0,
        };
        let out = temporal_filter(video.view(), 30.0, band);
        assert_eq!(out.dim(), video.dim());
        for t in 0..90 {
            let pulse = (2.0 * PI * 2.0 * t as f32 / 30.0).sin();
            assert_abs_diff_eq!(out[[t, 1, 0, 0]], 150.0 + 3.0 * pulse, epsilon = 1e-2);
            assert_abs_diff_eq!(out[[t, 0, 1, 2]], 80.0 + 3.0 * pulse, epsilon = 1e-2);
        }
    }

    #[test]
    fn out_of_band_tone_is_untouched() {
        let video = pulsing_video(6.0, 30.0, 90);
        let band = TemporalBand {
            f_low: 1.85,
            f_high: 2.15,
            alpha: 10.0,
            attenuation: 1.0,
        };
        let out = temporal_filter(video.view(), 30.0, band);
        for (a, b) in out.iter().zip(video.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-2);
        }
    }
}
