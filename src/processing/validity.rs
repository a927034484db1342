use log::{debug, warn};
use ndarray::{s, Array2, ArrayView2, ArrayView3};

use crate::config::ValidityConfig;
use crate::processing::spectral::PowerSpectrum;

/// SNR of one waveform in dB: power inside `band` over power outside it,
/// counted on the non-negative half of `|FFT|^2 / N`. `NaN` when either side
/// carries no power.
pub fn snr_db(signal: &[f64], fs: f64, band: (f64, f64), spectrum: &mut PowerSpectrum) -> f64 {
    let (freqs, power) = spectrum.compute(signal, fs);
    let (mut inside, mut outside) = (0.0, 0.0);
    for (f, p) in freqs.iter().zip(&power) {
        if *f >= band.0 && *f <= band.1 {
            inside += p;
        } else {
            outside += p;
        }
    }
    if inside == 0.0 || outside == 0.0 {
        return f64::NAN;
    }
    10.0 * (inside / outside).log10()
}

#[derive(Debug, Clone)]
pub struct ValidityReport {
    /// SNR per patch; `NaN` for unscored or degenerate patches.
    pub snr: Array2<f64>,
    pub valid_mask: Array2<bool>,
    pub threshold: f64,
    /// Scored patches whose SNR came out `NaN`.
    pub degenerate: usize,
}

impl ValidityReport {
    pub fn n_valid(&self) -> usize {
        self.valid_mask.iter().filter(|&&v| v).count()
    }
}

pub struct ValidityScorer {
    config: ValidityConfig,
}

impl ValidityScorer {
    pub fn new(config: ValidityConfig) -> Self {
        ValidityScorer { config }
    }

    /// Scores every segmented patch and keeps those above
    /// `mean(SNR) - std_factor * std(SNR)`.
    pub fn score(
        &self,
        volume: ArrayView3<f64>,
        segmentation: ArrayView2<bool>,
        fs: f64,
        band: (f64, f64),
    ) -> ValidityReport {
        let (h, w, _) = volume.dim();
        let mut snr = Array2::<f64>::from_elem((h, w), f64::NAN);
        let mut spectrum = PowerSpectrum::new();
        let mut degenerate = 0;

        for ((i, j), &segmented) in segmentation.indexed_iter() {
            if !segmented || i >= h || j >= w {
                continue;
            }
            let waveform = volume.slice(s![i, j, ..]).to_vec();
            let value = snr_db(&waveform, fs, band, &mut spectrum);
            if value.is_nan() {
                degenerate += 1;
            }
            snr[[i, j]] = value;
        }
        if degenerate > 0 {
            warn!("{} patch(es) carry a degenerate signal (NaN SNR)", degenerate);
        }

        let finite: Vec<f64> = snr.iter().copied().filter(|v| !v.is_nan()).collect();
        let threshold = if finite.is_empty() {
            f64::NAN
        } else {
            let n = finite.len() as f64;
            let mean = finite.iter().sum::<f64>() / n;
            let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            mean - self.config.std_factor * var.sqrt()
        };

        let spread_is_zero = finite
            .iter()
            .all(|v| finite.first().map_or(true, |first| v == first));

        let valid_mask = snr.mapv(|v| {
            if v.is_nan() {
                false
            } else if spread_is_zero {
                true
            } else {
                v > threshold
            }
        });

        debug!(
            "SNR threshold {:.3} dB over {} scored patches",
            threshold,
            finite.len()
        );

        ValidityReport {
            snr,
            valid_mask,
            threshold,
            degenerate,
        }
    }
}
