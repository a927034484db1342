use log::{debug, info};
use ndarray::{s, ArrayView4};

use crate::config::HeartRateConfig;
use crate::error::{PipelineError, Result};
use crate::processing::extractors::PulseExtractor;
use crate::processing::filters::BandPassFilter;
use crate::processing::spectral::welch;

/// Global heart-rate estimate and the spectrum it was read from.
#[derive(Debug, Clone)]
pub struct HeartRateEstimate {
    pub bpm: f64,
    pub freqs: Vec<f64>,
    pub psd: Vec<f64>,
    /// Band-passed waveform of the region around the center point.
    pub signal: Vec<f64>,
}

impl HeartRateEstimate {
    pub fn frequency(&self) -> f64 {
        self.bpm / 60.0
    }

    /// `[f - half_width, f + half_width]` Hz around the heart-rate frequency.
    pub fn band(&self, half_width: f64) -> (f64, f64) {
        let f = self.frequency();
        (f - half_width, f + half_width)
    }
}

pub struct HeartRateEstimator {
    config: HeartRateConfig,
}

impl HeartRateEstimator {
    pub fn new(config: HeartRateConfig) -> Self {
        HeartRateEstimator { config }
    }

    /// Square `roi_size` window centred on `center`, clipped to the frame.
    pub fn roi_bounds(&self, center: (usize, usize), height: usize, width: usize) -> ((usize, usize), (usize, usize)) {
        let half = self.config.roi_size / 2;
        let clip = |c: usize, len: usize| {
            let start = c.saturating_sub(half).min(len);
            let end = (c.saturating_sub(half) + self.config.roi_size).min(len);
            (start, end.max(start))
        };
        (clip(center.0, height), clip(center.1, width))
    }

    pub fn estimate(
        &self,
        video: ArrayView4<u8>,
        fps: f64,
        center: (usize, usize),
        extractor: &dyn PulseExtractor,
    ) -> Result<HeartRateEstimate> {
        let (n_frames, height, width, _) = video.dim();
        let ((r0, r1), (c0, c1)) = self.roi_bounds(center, height, width);
        debug!(
            "heart-rate ROI rows {}..{}, cols {}..{} ({} frames)",
            r0, r1, c0, c1, n_frames
        );

        let roi = video.slice(s![.., r0..r1, c0..c1, ..]).mapv(f32::from);
        let raw = extractor.extract(roi.view());

        let filter = BandPassFilter::butterworth(
            self.config.filter_order,
            self.config.f_low,
            self.config.f_high,
            fps,
        )?;
        let signal = filter.filtfilt(&raw);

        let psd = welch(&signal, fps, self.config.welch_segment);
        let peak = psd
            .peak_frequency()
            .ok_or(PipelineError::EmptyFrequencyRange { len: signal.len() })?;

        let bpm = peak * 60.0;
        info!("estimated heart rate {:.1} BPM ({} extractor)", bpm, extractor.name());

        Ok(HeartRateEstimate {
            bpm,
            freqs: psd.freqs,
            psd: psd.power,
            signal,
        })
    }
}
