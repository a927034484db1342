use log::{debug, info};
use ndarray::{s, Array2, Array3, Array4, ArrayView3, ArrayView4, Axis};

use crate::config::SignalMapConfig;
use crate::error::{PatchIndex, PipelineError, Result, Stage};
use crate::processing::extractors::PulseExtractor;
use crate::processing::filters::{spatial_filter, temporal_filter, TemporalBand};
use crate::processing::patch_grid::PatchGrid;
use crate::processing::pool::PatchPool;

/// Read-only state shared by every extraction worker.
pub struct ExtractionContext<'a> {
    pub filtered: ArrayView4<'a, f32>,
    pub window_size: usize,
    pub extractor: &'a dyn PulseExtractor,
}

impl<'a> ExtractionContext<'a> {
    /// Pulse waveform of one patch of the filtered video.
    pub fn extract_patch(&self, (i, j): PatchIndex) -> Result<Vec<f64>> {
        let w = self.window_size;
        let n_frames = self.filtered.len_of(Axis(0));
        let (_, height, width, _) = self.filtered.dim();
        if (i + 1) * w > height || (j + 1) * w > width {
            return Err(PipelineError::ShapeMismatch(format!(
                "patch ({}, {}) lies outside the {}x{} frame",
                i, j, height, width
            )));
        }
        let patch = self
            .filtered
            .slice(s![.., i * w..(i + 1) * w, j * w..(j + 1) * w, ..]);
        let waveform = self.extractor.extract(patch);
        if waveform.len() != n_frames {
            return Err(PipelineError::ShapeMismatch(format!(
                "{} returned {} samples for {} frames",
                self.extractor.name(),
                waveform.len(),
                n_frames
            )));
        }
        Ok(waveform)
    }
}

pub struct SignalMapExtractor {
    config: SignalMapConfig,
}

impl SignalMapExtractor {
    pub fn new(config: SignalMapConfig) -> Self {
        SignalMapExtractor { config }
    }

    /// Spatial pyramid blur followed by temporal amplification of `band`.
    pub fn filter_video(&self, video: ArrayView4<u8>, fps: f64, band: (f64, f64)) -> Array4<f32> {
        let spatial = spatial_filter(video, self.config.pyramid_levels);
        debug!("spatial filter done, applying temporal filter {:?} Hz", band);
        temporal_filter(
            spatial.view(),
            fps,
            TemporalBand {
                f_low: band.0,
                f_high: band.1,
                alpha: self.config.alpha as f32,
                attenuation: self.config.attenuation as f32,
            },
        )
    }

    /// Builds the `(n_patches_h, n_patches_w, n_frames)` signal volume. Patches
    /// outside the segmentation stay zero.
    pub fn extract(
        &self,
        video: ArrayView4<u8>,
        fps: f64,
        band: (f64, f64),
        grid: &PatchGrid,
        extractor: &dyn PulseExtractor,
        pool: &PatchPool,
    ) -> Result<Array3<f64>> {
        let filtered = self.filter_video(video, fps, band);
        let ctx = ExtractionContext {
            filtered: filtered.view(),
            window_size: grid.window_size,
            extractor,
        };
        let tasks = grid.segmented_patches();
        info!(
            "extracting {} patch signals with {} on {} threads",
            tasks.len(),
            extractor.name(),
            pool.threads()
        );

        let results = pool.run(Stage::SignalMap, &ctx, &tasks, |ctx, patch| {
            ctx.extract_patch(patch)
        })?;

        let n_frames = video.len_of(Axis(0));
        let mut volume = Array3::<f64>::zeros((grid.n_patches_h, grid.n_patches_w, n_frames));
        for ((i, j), waveform) in results {
            volume
                .slice_mut(s![i, j, ..])
                .assign(&ndarray::ArrayView1::from(&waveform));
        }
        Ok(volume)
    }
}

/// Mean absolute amplitude of each patch waveform.
pub fn amplitude_map(volume: ArrayView3<f64>) -> Array2<f64> {
    let n_frames = volume.len_of(Axis(2));
    if n_frames == 0 {
        let (h, w, _) = volume.dim();
        return Array2::zeros((h, w));
    }
    volume.mapv(f64::abs).sum_axis(Axis(2)) / n_frames as f64
}
