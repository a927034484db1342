use log::{info, warn};
use ndarray::{Array1, Array2, Array3, Array4, ArrayView2, Zip};

use crate::config::{Config, RenderMode};
use crate::error::{PatchIndex, Result, Stage};
use crate::io::{check_mask_shape, Video};
use crate::processing::heart_rate::{HeartRateEstimate, HeartRateEstimator};
use crate::processing::patch_grid::PatchGrid;
use crate::processing::pool::PatchPool;
use crate::processing::reference::ReferenceSelector;
use crate::processing::signal_map::{amplitude_map, SignalMapExtractor};
use crate::processing::time_delay::TimeDelayEstimator;
use crate::processing::validity::{ValidityReport, ValidityScorer};
use crate::selection::CenterPoint;
use crate::visualization::{HeatmapRenderer, Overlay, RenderInput};

// -----------------------------------------------------------------------------
// RESULT
// -----------------------------------------------------------------------------

/// Everything one run produces before rendering.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub grid: PatchGrid,
    pub center: CenterPoint,
    pub center_patch: PatchIndex,
    pub heart_rate: HeartRateEstimate,
    /// Narrow band around the heart-rate frequency used for the signal map.
    pub band: (f64, f64),
    pub signals: Array3<f64>,
    pub amplitude: Array2<f64>,
    pub validity: ValidityReport,
    /// SNR validity intersected with the patch segmentation mask.
    pub valid: Array2<bool>,
    pub reference: Array1<f64>,
    pub delays: Array2<f64>,
    pub max_lag_frames: usize,
}

impl PipelineResult {
    pub fn n_valid(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Valid patches as a fraction of the segmented ones.
    pub fn valid_fraction(&self) -> f64 {
        let segmented = self.grid.n_segmented();
        if segmented == 0 {
            return 0.0;
        }
        self.n_valid() as f64 / segmented as f64
    }

    /// Smallest and largest finite delay, in seconds.
    pub fn delay_range(&self) -> Option<(f64, f64)> {
        self.delays
            .iter()
            .copied()
            .filter(|d| d.is_finite())
            .fold(None, |acc, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
    }
}

// -----------------------------------------------------------------------------
// PIPELINE
// -----------------------------------------------------------------------------

pub struct Pipeline {
    config: Config,
    pool: PatchPool,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = PatchPool::new(config.processor.threads)?;
        Ok(Pipeline { config, pool })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &PatchPool {
        &self.pool
    }

    /// Runs every stage from the patch grid to the delay map. Errors carry the
    /// stage they were raised in.
    pub fn analyze(&self, video: &Video, mask: ArrayView2<bool>, center: CenterPoint) -> Result<PipelineResult> {
        let config = &self.config;
        let fps = video.fps;
        let frames = video.frames.view();

        check_mask_shape(mask, video.height(), video.width()).map_err(|e| e.in_stage(Stage::PatchGrid))?;
        let grid = PatchGrid::new(mask, config.grid.window_size).map_err(|e| e.in_stage(Stage::PatchGrid))?;
        let center_patch = grid.patch_of(center);
        info!(
            "patch grid {}x{} ({} segmented), center {:?} -> patch {:?}",
            grid.n_patches_h,
            grid.n_patches_w,
            grid.n_segmented(),
            center,
            center_patch
        );
        if !grid.contains(center_patch) {
            warn!("center {:?} lies in the cropped margin, reference block is clipped to the grid", center);
        }

        let extractor = config.extraction.method.build(fps, &config.extraction);

        let heart_rate = HeartRateEstimator::new(config.heart_rate.clone())
            .estimate(frames, fps, center, extractor.as_ref())
            .map_err(|e| e.in_stage(Stage::HeartRate))?;
        let band = heart_rate.band(config.signal_map.band_half_width);

        let signals = SignalMapExtractor::new(config.signal_map.clone())
            .extract(frames, fps, band, &grid, extractor.as_ref(), &self.pool)
            .map_err(|e| e.in_stage(Stage::SignalMap))?;
        let amplitude = amplitude_map(signals.view());

        let validity = ValidityScorer::new(config.validity.clone()).score(signals.view(), grid.mask.view(), fps, band);
        let valid = Zip::from(&validity.valid_mask)
            .and(&grid.mask)
            .map_collect(|&snr_ok, &segmented| snr_ok && segmented);
        info!(
            "{} of {} segmented patches valid (threshold {:.2} dB)",
            valid.iter().filter(|&&v| v).count(),
            grid.n_segmented(),
            validity.threshold
        );

        let reference = ReferenceSelector::new(config.reference.neighborhood_size)
            .select(signals.view(), grid.mask.view(), center_patch)
            .map_err(|e| e.in_stage(Stage::Reference))?;

        let estimator = TimeDelayEstimator::new(config.time_delay.clone());
        let max_lag_frames = estimator.max_lag_frames(fps);
        let delays = estimator
            .estimate(signals.view(), reference.view(), valid.view(), fps, &self.pool)
            .map_err(|e| e.in_stage(Stage::TimeDelay))?;

        let result = PipelineResult {
            grid,
            center,
            center_patch,
            heart_rate,
            band,
            signals,
            amplitude,
            validity,
            valid,
            reference,
            delays,
            max_lag_frames,
        };
        match result.delay_range() {
            Some((lo, hi)) => info!("delays range {:.3} s to {:.3} s", lo, hi),
            None => warn!("no finite delay was estimated"),
        }
        Ok(result)
    }

    /// Composites the heatmap for the configured mode and, if enabled, draws
    /// the reference box and trace.
    pub fn render<'a>(
        &self,
        video: &'a Video,
        mask: ArrayView2<'a, bool>,
        result: &'a PipelineResult,
    ) -> Result<Array4<u8>> {
        let renderer = HeatmapRenderer::new(&self.config.render);
        let input = RenderInput {
            video: video.frames.view(),
            segmentation: mask,
            volume: result.signals.view(),
            reference: result.reference.view(),
            delays: Some(result.delays.view()),
            valid: result.valid.view(),
            window_size: result.grid.window_size,
            fps: video.fps,
        };
        let rendered = renderer.render(&input).map_err(|e| e.in_stage(Stage::Render))?;
        if !self.config.render.draw_overlay {
            return Ok(rendered);
        }
        let overlay = Overlay::new(result.grid.window_size, self.config.reference.neighborhood_size);
        Ok(overlay.draw(rendered.view(), result.center, result.reference.view()))
    }

    pub fn mode(&self) -> RenderMode {
        self.config.render.mode
    }
}
