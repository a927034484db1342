use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use log::debug;
use ndarray::{s, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis, Zip};
use plotters::style::colors::colormaps::ViridisRGB;

use crate::config::{RenderConfig, RenderMode};
use crate::error::{PipelineError, Result};
use crate::visualization::colormap::{jet, to_level};

/// Everything the renderer reads. `valid` is the SNR mask already intersected
/// with the patch segmentation mask.
pub struct RenderInput<'a> {
    pub video: ArrayView4<'a, u8>,
    pub segmentation: ArrayView2<'a, bool>,
    pub volume: ArrayView3<'a, f64>,
    pub reference: ArrayView1<'a, f64>,
    pub delays: Option<ArrayView2<'a, f64>>,
    pub valid: ArrayView2<'a, bool>,
    pub window_size: usize,
    pub fps: f64,
}

pub struct HeatmapRenderer {
    mode: RenderMode,
    red_threshold: f64,
}

impl HeatmapRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        HeatmapRenderer {
            mode: config.mode,
            red_threshold: config.red_threshold,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Colour-coded overlay composited onto the input video.
    pub fn render(&self, input: &RenderInput) -> Result<Array4<u8>> {
        let (n_frames, height, width, _) = input.video.dim();
        if input.segmentation.dim() != (height, width) {
            return Err(PipelineError::ShapeMismatch(format!(
                "segmentation mask {:?} does not match frames {}x{}",
                input.segmentation.dim(),
                height,
                width
            )));
        }
        let (vh, vw, vt) = input.volume.dim();
        if (vh, vw) != input.valid.dim() || vt != n_frames {
            return Err(PipelineError::ShapeMismatch(format!(
                "signal volume {:?} does not match validity mask {:?} and {} frames",
                input.volume.dim(),
                input.valid.dim(),
                n_frames
            )));
        }
        let levels = match self.mode {
            RenderMode::Intensity => intensity_levels(input, n_frames, height, width),
            RenderMode::Delay => {
                let delays = input.delays.ok_or_else(|| {
                    PipelineError::InvalidConfig("delay rendering needs a delay map".to_string())
                })?;
                if delays.dim() != input.valid.dim() {
                    return Err(PipelineError::ShapeMismatch(format!(
                        "delay map {:?} does not match validity mask {:?}",
                        delays.dim(),
                        input.valid.dim()
                    )));
                }
                delay_levels(input, delays, n_frames, height, width)
            }
        };
        debug!("rendering {:?} heatmap for {} frames", self.mode, n_frames);
        let heatmap = colorize(levels.view());
        Ok(composite(
            input.video,
            heatmap.view(),
            input.segmentation,
            self.red_threshold,
        ))
    }
}

/// Per-pixel heatmap levels from each valid patch's raw waveform, min-max
/// normalised over the valid patches.
fn intensity_levels(input: &RenderInput, n_frames: usize, height: usize, width: usize) -> Array3<u8> {
    let mut levels = Array3::<u8>::zeros((n_frames, height, width));
    let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
    for ((i, j), &ok) in input.valid.indexed_iter() {
        if ok {
            for &v in input.volume.slice(s![i, j, ..]).iter() {
                min = min.min(v);
                max = max.max(v);
            }
        }
    }
    let span = max - min;
    if !(span > 0.0) {
        return levels;
    }

    fill_patches(&mut levels, input.valid, input.window_size, |(i, j), t| {
        to_level((input.volume[[i, j, t]] - min) / span)
    });
    levels
}

/// Per-pixel levels replaying the reference at each patch's delay:
/// `ref[(t + round(delay * fps)) mod n]`, clipped to `[0, 1]`.
fn delay_levels(
    input: &RenderInput,
    delays: ArrayView2<f64>,
    n_frames: usize,
    height: usize,
    width: usize,
) -> Array3<u8> {
    let mut levels = Array3::<u8>::zeros((n_frames, height, width));
    let n_ref = input.reference.len() as i64;
    if n_ref == 0 {
        return levels;
    }
    let usable = Zip::from(input.valid)
        .and(delays)
        .map_collect(|&ok, &d| ok && d.is_finite());

    fill_patches(&mut levels, usable.view(), input.window_size, |(i, j), t| {
        let shift = (delays[[i, j]] * input.fps).round() as i64;
        let idx = (t as i64 + shift).rem_euclid(n_ref) as usize;
        to_level(input.reference[idx])
    });
    levels
}

/// Writes `level(patch, frame)` into every pixel of each selected patch.
fn fill_patches<F>(levels: &mut Array3<u8>, selected: ArrayView2<bool>, window: usize, level: F)
where
    F: Fn((usize, usize), usize) -> u8,
{
    let (n_frames, height, width) = levels.dim();
    for ((i, j), &ok) in selected.indexed_iter() {
        let (y1, x1) = ((i + 1) * window, (j + 1) * window);
        if !ok || y1 > height || x1 > width {
            continue;
        }
        for t in 0..n_frames {
            levels
                .slice_mut(s![t, i * window..y1, j * window..x1])
                .fill(level((i, j), t));
        }
    }
}

/// Applies the jet map to every level.
pub fn colorize(levels: ArrayView3<u8>) -> Array4<u8> {
    let (n, h, w) = levels.dim();
    let mut out = Array4::<u8>::zeros((n, h, w, 3));
    for ((t, y, x), &level) in levels.indexed_iter() {
        let rgb = jet(level);
        for c in 0..3 {
            out[[t, y, x, c]] = rgb[c];
        }
    }
    out
}

/// Takes heatmap pixels where the pixel lies in the segmentation mask and the
/// heatmap red channel exceeds `red_threshold`; the original video elsewhere.
pub fn composite(
    video: ArrayView4<u8>,
    heatmap: ArrayView4<u8>,
    segmentation: ArrayView2<bool>,
    red_threshold: f64,
) -> Array4<u8> {
    let mut out = video.to_owned();
    for (mut frame, heat) in out.axis_iter_mut(Axis(0)).zip(heatmap.axis_iter(Axis(0))) {
        for ((y, x), &inside) in segmentation.indexed_iter() {
            if inside && f64::from(heat[[y, x, 0]]) / 255.0 > red_threshold {
                frame
                    .slice_mut(s![y, x, ..])
                    .assign(&heat.slice(s![y, x, ..]));
            }
        }
    }
    out
}

/// Static pulse-transit-time image: the delay map min-max normalised over its
/// finite values (non-finite map to 0), jet-coloured and resized bilinearly.
pub fn ptt_image(delays: ArrayView2<f64>, height: usize, width: usize) -> RgbImage {
    let finite = delays.iter().copied().filter(|d| d.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), d| {
        (lo.min(d), hi.max(d))
    });
    let span = max - min;
    let (h, w) = delays.dim();
    let small = RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let d = delays[[y as usize, x as usize]];
        let level = if span > 0.0 && d.is_finite() {
            to_level((d - min) / span)
        } else {
            0
        };
        Rgb(jet(level))
    });
    imageops::resize(&small, width as u32, height as u32, FilterType::Triangle)
}

/// Mean-amplitude map coloured with viridis, one `scale x scale` block per patch.
pub fn amplitude_image(amplitude: ArrayView2<f64>, scale: u32) -> RgbImage {
    let max = amplitude
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    let min = amplitude
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::INFINITY, f64::min);
    let span = max - min;
    let (h, w) = amplitude.dim();
    let scale = scale.max(1);
    RgbImage::from_fn(w as u32 * scale, h as u32 * scale, |x, y| {
        let v = amplitude[[(y / scale) as usize, (x / scale) as usize]];
        let norm = if span > 0.0 && v.is_finite() { (v - min) / span } else { 0.0 };
        let c = ViridisRGB::get_color(norm);
        Rgb([c.0, c.1, c.2])
    })
}
