use ndarray::{s, Array4, ArrayView1, ArrayView4, ArrayViewMut3, Axis};

use crate::selection::CenterPoint;

const BOX_COLOR: [u8; 3] = [0, 255, 0];
const TRACE_COLOR: [u8; 3] = [255, 255, 255];
const CURSOR_COLOR: [u8; 3] = [255, 0, 0];

/// Annotates the rendered video: an outline around the reference
/// neighbourhood and a strip along the bottom edge that plots the reference
/// waveform with a cursor at the current frame.
pub struct Overlay {
    window_size: usize,
    neighborhood_size: usize,
    strip_height: usize,
}

impl Overlay {
    pub fn new(window_size: usize, neighborhood_size: usize) -> Self {
        Overlay {
            window_size,
            neighborhood_size,
            strip_height: 0,
        }
    }

    /// Fixed strip height in pixels. Zero picks a sixth of the frame height.
    pub fn with_strip_height(mut self, strip_height: usize) -> Self {
        self.strip_height = strip_height;
        self
    }

    /// Pixel rectangle `(y0, x0, y1, x1)` (inclusive) covering the patches
    /// within `neighborhood_size` of the center patch, clipped to the frame.
    pub fn box_bounds(&self, center: CenterPoint, height: usize, width: usize) -> Option<(usize, usize, usize, usize)> {
        let w = self.window_size.max(1);
        if height == 0 || width == 0 {
            return None;
        }
        let (ci, cj) = (center.0 / w, center.1 / w);
        let r = self.neighborhood_size;
        let y0 = (ci.saturating_sub(r) * w).min(height - 1);
        let x0 = (cj.saturating_sub(r) * w).min(width - 1);
        let y1 = ((ci + r + 1) * w).min(height) - 1;
        let x1 = ((cj + r + 1) * w).min(width) - 1;
        Some((y0, x0, y1, x1))
    }

    pub fn draw(&self, video: ArrayView4<u8>, center: CenterPoint, reference: ArrayView1<f64>) -> Array4<u8> {
        let mut out = video.to_owned();
        let (n_frames, height, width, _) = out.dim();
        let bounds = self.box_bounds(center, height, width);
        let strip = if self.strip_height > 0 {
            self.strip_height.min(height)
        } else {
            height / 6
        };

        for (t, mut frame) in out.axis_iter_mut(Axis(0)).enumerate() {
            if let Some(bounds) = bounds {
                draw_rectangle(&mut frame, bounds);
            }
            if strip >= 2 && !reference.is_empty() {
                draw_trace(&mut frame, reference, strip, t, n_frames);
            }
        }
        out
    }
}

fn put(frame: &mut ArrayViewMut3<u8>, y: usize, x: usize, color: [u8; 3]) {
    frame.slice_mut(s![y, x, ..]).assign(&ArrayView1::from(&color));
}

fn draw_rectangle(frame: &mut ArrayViewMut3<u8>, (y0, x0, y1, x1): (usize, usize, usize, usize)) {
    for x in x0..=x1 {
        put(frame, y0, x, BOX_COLOR);
        put(frame, y1, x, BOX_COLOR);
    }
    for y in y0..=y1 {
        put(frame, y, x0, BOX_COLOR);
        put(frame, y, x1, BOX_COLOR);
    }
}

/// Plots the reference over the bottom `strip` rows, one sample column per
/// pixel column, and marks frame `t` with a vertical cursor.
fn draw_trace(frame: &mut ArrayViewMut3<u8>, reference: ArrayView1<f64>, strip: usize, t: usize, n_frames: usize) {
    let (height, width, _) = frame.dim();
    let top = height - strip;
    let n = reference.len();

    frame
        .slice_mut(s![top.., .., ..])
        .mapv_inplace(|v| v / 2);

    for x in 0..width {
        let value = reference[x * n / width];
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        let y = height - 1 - (value * (strip - 1) as f64).round() as usize;
        put(frame, y, x, TRACE_COLOR);
    }

    let cursor = (t * width / n_frames.max(1)).min(width - 1);
    for y in top..height {
        put(frame, y, cursor, CURSOR_COLOR);
    }
}
