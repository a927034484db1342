//! Region and center-point selection.

use log::info;
use ndarray::{Array2, ArrayView2, ArrayView3};

use crate::error::{PipelineError, Result};

/// Pixel coordinate `(row, col)`.
pub type CenterPoint = (usize, usize);

/// Supplies the segmentation mask and the seed point for a run.
pub trait RegionSelector {
    /// Mask over the skin region of `frame` (`height x width x 3`).
    fn select_mask(&self, frame: ArrayView3<u8>) -> Result<Array2<bool>>;

    /// Seed point inside `mask`.
    fn select_point(&self, frame: ArrayView3<u8>, mask: ArrayView2<bool>) -> Result<CenterPoint>;
}

/// Non-interactive selector: a full-frame mask and either a fixed center or
/// the in-mask pixel nearest to the mask centroid.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSelector {
    pub center: Option<CenterPoint>,
}

impl ScriptedSelector {
    pub fn new(center: Option<CenterPoint>) -> Self {
        ScriptedSelector { center }
    }
}

impl RegionSelector for ScriptedSelector {
    fn select_mask(&self, frame: ArrayView3<u8>) -> Result<Array2<bool>> {
        let (h, w, _) = frame.dim();
        info!("no mask supplied, selecting the full {}x{} frame", h, w);
        Ok(Array2::from_elem((h, w), true))
    }

    fn select_point(&self, frame: ArrayView3<u8>, mask: ArrayView2<bool>) -> Result<CenterPoint> {
        let (h, w, _) = frame.dim();
        if let Some((row, col)) = self.center {
            if row >= h || col >= w {
                return Err(PipelineError::Selection(format!(
                    "center ({}, {}) lies outside the {}x{} frame",
                    row, col, h, w
                )));
            }
            return Ok((row, col));
        }
        mask_centroid(mask).ok_or_else(|| {
            PipelineError::Selection("segmentation mask contains no pixels".to_string())
        })
    }
}

/// In-mask pixel closest to the centroid of the mask.
pub fn mask_centroid(mask: ArrayView2<bool>) -> Option<CenterPoint> {
    let (mut sum_r, mut sum_c, mut count) = (0.0, 0.0, 0usize);
    for ((r, c), &inside) in mask.indexed_iter() {
        if inside {
            sum_r += r as f64;
            sum_c += c as f64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    let (cr, cc) = (sum_r / count as f64, sum_c / count as f64);
    mask.indexed_iter()
        .filter(|&(_, &inside)| inside)
        .map(|((r, c), _)| {
            let d = (r as f64 - cr).powi(2) + (c as f64 - cc).powi(2);
            ((r, c), d)
        })
        .fold(None, |best: Option<(CenterPoint, f64)>, (p, d)| match best {
            Some((_, bd)) if bd <= d => best,
            _ => Some((p, d)),
        })
        .map(|(p, _)| p)
}
