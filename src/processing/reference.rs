use log::debug;
use ndarray::{s, Array1, ArrayView2, ArrayView3, Axis};

use crate::error::{PatchIndex, PipelineError, Result};

pub struct ReferenceSelector {
    neighborhood_size: usize,
}

impl ReferenceSelector {
    pub fn new(neighborhood_size: usize) -> Self {
        ReferenceSelector { neighborhood_size }
    }

    /// Averages the segmentation-valid patches within `neighborhood_size`
    /// patches of `center_patch` and min-max normalises the result to `[0, 1]`.
    /// A constant average yields all zeros.
    pub fn select(
        &self,
        volume: ArrayView3<f64>,
        segmentation: ArrayView2<bool>,
        center_patch: PatchIndex,
    ) -> Result<Array1<f64>> {
        let (h, w, n_frames) = volume.dim();
        let (ci, cj) = center_patch;
        let r = self.neighborhood_size;
        let rows = ci.saturating_sub(r)..(ci + r + 1).min(h);
        let cols = cj.saturating_sub(r)..(cj + r + 1).min(w);

        let mut sum = Array1::<f64>::zeros(n_frames);
        let mut count = 0usize;
        for i in rows {
            for j in cols.clone() {
                if segmentation.get((i, j)).copied().unwrap_or(false) {
                    sum += &volume.slice(s![i, j, ..]);
                    count += 1;
                }
            }
        }

        if count == 0 {
            return Err(PipelineError::NoValidReferenceRegion {
                row: ci,
                col: cj,
                radius: r,
            });
        }
        debug!("reference averaged over {} patch(es)", count);

        let average = sum / count as f64;
        Ok(min_max_normalize(average))
    }
}

/// Scales into `[0, 1]`; a constant input becomes all zeros.
pub fn min_max_normalize(x: Array1<f64>) -> Array1<f64> {
    let min = x.iter().copied().fold(f64::INFINITY, f64::min);
    let max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if x.is_empty() || max == min {
        return Array1::zeros(x.len_of(Axis(0)));
    }
    x.mapv(|v| (v - min) / (max - min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, Array2, Array3};

    fn volume() -> Array3<f64> {
        Array3::from_shape_fn((4, 4, 5), |(i, j, t)| (i * 4 + j) as f64 + t as f64 * (1 + j) as f64)
    }

    #[test]
    fn output_is_unit_range() {
        let volume = volume();
        let seg = Array2::from_elem((4, 4), true);
        let reference = ReferenceSelector::new(1)
            .select(volume.view(), seg.view(), (1, 1))
            .unwrap();
        assert_eq!(reference.len(), 5);
        assert_abs_diff_eq!(reference[0], 0.0);
        assert_abs_diff_eq!(reference[4], 1.0);
        assert!(reference.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn neighbourhood_is_clipped_to_the_grid() {
        let volume = volume();
        let mut seg = Array2::from_elem((4, 4), false);
        seg[[0, 1]] = true;
        seg[[3, 3]] = true;
        // Only (0, 1) lies in the clipped block around (0, 0).
        let reference = ReferenceSelector::new(1)
            .select(volume.view(), seg.view(), (0, 0))
            .unwrap();
        let expected = min_max_normalize(volume.slice(s![0, 1, ..]).to_owned());
        assert_eq!(reference, expected);
    }

    #[test]
    fn empty_neighbourhood_is_an_error() {
        let volume = volume();
        let mut seg = Array2::from_elem((4, 4), false);
        seg[[3, 3]] = true;
        let err = ReferenceSelector::new(1)
            .select(volume.view(), seg.view(), (0, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoValidReferenceRegion { row: 0, col: 0, radius: 1 }
        ));
    }

    #[test]
    fn constant_average_is_all_zero() {
        assert_eq!(min_max_normalize(arr1(&[2.5, 2.5, 2.5])), arr1(&[0.0, 0.0, 0.0]));
        assert_eq!(min_max_normalize(arr1(&[1.0, 3.0, 2.0])), arr1(&[0.0, 1.0, 0.5]));
    }
}
