use ndarray::{s, Array2, ArrayView2};

use crate::error::{PatchIndex, PipelineError, Result};

/// Regular square tiling of the frame. Trailing rows and columns that do not
/// fill a whole patch are dropped.
#[derive(Debug, Clone)]
pub struct PatchGrid {
    pub window_size: usize,
    pub n_patches_h: usize,
    pub n_patches_w: usize,
    /// `true` where every pixel of the patch is inside the segmentation mask.
    pub mask: Array2<bool>,
}

impl PatchGrid {
    pub fn new(segmentation_mask: ArrayView2<bool>, window_size: usize) -> Result<Self> {
        if window_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "window_size must be positive".to_string(),
            ));
        }
        let (height, width) = segmentation_mask.dim();
        let n_patches_h = height / window_size;
        let n_patches_w = width / window_size;

        let mask = Array2::from_shape_fn((n_patches_h, n_patches_w), |(i, j)| {
            segmentation_mask
                .slice(s![
                    i * window_size..(i + 1) * window_size,
                    j * window_size..(j + 1) * window_size
                ])
                .iter()
                .all(|&inside| inside)
        });

        Ok(PatchGrid {
            window_size,
            n_patches_h,
            n_patches_w,
            mask,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_patches_h, self.n_patches_w)
    }

    /// Pixel rows and columns covered by patch `(i, j)`.
    pub fn pixel_bounds(&self, (i, j): PatchIndex) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
        let w = self.window_size;
        (i * w..(i + 1) * w, j * w..(j + 1) * w)
    }

    /// Patch index of pixel `(row, col)`. Pixels in the cropped margin map
    /// past the last row or column of the grid.
    pub fn patch_of(&self, (row, col): (usize, usize)) -> PatchIndex {
        (row / self.window_size, col / self.window_size)
    }

    pub fn contains(&self, (i, j): PatchIndex) -> bool {
        i < self.n_patches_h && j < self.n_patches_w
    }

    /// Row-major list of segmentation-valid patches.
    pub fn segmented_patches(&self) -> Vec<PatchIndex> {
        masked_indices(self.mask.view())
    }

    pub fn n_segmented(&self) -> usize {
        self.mask.iter().filter(|&&v| v).count()
    }
}

/// Row-major coordinates of the `true` cells.
pub fn masked_indices(mask: ArrayView2<bool>) -> Vec<PatchIndex> {
    mask.indexed_iter()
        .filter_map(|(idx, &v)| v.then_some(idx))
        .collect()
}
