use ndarray::{s, Array2, Array4, ArrayView2, ArrayView4};

// 5-tap binomial approximation of a Gaussian.
const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Blurs every frame and channel through a Gaussian pyramid: `levels` reductions
/// followed by the same number of expansions back to the original frame size.
pub fn spatial_filter(video: ArrayView4<u8>, levels: usize) -> Array4<f32> {
    let (n_frames, height, width, channels) = video.dim();
    let mut out = Array4::<f32>::zeros((n_frames, height, width, channels));

    for t in 0..n_frames {
        for c in 0..channels {
            let plane = video.slice(s![t, .., .., c]).mapv(f32::from);
            let filtered = pyramid_blur(plane.view(), levels);
            out.slice_mut(s![t, .., .., c]).assign(&filtered);
        }
    }
    out
}

/// Reduces a single plane `levels` times and expands it back to its input shape.
pub fn pyramid_blur(plane: ArrayView2<f32>, levels: usize) -> Array2<f32> {
    let mut shapes = Vec::with_capacity(levels);
    let mut current = plane.to_owned();
    for _ in 0..levels {
        let (h, w) = current.dim();
        if h < 2 || w < 2 {
            break;
        }
        shapes.push((h, w));
        current = pyr_down(current.view());
    }
    for &shape in shapes.iter().rev() {
        current = pyr_up(current.view(), shape);
    }
    current
}

/// Blur then keep every second row and column; output is `ceil(h/2) x ceil(w/2)`.
pub fn pyr_down(plane: ArrayView2<f32>) -> Array2<f32> {
    let blurred = convolve_separable(plane, 1.0);
    let (h, w) = blurred.dim();
    Array2::from_shape_fn(((h + 1) / 2, (w + 1) / 2), |(i, j)| blurred[[2 * i, 2 * j]])
}

/// Zero-insertion upsampling to `shape`, then blur with the kernel scaled by 4.
pub fn pyr_up(plane: ArrayView2<f32>, shape: (usize, usize)) -> Array2<f32> {
    let mut upsampled = Array2::<f32>::zeros(shape);
    for ((i, j), &v) in plane.indexed_iter() {
        if 2 * i < shape.0 && 2 * j < shape.1 {
            upsampled[[2 * i, 2 * j]] = v;
        }
    }
    convolve_separable(upsampled.view(), 2.0)
}

fn convolve_separable(plane: ArrayView2<f32>, gain: f32) -> Array2<f32> {
    let (h, w) = plane.dim();
    let mut rows = Array2::<f32>::zeros((h, w));
    for i in 0..h {
        for j in 0..w {
            rows[[i, j]] = KERNEL
                .iter()
                .enumerate()
                .map(|(k, &coef)| coef * plane[[i, reflect101(j as isize + k as isize - 2, w)]])
                .sum::<f32>()
                * gain;
        }
    }
    let mut out = Array2::<f32>::zeros((h, w));
    for i in 0..h {
        for j in 0..w {
            out[[i, j]] = KERNEL
                .iter()
                .enumerate()
                .map(|(k, &coef)| coef * rows[[reflect101(i as isize + k as isize - 2, h), j]])
                .sum::<f32>()
                * gain;
        }
    }
    out
}

/// Border index mirrored without repeating the edge sample (`gfedcb|abcdefgh|gfedcba`).
fn reflect101(idx: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let period = 2 * (len - 1);
    let mut i = idx.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reflect_101_borders() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 1), 0);
    }

    #[test]
    fn uniform_frames_stay_uniform() {
        let video = Array4::<u8>::from_elem((2, 17, 12, 3), 120);
        let out = spatial_filter(video.view(), 3);
        assert_eq!(out.dim(), (2, 17, 12, 3));
        for &v in out.iter() {
            assert_abs_diff_eq!(v, 120.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn pyramid_smooths_a_checkerboard() {
        let plane = Array2::from_shape_fn((16, 16), |(i, j)| if (i + j) % 2 == 0 { 255.0 } else { 0.0 });
        let out = pyramid_blur(plane.view(), 2);
        assert_eq!(out.dim(), (16, 16));
        let mean = out.iter().sum::<f32>() / out.len() as f32;
        let spread = out.iter().fold(0.0f32, |acc, v| acc.max((v - mean).abs()));
        assert!(spread < 64.0, "spread {}", spread);
    }

    #[test]
    fn zero_levels_is_identity() {
        let plane = Array2::from_shape_fn((4, 5), |(i, j)| (i * 5 + j) as f32);
        assert_eq!(pyramid_blur(plane.view(), 0), plane);
    }

    #[test]
    fn down_then_up_shapes() {
        let plane = Array2::<f32>::ones((9, 6));
        let down = pyr_down(plane.view());
        assert_eq!(down.dim(), (5, 3));
        assert_eq!(pyr_up(down.view(), (9, 6)).dim(), (9, 6));
    }
}
