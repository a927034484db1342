use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use ndarray::ArrayView4;

use super::{mean, PulseExtractor, RgbTrace};

/// Projection of the mean-normalised RGB traces onto their dominant principal
/// axis. The axis is oriented so that its green loading is non-negative.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pca;

impl PulseExtractor for Pca {
    fn name(&self) -> &'static str {
        "PCA"
    }

    fn extract(&self, patch: ArrayView4<f32>) -> Vec<f64> {
        let trace = RgbTrace::from_patch(patch);
        let n = trace.len();
        if n == 0 {
            return Vec::new();
        }
        let cn = trace.normalized(0..n);
        let channels = [&cn.r, &cn.g, &cn.b];
        let means = channels.map(|c| mean(c));

        let centered: Vec<Vector3<f64>> = (0..n)
            .map(|t| Vector3::new(cn.r[t] - means[0], cn.g[t] - means[1], cn.b[t] - means[2]))
            .collect();
        let cov = centered
            .iter()
            .fold(Matrix3::<f64>::zeros(), |acc, v| acc + v * v.transpose())
            / n as f64;

        let axis = dominant_axis(cov);
        centered.iter().map(|v| v.dot(&axis)).collect()
    }
}

/// Unit eigenvector of the largest eigenvalue of a symmetric covariance,
/// signed so that its second (green) component is non-negative.
pub fn dominant_axis(cov: Matrix3<f64>) -> Vector3<f64> {
    let eig = SymmetricEigen::new(cov);
    let axis = eig.eigenvectors.column(eig.eigenvalues.imax()).into_owned();
    if axis[1] < 0.0 {
        -axis
    } else {
        axis
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{correlation_with_sine, pulsing_patch};
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn axis_of_diagonal_covariance() {
        let v = dominant_axis(Matrix3::new(1.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 2.0));
        assert_abs_diff_eq!(v[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn axis_of_coupled_covariance_points_towards_green() {
        // Eigenvalues 3, 1, 1 with the dominant axis along (1, 1, 1) / sqrt(3).
        let (d, o) = (5.0 / 3.0, 2.0 / 3.0);
        let v = dominant_axis(Matrix3::new(d, o, o, o, d, o, o, o, d));
        let expected = 1.0 / 3.0f64.sqrt();
        for x in v.iter() {
            assert_abs_diff_eq!(*x, expected, epsilon = 1e-9);
        }

        // Negative coupling to green still yields a non-negative green loading.
        let v = dominant_axis(Matrix3::new(4.0, -2.0, 0.0, -2.0, 4.0, 0.0, 0.0, 0.0, 1.0));
        assert!(v[1] > 0.0);
        assert_abs_diff_eq!(v[0], -v[1], epsilon = 1e-9);
    }

    #[test]
    fn follows_green_dominated_pulse() {
        let patch = pulsing_patch(90, 30.0, 2.0, [160.0, 110.0, 90.0], [2.0, 6.0, 1.0]);
        let pulse = Pca.extract(patch.view());
        let r = correlation_with_sine(&pulse, 30.0, 2.0);
        // Positive green loading keeps the waveform in phase with the colour change.
        assert!(r > 0.99, "correlation {}", r);
    }
}
