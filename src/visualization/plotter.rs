use std::path::Path;

use plotters::prelude::*;

use crate::error::{PipelineError, Result};

const PLOT_SIZE: (u32, u32) = (800, 480);

fn plot_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Plot(e.to_string())
}

/// Line chart of a power spectrum with a vertical marker at `peak` (Hz).
/// Axes carry no text so no font backend is needed.
pub fn plot_psd(path: &Path, freqs: &[f64], power: &[f64], peak: Option<f64>) -> Result<()> {
    let points: Vec<(f64, f64)> = freqs
        .iter()
        .copied()
        .zip(power.iter().copied())
        .filter(|(f, p)| f.is_finite() && p.is_finite())
        .collect();
    if points.len() < 2 {
        return Err(PipelineError::Plot(format!(
            "need at least two finite PSD points, got {}",
            points.len()
        )));
    }

    let x_max = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let x_min = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let y_max = points.iter().map(|p| p.1).fold(0.0, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.05 } else { 1.0 };

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max)
        .map_err(plot_err)?;

    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(x_min, 0.0), (x_max, 0.0)],
            &BLACK,
        )))
        .map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(points, &BLUE))
        .map_err(plot_err)?;
    if let Some(peak) = peak.filter(|f| (x_min..=x_max).contains(f)) {
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(peak, 0.0), (peak, y_max)],
                &RED,
            )))
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psd.png");
        let freqs: Vec<f64> = (0..46).map(|k| k as f64 / 3.0).collect();
        let power: Vec<f64> = freqs.iter().map(|f| (-(f - 2.0).powi(2)).exp()).collect();
        plot_psd(&path, &freqs, &power, Some(2.0)).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), PLOT_SIZE);
    }

    #[test]
    fn too_few_points_is_a_plot_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = plot_psd(&dir.path().join("psd.png"), &[1.0], &[2.0], None).unwrap_err();
        assert!(matches!(err, PipelineError::Plot(_)));
    }
}
