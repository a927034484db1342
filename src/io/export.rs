use std::path::Path;

use ndarray::ArrayView2;

use crate::error::{PipelineError, Result};

/// Writes a patch map row by row, one CSV row per patch row.
pub fn export_matrix<P: AsRef<Path>>(path: P, values: ArrayView2<f64>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    for row in values.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a boolean patch map as `0` / `1`.
pub fn export_mask<P: AsRef<Path>>(path: P, mask: ArrayView2<bool>) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    for row in mask.rows() {
        writer.write_record(row.iter().map(|&v| if v { "1" } else { "0" }))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes equally long columns under a header row.
pub fn export_columns<P: AsRef<Path>>(path: P, headers: &[&str], columns: &[&[f64]]) -> Result<()> {
    if headers.len() != columns.len() {
        return Err(PipelineError::ShapeMismatch(format!(
            "{} headers for {} columns",
            headers.len(),
            columns.len()
        )));
    }
    let rows = columns.first().map_or(0, |c| c.len());
    if columns.iter().any(|c| c.len() != rows) {
        return Err(PipelineError::ShapeMismatch(
            "CSV columns differ in length".to_string(),
        ));
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for r in 0..rows {
        writer.write_record(columns.iter().map(|c| c[r].to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
