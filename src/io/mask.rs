use std::fs;
use std::path::Path;

use log::debug;
use ndarray::{Array2, ArrayView2, ShapeBuilder};

use crate::error::{PipelineError, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Loads a boolean mask from a NumPy `.npy` file or from any image (non-zero
/// luma counts as inside).
pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<Array2<bool>> {
    let path = path.as_ref();
    let is_npy = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("npy"));
    let mask = if is_npy {
        let bytes = fs::read(path)?;
        read_npy(&bytes)?
    } else {
        let luma = image::open(path)?.to_luma8();
        let (w, h) = luma.dimensions();
        Array2::from_shape_fn((h as usize, w as usize), |(y, x)| luma.get_pixel(x as u32, y as u32)[0] > 0)
    };
    debug!("loaded {:?} mask from {}", mask.dim(), path.display());
    Ok(mask)
}

/// Persists a mask as a version 1.0 `.npy` array of `|b1`.
pub fn save_mask<P: AsRef<Path>>(path: P, mask: ArrayView2<bool>) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, write_npy(mask))?;
    Ok(())
}

pub fn check_mask_shape(mask: ArrayView2<bool>, height: usize, width: usize) -> Result<()> {
    if mask.dim() != (height, width) {
        return Err(PipelineError::ShapeMismatch(format!(
            "mask is {}x{} but frames are {}x{}",
            mask.dim().0,
            mask.dim().1,
            height,
            width
        )));
    }
    Ok(())
}

pub fn read_npy(bytes: &[u8]) -> Result<Array2<bool>> {
    let bad = |msg: &str| PipelineError::Mask(format!("invalid .npy data: {}", msg));

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(bad("missing magic string"));
    }
    let major = bytes[6];
    let (header_len, offset) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(bad("truncated header"));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => return Err(bad(&format!("unsupported format version {}", v))),
    };
    let data_start = offset + header_len;
    let header = bytes
        .get(offset..data_start)
        .ok_or_else(|| bad("truncated header"))?;
    let header = String::from_utf8_lossy(header);

    let descr = header_value(&header, "descr").ok_or_else(|| bad("no descr"))?;
    let descr = descr.trim_matches(|c| c == '\'' || c == '"');
    if !matches!(descr, "|b1" | "|u1" | "<u1" | "u1" | "b1" | "?") {
        return Err(bad(&format!("unsupported dtype {}", descr)));
    }
    let fortran = header_value(&header, "fortran_order")
        .map(|v| v.starts_with("True"))
        .unwrap_or(false);
    let shape = parse_shape(&header).ok_or_else(|| bad("malformed shape"))?;
    let (h, w) = match shape.as_slice() {
        [h, w] => (*h, *w),
        other => return Err(bad(&format!("expected a 2-D array, got shape {:?}", other))),
    };

    let data = bytes
        .get(data_start..data_start + h * w)
        .ok_or_else(|| bad("truncated data"))?;
    let values: Vec<bool> = data.iter().map(|&b| b != 0).collect();
    let mask = if fortran {
        Array2::from_shape_vec((h, w).f(), values)
    } else {
        Array2::from_shape_vec((h, w), values)
    };
    mask.map_err(|e| bad(&e.to_string()))
}

pub fn write_npy(mask: ArrayView2<bool>) -> Vec<u8> {
    let (h, w) = mask.dim();
    let mut header = format!(
        "{{'descr': '|b1', 'fortran_order': False, 'shape': ({}, {}), }}",
        h, w
    );
    // Pad so the data starts on a 64-byte boundary; the header ends in '\n'.
    let unpadded = NPY_MAGIC.len() + 4 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut out = Vec::with_capacity(NPY_MAGIC.len() + 4 + header.len() + h * w);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend(mask.iter().map(|&v| v as u8));
    out
}

/// Raw text following `'key':` up to the next top-level comma.
fn header_value<'h>(header: &'h str, key: &str) -> Option<&'h str> {
    let start = header.find(&format!("'{}'", key))?;
    let rest = &header[start + key.len() + 2..];
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let end = rest.find(',').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let start = header.find("'shape'")?;
    let rest = &header[start..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse().ok())
        .collect()
}
