//! Video decoding/encoding, mask persistence and CSV exports.

pub mod export;
pub mod mask;
pub mod video;

pub use mask::{check_mask_shape, load_mask, save_mask};
pub use video::{FFmpeg, Video};
