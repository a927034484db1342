//! Remote photoplethysmography from skin video: a global heart-rate estimate,
//! a per-patch pulse signal map, SNR-based patch validity and a pulse transit
//! time map rendered as a colour-coded overlay.

pub mod config;
pub mod error;
pub mod io;
pub mod local;
pub mod processing;
pub mod selection;
pub mod synth;
pub mod utils;
pub mod visualization;

pub use config::{load_config, save_config, Config, ExtractionMethod, RenderMode};
pub use error::{PatchIndex, PipelineError, Result, Stage};
pub use io::Video;
pub use processing::{Pipeline, PipelineResult};
pub use selection::CenterPoint;
