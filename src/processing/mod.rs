pub mod extractors;
pub mod filters;
pub mod heart_rate;
pub mod patch_grid;
pub mod pipeline;
pub mod pool;
pub mod reference;
pub mod signal_map;
pub mod spectral;
pub mod time_delay;
pub mod validity;

pub use pipeline::{Pipeline, PipelineResult};
