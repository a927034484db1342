//! Signal and video filters used ahead of pulse extraction.

pub mod bandpass;
pub mod spatial;
pub mod temporal;

pub use bandpass::BandPassFilter;
pub use spatial::spatial_filter;
pub use temporal::{temporal_filter, TemporalBand};
