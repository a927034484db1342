pub mod process_video;

pub use process_video::{process_video, run, ProcessedVideo, RunOptions, RunSummary};
