use std::fmt;

use thiserror::Error;

/// Spatial patch coordinate `(row, col)` in the patch grid.
pub type PatchIndex = (usize, usize);

/// Pipeline stages, in execution order. Used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PatchGrid,
    HeartRate,
    SignalMap,
    Validity,
    Reference,
    TimeDelay,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PatchGrid => "patch grid",
            Stage::HeartRate => "heart rate estimation",
            Stage::SignalMap => "signal map extraction",
            Stage::Validity => "validity scoring",
            Stage::Reference => "reference selection",
            Stage::TimeDelay => "time delay estimation",
            Stage::Render => "heatmap rendering",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("PSD contains no frequency bins (signal length {len})")]
    EmptyFrequencyRange { len: usize },

    #[error(
        "no segmentation-valid patch within {radius} patch(es) of center patch ({row}, {col})"
    )]
    NoValidReferenceRegion { row: usize, col: usize, radius: usize },

    #[error("{stage} worker failed on patch ({}, {}): {reason}", patch.0, patch.1)]
    WorkerFailed {
        stage: Stage,
        patch: PatchIndex,
        reason: String,
    },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config file error: {0}")]
    Config(String),

    #[error("video error: {0}")]
    Video(String),

    #[error("mask error: {0}")]
    Mask(String),

    #[error("selection error: {0}")]
    Selection(String),

    #[error("plot error: {0}")]
    Plot(String),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("could not build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    /// Attributes the error to a pipeline stage. Errors already attributed keep their stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            PipelineError::Stage { .. } => self,
            other => PipelineError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage the error was raised in, if known.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            PipelineError::WorkerFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
