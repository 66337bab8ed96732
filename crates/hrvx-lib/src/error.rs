use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failures raised by the windowing and feature-extraction core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HRVError {
    /// Malformed or degenerate input series.
    #[error("invalid signal: {0}")]
    InvalidSignal(String),
    /// Unknown windowing policy, non-positive window size or sampling rate.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("insufficient beats: {metric} needs at least {required}, found {found}")]
    InsufficientBeats {
        metric: &'static str,
        required: usize,
        found: usize,
    },
    #[error("division by zero: {0}")]
    DivisionByZero(&'static str),
}

impl HRVError {
    pub fn invalid_signal(reason: impl Into<String>) -> Self {
        Self::InvalidSignal(reason.into())
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

/// Pipeline stage a subject was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Conditioning,
    Windowing,
    Features,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validation => "validation",
            Stage::Conditioning => "conditioning",
            Stage::Windowing => "windowing",
            Stage::Features => "feature extraction",
        };
        f.write_str(name)
    }
}

/// An [`HRVError`] tagged with the subject, sample and window it came from.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "{stage} failed for subject '{subject_id}' (sample {sample_id}){}: {source}",
    window_suffix(.window_id)
)]
pub struct BatchError {
    pub subject_id: String,
    pub sample_id: String,
    pub window_id: Option<usize>,
    pub stage: Stage,
    #[source]
    pub source: HRVError,
}

impl BatchError {
    pub fn kind(&self) -> &HRVError {
        &self.source
    }
}

fn window_suffix(window_id: &Option<usize>) -> String {
    match window_id {
        Some(id) => format!(", window {id}"),
        None => String::new(),
    }
}
