//! Heart-rate-variability features from multi-subject ECG batches.
//!
//! A [`Batch`] of subject recordings is conditioned, cut into windows by a
//! [`WindowingPolicy`], and every window is reduced to eight HRV features
//! (time domain and Welch-PSD frequency bands). [`BatchPipeline`] drives the
//! whole flow and returns a flat [`FeatureTable`].

pub mod batch;
pub mod conditioning;
pub mod config;
pub mod detectors;
pub mod error;
pub mod features;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod sample;
pub mod signal;
pub mod windowing;

pub use batch::{Batch, BatchMetadata, BatchPipeline, FeatureTable, HRVFeatureRecord, SubjectOutcome};
pub use conditioning::{ConditioningConfig, EcgConditioner, Passthrough, SignalConditioner};
pub use config::PipelineConfig;
pub use detectors::*;
pub use error::{BatchError, HRVError, Stage};
pub use features::HRVFeatureComputer;
pub use metrics::*;
pub use sample::Sample;
pub use signal::*;
pub use windowing::{slice_windows, Window, WindowingMethod, WindowingPolicy};

/// Pipeline with the default conditioner and Pan–Tompkins detector built from `cfg`.
pub fn default_pipeline(cfg: &PipelineConfig) -> BatchPipeline<EcgConditioner, PanTompkinsDetector> {
    BatchPipeline::new(
        EcgConditioner::new(cfg.conditioning),
        HRVFeatureComputer::new(PanTompkinsDetector::new(cfg.detector), cfg.frequency),
    )
}
