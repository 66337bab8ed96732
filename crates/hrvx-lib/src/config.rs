use crate::{
    conditioning::ConditioningConfig, detectors::DetectorConfig, metrics::hrv::FrequencyConfig,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables for the conditioning, detection and spectral stages.
///
/// Every section and field is optional in the TOML file; missing values take the
/// defaults below.
///
/// ```toml
/// [conditioning]
/// enabled = true
/// baseline_cutoff_hz = 0.05
///
/// [detector]
/// min_rr_s = 0.25
///
/// [frequency]
/// resample_hz = 4.0
/// lf_band = [0.04, 0.15]
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub conditioning: ConditioningConfig,
    pub detector: DetectorConfig,
    pub frequency: FrequencyConfig,
}

pub fn parse_pipeline_config(text: &str) -> Result<PipelineConfig> {
    toml::from_str(text).context("parsing pipeline config")
}

pub fn read_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline config {}", path.display()))?;
    parse_pipeline_config(&contents).with_context(|| format!("in {}", path.display()))
}
