//! JSON batch requests: `{ supervisor, record_date, configs, samples }`.

use crate::{
    batch::{Batch, BatchMetadata, SignalSite},
    error::{BatchError, HRVError, Stage},
    sample::Sample,
    windowing::{WindowingPolicy, DEFAULT_WINDOW_SIZE},
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Minimum number of subjects in one request.
pub const MIN_BATCH_SAMPLES: usize = 2;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub supervisor: String,
    #[serde(default)]
    pub record_date: Option<NaiveDate>,
    pub configs: EcgConfig,
    pub samples: Vec<SampleRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgConfig {
    #[serde(default)]
    pub device_name: Option<String>,
    /// Sampling rate in Hz.
    pub frequency: u32,
    #[serde(default)]
    pub signal: Option<SignalSite>,
    #[serde(default = "default_method")]
    pub window_slicing_method: String,
    #[serde(default = "default_window_size")]
    pub window_size: f64,
}

fn default_method() -> String {
    "time_related".to_string()
}

fn default_window_size() -> f64 {
    DEFAULT_WINDOW_SIZE
}

impl EcgConfig {
    pub fn policy(&self) -> Result<WindowingPolicy, HRVError> {
        WindowingPolicy::parse(&self.window_slicing_method, self.window_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    #[serde(default)]
    pub sample_id: Option<String>,
    pub subject_id: String,
    pub timestamp_idx: Vec<RawTimestamp>,
    pub ecg: Vec<f64>,
    #[serde(default)]
    pub label: Option<Vec<String>>,
}

/// A timestamp as sent on the wire: unix seconds, or a string holding either
/// unix seconds or a date/time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(f64),
    Text(String),
}

impl RawTimestamp {
    /// Seconds since the unix epoch. Date/times without an offset are read as UTC.
    pub fn to_seconds(&self) -> Result<f64, HRVError> {
        match self {
            RawTimestamp::Seconds(s) => Ok(*s),
            RawTimestamp::Text(text) => parse_timestamp(text),
        }
    }
}

fn parse_timestamp(text: &str) -> Result<f64, HRVError> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<f64>() {
        return Ok(seconds);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(epoch_seconds(&dt.with_timezone(&Utc)));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(epoch_seconds(&Utc.from_utc_datetime(&naive)));
        }
    }
    if let Some(naive) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(epoch_seconds(&Utc.from_utc_datetime(&naive)));
    }
    Err(HRVError::invalid_signal(format!(
        "unrecognised timestamp '{text}'"
    )))
}

fn epoch_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) / 1e9
}

/// Why a request could not become a [`Batch`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Batch-level problem: configs or sample count.
    #[error(transparent)]
    Batch(HRVError),
    /// A single sample failed validation.
    #[error(transparent)]
    Sample(BatchError),
}

impl RequestError {
    pub fn kind(&self) -> &HRVError {
        match self {
            RequestError::Batch(err) => err,
            RequestError::Sample(err) => err.kind(),
        }
    }
}

impl BatchRequest {
    /// Validate everything up front and build the batch together with its windowing policy.
    pub fn into_batch(self) -> Result<(Batch, WindowingPolicy), RequestError> {
        let policy = self.configs.policy().map_err(RequestError::Batch)?;
        if self.configs.frequency == 0 {
            return Err(RequestError::Batch(HRVError::configuration(
                "frequency must be positive",
            )));
        }
        if self.samples.len() < MIN_BATCH_SAMPLES {
            return Err(RequestError::Batch(HRVError::invalid_signal(format!(
                "a batch needs at least {MIN_BATCH_SAMPLES} samples, got {}",
                self.samples.len()
            ))));
        }

        let samples = self
            .samples
            .into_iter()
            .map(SampleRequest::into_sample)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RequestError::Sample)?;

        let metadata = BatchMetadata {
            supervisor: self.supervisor,
            record_date: self
                .record_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            device_name: self.configs.device_name,
            signal: self.configs.signal,
        };
        let batch = Batch::new(metadata, f64::from(self.configs.frequency), samples)
            .map_err(RequestError::Batch)?;
        Ok((batch, policy))
    }
}

impl SampleRequest {
    pub fn into_sample(self) -> Result<Sample, BatchError> {
        let sample_id = match &self.sample_id {
            Some(id) => Uuid::parse_str(id).map(|u| u.to_string()).map_err(|e| {
                HRVError::invalid_signal(format!("sample_id '{id}' is not a UUID: {e}"))
            }),
            None => Ok(Uuid::new_v4().to_string()),
        };
        let fail = |source: HRVError| BatchError {
            subject_id: self.subject_id.clone(),
            sample_id: self.sample_id.clone().unwrap_or_default(),
            window_id: None,
            stage: Stage::Validation,
            source,
        };
        let sample_id = sample_id.map_err(fail)?;
        let timestamps = self
            .timestamp_idx
            .iter()
            .map(RawTimestamp::to_seconds)
            .collect::<Result<Vec<_>, _>>()
            .map_err(fail)?;
        let labels = self.label.clone().filter(|l| !l.is_empty());
        Sample::new(
            self.subject_id.clone(),
            sample_id,
            timestamps,
            self.ecg.clone(),
            labels,
        )
        .map_err(fail)
    }
}

pub fn parse_batch_request(text: &str) -> Result<BatchRequest> {
    serde_json::from_str(text).context("parsing batch request JSON")
}

pub fn read_batch_request(path: &Path) -> Result<BatchRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batch request {}", path.display()))?;
    parse_batch_request(&contents).with_context(|| format!("in {}", path.display()))
}
