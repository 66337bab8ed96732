use crate::error::HRVError;
use serde::Serialize;

/// Label assigned to every sample when a recording carries no labels.
pub const DEFAULT_LABEL: &str = "undefined";

/// Minimum number of samples in a recording.
pub const MIN_SAMPLES: usize = 2;

/// One subject's recording: parallel timestamp, ECG and label sequences.
///
/// Construction validates the invariants, so a `Sample` in hand always has equal-length
/// sequences of at least [`MIN_SAMPLES`] entries and non-decreasing, finite timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    subject_id: String,
    sample_id: String,
    timestamps: Vec<f64>,
    ecg: Vec<f64>,
    labels: Vec<String>,
}

impl Sample {
    pub fn new(
        subject_id: impl Into<String>,
        sample_id: impl Into<String>,
        timestamps: Vec<f64>,
        ecg: Vec<f64>,
        labels: Option<Vec<String>>,
    ) -> Result<Self, HRVError> {
        let subject_id = subject_id.into();
        if subject_id.trim().is_empty() {
            return Err(HRVError::invalid_signal("subject_id must not be empty"));
        }
        if timestamps.len() != ecg.len() {
            return Err(HRVError::invalid_signal(format!(
                "timestamp and ecg lengths differ ({} vs {})",
                timestamps.len(),
                ecg.len()
            )));
        }
        let labels =
            labels.unwrap_or_else(|| vec![DEFAULT_LABEL.to_string(); timestamps.len()]);
        if labels.len() != timestamps.len() {
            return Err(HRVError::invalid_signal(format!(
                "label length {} differs from timestamp length {}",
                labels.len(),
                timestamps.len()
            )));
        }
        validate_timestamps(&timestamps)?;
        if ecg.iter().any(|v| !v.is_finite()) {
            return Err(HRVError::invalid_signal("ecg contains non-finite values"));
        }
        Ok(Self {
            subject_id,
            sample_id: sample_id.into(),
            timestamps,
            ecg,
            labels,
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn ecg(&self) -> &[f64] {
        &self.ecg
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Reject series that are too short, non-finite or go backwards in time.
pub fn validate_timestamps(timestamps: &[f64]) -> Result<(), HRVError> {
    if timestamps.len() < MIN_SAMPLES {
        return Err(HRVError::invalid_signal(format!(
            "series needs at least {MIN_SAMPLES} samples, got {}",
            timestamps.len()
        )));
    }
    if timestamps.iter().any(|t| !t.is_finite()) {
        return Err(HRVError::invalid_signal("timestamps contain non-finite values"));
    }
    if let Some(pos) = timestamps.windows(2).position(|w| w[1] < w[0]) {
        return Err(HRVError::invalid_signal(format!(
            "timestamps decrease at index {}",
            pos + 1
        )));
    }
    Ok(())
}
