use crate::error::HRVError;
use serde::{Deserialize, Serialize};

/// Point events on a timeline (R-peak sample indices).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Check the detector contract: strictly increasing and inside `[0, sample_count)`.
    pub fn validate(&self, sample_count: usize) -> Result<(), HRVError> {
        if let Some(&last) = self.indices.last() {
            if last >= sample_count {
                return Err(HRVError::invalid_signal(format!(
                    "beat index {last} out of range for {sample_count} samples"
                )));
            }
        }
        if self.indices.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HRVError::invalid_signal(
                "beat indices are not strictly increasing",
            ));
        }
        Ok(())
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: f64) -> Self {
        let rr = events
            .indices
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / fs)
            .collect();
        Self { rr }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.rr.is_empty() {
            return 0.0;
        }
        self.rr.iter().sum::<f64>() / self.rr.len() as f64
    }

    /// Successive differences `rr[i + 1] - rr[i]`.
    pub fn successive_differences(&self) -> Vec<f64> {
        self.rr.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Beat times (seconds) relative to the first beat.
    pub fn beat_times(&self) -> Vec<f64> {
        let mut times = Vec::with_capacity(self.rr.len() + 1);
        let mut acc = 0.0;
        times.push(acc);
        for interval in &self.rr {
            acc += interval;
            times.push(acc);
        }
        times
    }
}
