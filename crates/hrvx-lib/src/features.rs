use crate::{
    detectors::BeatDetector,
    error::HRVError,
    metrics::hrv::{hrv_features, FrequencyConfig, HRVFeatures},
    signal::RRSeries,
};

const MIN_BEATS: usize = 2;

/// Turns one window of cleaned ECG into the fixed HRV feature set.
#[derive(Debug, Clone, Default)]
pub struct HRVFeatureComputer<D> {
    detector: D,
    frequency: FrequencyConfig,
}

impl<D: BeatDetector> HRVFeatureComputer<D> {
    pub fn new(detector: D, frequency: FrequencyConfig) -> Self {
        Self {
            detector,
            frequency,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn frequency_config(&self) -> &FrequencyConfig {
        &self.frequency
    }

    /// RR intervals (seconds) of the beats found in `ecg`.
    pub fn rr_intervals(&self, ecg: &[f64], fs: f64) -> Result<RRSeries, HRVError> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(HRVError::configuration(format!(
                "sampling rate must be positive, got {fs}"
            )));
        }
        let events = self.detector.detect(ecg, fs)?;
        events.validate(ecg.len())?;
        if events.len() < MIN_BEATS {
            return Err(HRVError::InsufficientBeats {
                metric: "detected beats",
                required: MIN_BEATS,
                found: events.len(),
            });
        }
        Ok(RRSeries::from_events(&events, fs))
    }

    pub fn compute(&self, ecg: &[f64], fs: f64) -> Result<HRVFeatures, HRVError> {
        let rr = self.rr_intervals(ecg, fs)?;
        hrv_features(&rr, &self.frequency)
    }
}
