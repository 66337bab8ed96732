use crate::error::HRVError;
use crate::filters::{bandpass, single_pole_highpass, zero_phase, zscore};
use serde::{Deserialize, Serialize};

/// Cleans a raw ECG trace before windowing. Output must have the input's length.
pub trait SignalConditioner {
    fn clean(&self, raw: &[f64], fs: f64) -> Result<Vec<f64>, HRVError>;
}

/// Parameters of the default conditioning chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    /// Skip conditioning entirely and hand the raw trace to the slicer.
    pub enabled: bool,
    /// High-pass cutoff for baseline wander removal (Hz).
    pub baseline_cutoff_hz: f64,
    /// Lower edge of the noise band-pass (Hz).
    pub lowcut_hz: f64,
    /// Upper edge of the noise band-pass (Hz).
    pub highcut_hz: f64,
    /// Rescale to zero mean and unit variance.
    pub normalize: bool,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline_cutoff_hz: 0.05,
            lowcut_hz: 0.5,
            highcut_hz: 45.0,
            normalize: true,
        }
    }
}

/// Baseline removal, band-pass denoising and normalisation, all zero-phase.
#[derive(Debug, Clone, Default)]
pub struct EcgConditioner {
    cfg: ConditioningConfig,
}

impl EcgConditioner {
    pub fn new(cfg: ConditioningConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ConditioningConfig {
        &self.cfg
    }
}

impl SignalConditioner for EcgConditioner {
    fn clean(&self, raw: &[f64], fs: f64) -> Result<Vec<f64>, HRVError> {
        check_input(raw, fs)?;
        if !self.cfg.enabled {
            return Ok(raw.to_vec());
        }
        let cfg = self.cfg;
        let detrended = zero_phase(raw, |x| {
            single_pole_highpass(x, fs, cfg.baseline_cutoff_hz)
        });
        let denoised = zero_phase(&detrended, |x| {
            bandpass(x, fs, cfg.lowcut_hz, cfg.highcut_hz)
        });
        Ok(if cfg.normalize {
            zscore(&denoised)
        } else {
            denoised
        })
    }
}

/// Hands the trace through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl SignalConditioner for Passthrough {
    fn clean(&self, raw: &[f64], fs: f64) -> Result<Vec<f64>, HRVError> {
        check_input(raw, fs)?;
        Ok(raw.to_vec())
    }
}

fn check_input(raw: &[f64], fs: f64) -> Result<(), HRVError> {
    if !fs.is_finite() || fs <= 0.0 {
        return Err(HRVError::configuration(format!(
            "sampling rate must be positive, got {fs}"
        )));
    }
    if raw.is_empty() {
        return Err(HRVError::invalid_signal("cannot condition an empty signal"));
    }
    Ok(())
}
