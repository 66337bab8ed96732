use crate::{
    error::HRVError,
    filters::{bandpass, derivative, moving_average, square},
    signal::Events,
};
use serde::{Deserialize, Serialize};

/// Finds R-peaks in a cleaned ECG trace.
///
/// Implementations return strictly increasing sample indices inside `[0, ecg.len())`.
pub trait BeatDetector {
    fn detect(&self, ecg: &[f64], fs: f64) -> Result<Events, HRVError>;
}

/// Configurable parameters for the Pan–Tompkins style detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.120,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Adaptive-threshold detector on the integrated squared-slope envelope.
#[derive(Debug, Clone, Default)]
pub struct PanTompkinsDetector {
    cfg: DetectorConfig,
}

impl PanTompkinsDetector {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }
}

impl BeatDetector for PanTompkinsDetector {
    fn detect(&self, ecg: &[f64], fs: f64) -> Result<Events, HRVError> {
        if !fs.is_finite() || fs <= 0.0 {
            return Err(HRVError::configuration(format!(
                "sampling rate must be positive, got {fs}"
            )));
        }
        Ok(detect_r_peaks(ecg, fs, &self.cfg))
    }
}

/// Detect R-peaks, falling back to a naive local-maximum picker when the adaptive
/// threshold yields fewer than two beats.
pub fn detect_r_peaks(data: &[f64], fs: f64, cfg: &DetectorConfig) -> Events {
    if data.is_empty() {
        return Events::from_indices(Vec::new());
    }

    let (bandpassed, integrated) = pan_tompkins_envelope(data, fs, cfg);
    let peaks = pick_peaks(&bandpassed, &integrated, fs, cfg);

    if peaks.len() < 2 {
        return Events::from_indices(fallback_peak_picker(data, fs, cfg));
    }

    Events::from_indices(peaks)
}

fn pan_tompkins_envelope(data: &[f64], fs: f64, cfg: &DetectorConfig) -> (Vec<f64>, Vec<f64>) {
    let fs = fs.max(1.0);
    let bandpassed = bandpass(data, fs, cfg.lowcut_hz, cfg.highcut_hz);
    let squared = square(&derivative(&bandpassed));
    let win = ((cfg.integration_window_s * fs).round() as usize).max(1);
    let integrated = moving_average(&squared, win);
    (bandpassed, integrated)
}

fn pick_peaks(bandpassed: &[f64], envelope: &[f64], fs: f64, cfg: &DetectorConfig) -> Vec<usize> {
    if bandpassed.is_empty() || envelope.is_empty() {
        return Vec::new();
    }

    let refractory = (cfg.min_rr_s * fs).round().max(1.0) as usize;
    let search = (cfg.search_back_s * fs).round().max(1.0) as usize;

    // Seed both levels from the first second of envelope.
    let init = envelope.len().min((fs as usize).max(1));
    let avg = envelope[..init].iter().sum::<f64>() / init as f64;
    let mut signal_level = avg;
    let mut noise_level = avg * 0.5;
    let threshold_of =
        |signal: f64, noise: f64| noise + cfg.threshold_scale * (signal - noise).max(0.0);
    let mut threshold = threshold_of(signal_level, noise_level);
    let mut last_peak_sample = 0usize;
    let mut peaks = Vec::new();

    for (i, &sample) in envelope.iter().enumerate() {
        let refractory_ok = peaks.is_empty() || i - last_peak_sample >= refractory;
        if sample > 0.0 && sample >= threshold && refractory_ok {
            let start = i.saturating_sub(search);
            let end = i.min(bandpassed.len() - 1);
            let idx = (start..=end)
                .max_by(|&a, &b| bandpassed[a].total_cmp(&bandpassed[b]))
                .unwrap_or(i);
            peaks.push(idx);
            last_peak_sample = i;
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }
        threshold = threshold_of(signal_level, noise_level);
    }

    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

fn fallback_peak_picker(data: &[f64], fs: f64, cfg: &DetectorConfig) -> Vec<usize> {
    if data.len() < 3 {
        return Vec::new();
    }
    let min_gap = (cfg.min_rr_s * fs).max(1.0) as usize;
    let ma = moving_average(data, ((0.150 * fs) as usize).max(1));
    let detrended = |i: usize| data[i] - ma[i];

    let mut peaks = Vec::new();
    let mut last_idx = 0usize;
    for i in 1..data.len() - 1 {
        let y = detrended(i);
        let is_peak = y > 0.0 && y > detrended(i - 1) && y > detrended(i + 1);
        if is_peak && (peaks.is_empty() || i - last_idx >= min_gap) {
            peaks.push(i);
            last_idx = i;
        }
    }
    peaks
}
