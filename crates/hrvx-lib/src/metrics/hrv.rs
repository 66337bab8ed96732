use crate::error::HRVError;
use crate::metrics::spectral::{welch, DEFAULT_NPERSEG};
use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// Successive RR differences above this (seconds) count towards NN50.
pub const NN50_THRESHOLD_S: f64 = 0.05;
pub const LF_BAND: (f64, f64) = (0.04, 0.15);
pub const HF_BAND: (f64, f64) = (0.15, 0.4);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HRVTime {
    pub mean_rr: f64,
    /// Population standard deviation of the RR intervals.
    pub sdnn: f64,
    pub rmssd: f64,
    pub nn50: usize,
    /// `nn50` over the number of RR intervals.
    pub pnn50: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HRVFrequency {
    pub lf_band: f64,
    pub hf_band: f64,
    pub lf_hf_ratio: f64,
}

/// The fixed per-window feature set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HRVFeatures {
    pub mean_rr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub nn50: usize,
    pub pnn50: f64,
    pub lf_band: f64,
    pub hf_band: f64,
    pub lf_hf_ratio: f64,
}

impl HRVFeatures {
    pub fn from_parts(time: HRVTime, freq: HRVFrequency) -> Self {
        Self {
            mean_rr: time.mean_rr,
            sdnn: time.sdnn,
            rmssd: time.rmssd,
            nn50: time.nn50,
            pnn50: time.pnn50,
            lf_band: freq.lf_band,
            hf_band: freq.hf_band,
            lf_hf_ratio: freq.lf_hf_ratio,
        }
    }
}

/// How the RR sequence is turned into an evenly sampled signal for the PSD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Welch segment length, capped at the signal length.
    pub nperseg: usize,
    /// Interpolate the tachogram at this rate (Hz). When absent the intervals are used
    /// directly, sampled once per beat (`fs = 1 / mean_rr`).
    pub resample_hz: Option<f64>,
    pub lf_band: (f64, f64),
    pub hf_band: (f64, f64),
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            nperseg: DEFAULT_NPERSEG,
            resample_hz: None,
            lf_band: LF_BAND,
            hf_band: HF_BAND,
        }
    }
}

const MIN_INTERVALS: usize = 2;

fn check_intervals(rr: &RRSeries, metric: &'static str) -> Result<(), HRVError> {
    if rr.len() < MIN_INTERVALS {
        return Err(HRVError::InsufficientBeats {
            metric,
            required: MIN_INTERVALS,
            found: rr.len(),
        });
    }
    if rr.rr.iter().any(|x| !x.is_finite() || *x <= 0.0) {
        return Err(HRVError::invalid_signal(
            "RR intervals must be finite and positive",
        ));
    }
    Ok(())
}

pub fn hrv_time(rr: &RRSeries) -> Result<HRVTime, HRVError> {
    check_intervals(rr, "time-domain RR intervals")?;
    let n = rr.len() as f64;
    let mean_rr = rr.mean();
    let sdnn = (rr.rr.iter().map(|x| (x - mean_rr).powi(2)).sum::<f64>() / n).sqrt();
    let diffs = rr.successive_differences();
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
    let nn50 = diffs
        .iter()
        .filter(|d| d.abs() > NN50_THRESHOLD_S)
        .count();
    let pnn50 = nn50 as f64 / n;
    Ok(HRVTime {
        mean_rr,
        sdnn,
        rmssd,
        nn50,
        pnn50,
    })
}

pub fn hrv_frequency(rr: &RRSeries, cfg: &FrequencyConfig) -> Result<HRVFrequency, HRVError> {
    check_intervals(rr, "frequency-domain RR intervals")?;
    for (name, (lo, hi)) in [("lf_band", cfg.lf_band), ("hf_band", cfg.hf_band)] {
        if !(lo >= 0.0 && lo <= hi) {
            return Err(HRVError::configuration(format!(
                "{name} must satisfy 0 <= low <= high, got [{lo}, {hi}]"
            )));
        }
    }

    let psd = match cfg.resample_hz {
        None => welch(&rr.rr, 1.0 / rr.mean(), cfg.nperseg)?,
        Some(hz) => {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(HRVError::configuration(format!(
                    "resample_hz must be positive, got {hz}"
                )));
            }
            let signal = interpolate_rr(rr, hz);
            if signal.len() < 2 {
                return Err(HRVError::InsufficientBeats {
                    metric: "resampled RR tachogram points",
                    required: 2,
                    found: signal.len(),
                });
            }
            welch(&signal, hz, cfg.nperseg)?
        }
    };

    let lf_band = psd.band_power(cfg.lf_band);
    let hf_band = psd.band_power(cfg.hf_band);
    // Rounding residue of a flat rhythm counts as no power.
    if hf_band <= f64::EPSILON * psd.total_power() || has_no_spread(&rr.rr) {
        return Err(HRVError::DivisionByZero(
            "lf_hf_ratio is undefined because hf_band power is zero",
        ));
    }
    Ok(HRVFrequency {
        lf_band,
        hf_band,
        lf_hf_ratio: lf_band / hf_band,
    })
}

fn has_no_spread(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// All eight features of one RR sequence.
pub fn hrv_features(rr: &RRSeries, cfg: &FrequencyConfig) -> Result<HRVFeatures, HRVError> {
    let time = hrv_time(rr)?;
    let freq = hrv_frequency(rr, cfg)?;
    Ok(HRVFeatures::from_parts(time, freq))
}

/// Linear interpolation of the tachogram (interval value placed at the beat that closes
/// it) on an even grid spanning the second to the last beat.
fn interpolate_rr(rr: &RRSeries, fs: f64) -> Vec<f64> {
    let times = &rr.beat_times()[1..];
    let (first, last) = match (times.first(), times.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Vec::new(),
    };
    let n = ((last - first) * fs).floor() as usize + 1;
    let mut signal = Vec::with_capacity(n);
    let mut idx = 0;
    for i in 0..n {
        let t = first + i as f64 / fs;
        while idx + 2 < times.len() && times[idx + 1] < t {
            idx += 1;
        }
        let (t0, t1) = (times[idx], times[(idx + 1).min(times.len() - 1)]);
        let (v0, v1) = (rr.rr[idx], rr.rr[(idx + 1).min(rr.rr.len() - 1)]);
        let value = if t1 > t0 {
            v0 + (v1 - v0) * ((t - t0) / (t1 - t0)).clamp(0.0, 1.0)
        } else {
            v0
        };
        signal.push(value);
    }
    signal
}
