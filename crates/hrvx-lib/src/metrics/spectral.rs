use crate::error::HRVError;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const DEFAULT_NPERSEG: usize = 256;

/// One-sided power spectral density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub power: Vec<f64>,
}

impl Psd {
    /// Sum of the power bins whose frequency lies in `[lo, hi]`.
    pub fn band_power(&self, (lo, hi): (f64, f64)) -> f64 {
        self.freqs
            .iter()
            .zip(&self.power)
            .filter(|(f, _)| **f >= lo && **f <= hi)
            .fold(0.0, |acc, (_, p)| acc + p)
    }

    pub fn total_power(&self) -> f64 {
        self.power.iter().fold(0.0, |acc, p| acc + p)
    }
}

/// Welch PSD: periodic Hann segments of `nperseg` samples (capped at the signal length),
/// 50% overlap, per-segment mean removal, density scaling, mean across segments.
pub fn welch(signal: &[f64], fs: f64, nperseg: usize) -> Result<Psd, HRVError> {
    if !fs.is_finite() || fs <= 0.0 {
        return Err(HRVError::configuration(format!(
            "spectral sampling rate must be positive, got {fs}"
        )));
    }
    if nperseg < 2 {
        return Err(HRVError::configuration(format!(
            "nperseg must be at least 2, got {nperseg}"
        )));
    }
    let n = signal.len();
    if n < 2 {
        return Err(HRVError::invalid_signal(format!(
            "welch needs at least 2 points, got {n}"
        )));
    }

    let window_len = nperseg.min(n);
    let step = window_len - window_len / 2;
    let window = hann(window_len);
    let scale = 1.0 / (fs * window.iter().map(|w| w * w).sum::<f64>());

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window_len);
    let mut spectrum = r2c.make_output_vec();
    let bins = spectrum.len();
    let freqs: Vec<f64> = (0..bins)
        .map(|k| k as f64 * fs / window_len as f64)
        .collect();
    let mut power = vec![0.0; bins];

    let mut segments = 0usize;
    let mut pos = 0;
    while pos + window_len <= n {
        let segment = &signal[pos..pos + window_len];
        pos += step;
        segments += 1;
        // A flat segment contributes exactly zero; its mean may not round-trip.
        if segment.iter().all(|x| *x == segment[0]) {
            continue;
        }
        let mean = segment.iter().sum::<f64>() / window_len as f64;
        let mut frame: Vec<f64> = segment
            .iter()
            .zip(&window)
            .map(|(x, w)| (x - mean) * w)
            .collect();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|e| HRVError::invalid_signal(format!("fft failed: {e}")))?;
        for (k, val) in spectrum.iter().enumerate() {
            let one_sided = k == 0 || (window_len % 2 == 0 && k == window_len / 2);
            let factor = if one_sided { 1.0 } else { 2.0 };
            power[k] += factor * val.norm_sqr() * scale;
        }
    }
    for p in power.iter_mut() {
        *p /= segments as f64;
    }
    Ok(Psd { freqs, power })
}

/// Periodic Hann window.
fn hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, rel_tol: f64) {
        let tol = expected.abs().max(1e-12) * rel_tol;
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn single_segment_matches_hand_computation() {
        let rr = [0.8, 0.82, 0.79, 0.81];
        let fs = 1.0 / 0.805;
        let psd = welch(&rr, fs, DEFAULT_NPERSEG).unwrap();
        assert_eq!(psd.freqs.len(), 3);
        assert_close(psd.freqs[1], fs / 4.0, 1e-12);
        let scale = 0.805 / 1.5;
        assert_close(psd.power[0], 0.000025 * scale, 1e-6);
        assert_close(psd.power[1], 2.0 * 0.00025 * scale, 1e-6);
        assert_close(psd.power[2], 0.000625 * scale, 1e-6);
    }

    #[test]
    fn sine_peak_lands_in_its_bin() {
        let fs = 4.0;
        let signal: Vec<f64> = (0..1024)
            .map(|i| (2.0 * PI * 0.25 * i as f64 / fs).sin())
            .collect();
        let psd = welch(&signal, fs, DEFAULT_NPERSEG).unwrap();
        let (peak, _) = psd
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        assert_close(psd.freqs[peak], 0.25, 1e-12);
        assert_eq!(psd.freqs.len(), DEFAULT_NPERSEG / 2 + 1);
    }

    #[test]
    fn constant_signal_has_no_power() {
        let psd = welch(&[0.75; 16], 1.25, DEFAULT_NPERSEG).unwrap();
        assert!(psd.power.iter().all(|p| *p == 0.0));
    }

    #[test]
    fn flat_segment_of_inexact_value_has_no_power() {
        for value in [0.8, 0.81, 0.7, 0.9, 0.6] {
            let psd = welch(&[value; 40], 1.0 / value, DEFAULT_NPERSEG).unwrap();
            assert!(psd.power.iter().all(|p| *p == 0.0), "{value}");
        }
    }

    #[test]
    fn empty_band_sums_to_positive_zero() {
        let psd = Psd {
            freqs: vec![0.0, 0.3],
            power: vec![1.0, 2.0],
        };
        let lf = psd.band_power((0.04, 0.15));
        assert_eq!(lf, 0.0);
        assert!(lf.is_sign_positive());
        assert_eq!(psd.total_power(), 3.0);
    }

    #[test]
    fn band_power_is_inclusive() {
        let psd = Psd {
            freqs: vec![0.04, 0.1, 0.15, 0.4, 0.5],
            power: vec![1.0, 2.0, 4.0, 8.0, 16.0],
        };
        assert_eq!(psd.band_power((0.04, 0.15)), 7.0);
        assert_eq!(psd.band_power((0.15, 0.4)), 12.0);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(
            welch(&[1.0, 2.0], 0.0, 256),
            Err(HRVError::Configuration(_))
        ));
        assert!(matches!(
            welch(&[1.0, 2.0], 1.0, 1),
            Err(HRVError::Configuration(_))
        ));
        assert!(matches!(
            welch(&[1.0], 1.0, 256),
            Err(HRVError::InvalidSignal(_))
        ));
    }
}
