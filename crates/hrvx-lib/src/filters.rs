//! Small first-order filters shared by the conditioner and the beat detector.

use std::f64::consts::PI;

fn rc(cutoff: f64) -> f64 {
    1.0 / (2.0 * PI * cutoff.max(0.01))
}

pub fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = rc(cutoff);
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = first;
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

pub fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = rc(cutoff);
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = first;
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// High-pass at `low` then low-pass at `high`; either stage is skipped when its cutoff is
/// non-positive or (for the low-pass) at or above Nyquist.
pub fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

/// Run `filter` forward, then over the reversed output, cancelling the phase shift.
pub fn zero_phase<F>(data: &[f64], filter: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut forward = filter(data);
    forward.reverse();
    let mut out = filter(&forward);
    out.reverse();
    out
}

/// Zero mean, unit variance. A constant input maps to all zeros.
pub fn zscore(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let sd = (data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
    if sd == 0.0 {
        return vec![0.0; data.len()];
    }
    data.iter().map(|x| (x - mean) / sd).collect()
}

pub fn derivative(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

pub fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Trailing moving average over `win` samples.
pub fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win as f64;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highpass_removes_constant_offset() {
        let data = vec![3.0; 500];
        let out = single_pole_highpass(&data, 250.0, 0.5);
        assert!(out.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn lowpass_passes_constant() {
        let data = vec![2.0; 100];
        let out = single_pole_lowpass(&data, 250.0, 10.0);
        assert!(out.iter().all(|v| (v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn zero_phase_keeps_length() {
        let data: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
        let out = zero_phase(&data, |x| single_pole_lowpass(x, 100.0, 5.0));
        assert_eq!(out.len(), data.len());
    }

    #[test]
    fn zscore_normalises() {
        let out = zscore(&[1.0, 2.0, 3.0, 4.0]);
        let mean = out.iter().sum::<f64>() / 4.0;
        let var = out.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
        assert_eq!(zscore(&[5.0, 5.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn moving_average_smooths() {
        let out = moving_average(&[1.0, 1.0, 1.0, 1.0], 2);
        assert_eq!(out, vec![0.5, 1.0, 1.0, 1.0]);
    }
}
