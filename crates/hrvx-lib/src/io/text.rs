use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Parse a series of values separated by newlines, commas or whitespace.
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_series<T>(text: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        for token in trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let val = token
                .parse()
                .with_context(|| format!("line {} is not a valid {what}: {token}", idx + 1))?;
            out.push(val);
        }
    }
    if out.is_empty() {
        anyhow::bail!("no {what} values found");
    }
    Ok(out)
}

/// ECG amplitudes, one per sample.
pub fn parse_ecg_series(text: &str) -> Result<Vec<f64>> {
    parse_series(text, "ecg sample")
}

/// RR intervals in seconds; every interval must be positive.
pub fn parse_rr_series(text: &str) -> Result<Vec<f64>> {
    let rr: Vec<f64> = parse_series(text, "RR interval")?;
    if let Some(bad) = rr.iter().find(|v| !v.is_finite() || **v <= 0.0) {
        anyhow::bail!("RR intervals must be positive seconds, found {bad}");
    }
    Ok(rr)
}

/// Read a whole input, from stdin when `path` is `None` or `-`.
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}
