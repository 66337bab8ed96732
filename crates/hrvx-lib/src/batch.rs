//! Subjects → windows → features, assembled into one [`FeatureTable`].

use crate::{
    conditioning::SignalConditioner,
    detectors::BeatDetector,
    error::{BatchError, HRVError, Stage},
    features::HRVFeatureComputer,
    metrics::hrv::HRVFeatures,
    sample::Sample,
    windowing::{slice_windows, Window, WindowingPolicy},
};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Body placement of the recording electrode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSite {
    Chest,
    #[serde(alias = "wrist")]
    Wrest,
}

/// Descriptive fields of a batch; they do not influence the computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchMetadata {
    pub supervisor: String,
    pub record_date: NaiveDate,
    pub device_name: Option<String>,
    pub signal: Option<SignalSite>,
}

/// Recordings of several subjects sharing one sampling rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub metadata: BatchMetadata,
    sampling_rate: f64,
    samples: Vec<Sample>,
}

impl Batch {
    pub fn new(
        metadata: BatchMetadata,
        sampling_rate: f64,
        samples: Vec<Sample>,
    ) -> Result<Self, HRVError> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(HRVError::configuration(format!(
                "frequency must be positive, got {sampling_rate}"
            )));
        }
        Ok(Self {
            metadata,
            sampling_rate,
            samples,
        })
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

/// One output row: identifiers, window bounds and the eight HRV features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HRVFeatureRecord {
    pub sample_id: String,
    pub subject_id: String,
    pub window_id: usize,
    pub window_start: f64,
    pub window_end: f64,
    pub mean_rr: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub nn50: usize,
    pub pnn50: f64,
    pub lf_band: f64,
    pub hf_band: f64,
    pub lf_hf_ratio: f64,
}

impl HRVFeatureRecord {
    /// Field names in serialisation order; also the CSV header.
    pub const COLUMNS: [&'static str; 13] = [
        "sample_id",
        "subject_id",
        "window_id",
        "window_start",
        "window_end",
        "mean_rr",
        "sdnn",
        "rmssd",
        "nn50",
        "pnn50",
        "lf_band",
        "hf_band",
        "lf_hf_ratio",
    ];

    pub fn new(sample: &Sample, window: &Window, features: HRVFeatures) -> Self {
        Self {
            sample_id: sample.sample_id().to_string(),
            subject_id: sample.subject_id().to_string(),
            window_id: window.id,
            window_start: window.start,
            window_end: window.end,
            mean_rr: features.mean_rr,
            sdnn: features.sdnn,
            rmssd: features.rmssd,
            nn50: features.nn50,
            pnn50: features.pnn50,
            lf_band: features.lf_band,
            hf_band: features.hf_band,
            lf_hf_ratio: features.lf_hf_ratio,
        }
    }
}

/// Records of all subjects, in subject-then-window order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureTable {
    records: Vec<HRVFeatureRecord>,
}

impl FeatureTable {
    /// Concatenate per-subject record lists, keeping their order.
    pub fn concat<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Vec<HRVFeatureRecord>>,
    {
        Self {
            records: parts.into_iter().flatten().collect(),
        }
    }

    pub fn records(&self) -> &[HRVFeatureRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<HRVFeatureRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HRVFeatureRecord> {
        self.records.iter()
    }
}

impl FromIterator<HRVFeatureRecord> for FeatureTable {
    fn from_iter<T: IntoIterator<Item = HRVFeatureRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Result of one subject when subjects are processed in isolation.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectOutcome {
    pub subject_id: String,
    pub sample_id: String,
    pub result: Result<Vec<HRVFeatureRecord>, BatchError>,
}

/// Split isolated outcomes into the records of successful subjects and the failures.
pub fn partition_outcomes(outcomes: Vec<SubjectOutcome>) -> (FeatureTable, Vec<BatchError>) {
    let mut parts = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(records) => parts.push(records),
            Err(err) => failures.push(err),
        }
    }
    (FeatureTable::concat(parts), failures)
}

/// Conditions, slices and measures every sample of a batch.
#[derive(Debug, Clone)]
pub struct BatchPipeline<C, D> {
    conditioner: C,
    computer: HRVFeatureComputer<D>,
}

impl<C: SignalConditioner, D: BeatDetector> BatchPipeline<C, D> {
    pub fn new(conditioner: C, computer: HRVFeatureComputer<D>) -> Self {
        Self {
            conditioner,
            computer,
        }
    }

    pub fn computer(&self) -> &HRVFeatureComputer<D> {
        &self.computer
    }

    /// Process all samples in order; the first failure aborts the batch.
    pub fn run(&self, batch: &Batch, policy: &WindowingPolicy) -> Result<FeatureTable, BatchError> {
        info!(
            "processing {} sample(s) at {} Hz with {} windows of {} s",
            batch.samples().len(),
            batch.sampling_rate(),
            policy.method(),
            policy.window_size()
        );
        let parts = batch
            .samples()
            .iter()
            .map(|sample| self.process_sample(sample, batch.sampling_rate(), policy))
            .collect::<Result<Vec<_>, _>>()?;
        let table = FeatureTable::concat(parts);
        info!("feature table holds {} record(s)", table.len());
        Ok(table)
    }

    /// Process every sample independently, reporting one outcome per sample.
    pub fn run_per_subject(&self, batch: &Batch, policy: &WindowingPolicy) -> Vec<SubjectOutcome> {
        batch
            .samples()
            .iter()
            .map(|sample| {
                let result = self.process_sample(sample, batch.sampling_rate(), policy);
                if let Err(err) = &result {
                    warn!("{err}");
                }
                SubjectOutcome {
                    subject_id: sample.subject_id().to_string(),
                    sample_id: sample.sample_id().to_string(),
                    result,
                }
            })
            .collect()
    }

    /// Condition one sample, slice it and compute one record per window.
    pub fn process_sample(
        &self,
        sample: &Sample,
        fs: f64,
        policy: &WindowingPolicy,
    ) -> Result<Vec<HRVFeatureRecord>, BatchError> {
        let fail = |stage: Stage, window_id: Option<usize>, source: HRVError| BatchError {
            subject_id: sample.subject_id().to_string(),
            sample_id: sample.sample_id().to_string(),
            window_id,
            stage,
            source,
        };

        let cleaned = self
            .conditioner
            .clean(sample.ecg(), fs)
            .map_err(|e| fail(Stage::Conditioning, None, e))?;
        if cleaned.len() != sample.len() {
            return Err(fail(
                Stage::Conditioning,
                None,
                HRVError::invalid_signal(format!(
                    "conditioner returned {} samples for {} inputs",
                    cleaned.len(),
                    sample.len()
                )),
            ));
        }

        let windows = slice_windows(sample.timestamps(), sample.labels(), policy)
            .map_err(|e| fail(Stage::Windowing, None, e))?;
        if windows.is_empty() {
            warn!(
                "subject '{}' produced no windows under {}",
                sample.subject_id(),
                policy.method()
            );
        }
        debug!(
            "subject '{}': {} window(s)",
            sample.subject_id(),
            windows.len()
        );

        windows
            .iter()
            .map(|window| {
                let features = self
                    .computer
                    .compute(window.select(&cleaned), fs)
                    .map_err(|e| fail(Stage::Features, Some(window.id), e))?;
                debug!(
                    "subject '{}' window {} [{}, {}]: mean_rr {:.4}",
                    sample.subject_id(),
                    window.id,
                    window.start,
                    window.end,
                    features.mean_rr
                );
                Ok(HRVFeatureRecord::new(sample, window, features))
            })
            .collect()
    }
}

#[cfg(feature = "parallel")]
impl<C, D> BatchPipeline<C, D>
where
    C: SignalConditioner + Sync,
    D: BeatDetector + Sync,
{
    /// Same output as [`BatchPipeline::run`], one rayon task per subject.
    ///
    /// All subjects run to completion; the reported error is the first one in input order.
    pub fn run_parallel(
        &self,
        batch: &Batch,
        policy: &WindowingPolicy,
    ) -> Result<FeatureTable, BatchError> {
        use rayon::prelude::*;

        let results: Vec<_> = batch
            .samples()
            .par_iter()
            .map(|sample| self.process_sample(sample, batch.sampling_rate(), policy))
            .collect();
        let parts = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(FeatureTable::concat(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditioning::Passthrough;
    use crate::features::tests::{spikes, LocalMaxima};
    use crate::metrics::hrv::FrequencyConfig;
    use crate::windowing::WindowingMethod;

    const FS: f64 = 100.0;
    const RR_PATTERN: [f64; 7] = [0.8, 0.92, 0.74, 0.86, 0.79, 0.97, 0.71];

    fn metadata() -> BatchMetadata {
        BatchMetadata {
            supervisor: "Lieschen Mueller".into(),
            record_date: NaiveDate::from_ymd_opt(2034, 1, 16).unwrap(),
            device_name: Some("bioplux".into()),
            signal: Some(SignalSite::Chest),
        }
    }

    /// Spike train of `seconds` length with beats following `RR_PATTERN`.
    fn beating_sample(subject: &str, seconds: usize) -> Sample {
        let n = seconds * FS as usize;
        let mut beats = Vec::new();
        let mut t = 0.3;
        let mut k = 0;
        while ((t * FS).round() as usize) < n {
            beats.push((t * FS).round() as usize);
            t += RR_PATTERN[k % RR_PATTERN.len()];
            k += 1;
        }
        let timestamps = (0..n).map(|i| i as f64 / FS).collect();
        Sample::new(subject, format!("{subject}-id"), timestamps, spikes(n, &beats), None)
            .unwrap()
    }

    fn flat_sample(subject: &str, seconds: usize) -> Sample {
        let n = seconds * FS as usize;
        let timestamps = (0..n).map(|i| i as f64 / FS).collect();
        Sample::new(subject, format!("{subject}-id"), timestamps, vec![0.0; n], None).unwrap()
    }

    fn pipeline() -> BatchPipeline<Passthrough, LocalMaxima> {
        BatchPipeline::new(
            Passthrough,
            HRVFeatureComputer::new(LocalMaxima { threshold: 0.5 }, FrequencyConfig::default()),
        )
    }

    fn policy(size: f64) -> WindowingPolicy {
        WindowingPolicy::new(WindowingMethod::TimeRelated, size).unwrap()
    }

    #[test]
    fn records_follow_subject_then_window_order() {
        let batch = Batch::new(
            metadata(),
            FS,
            vec![beating_sample("p1", 20), beating_sample("p2", 30)],
        )
        .unwrap();
        let table = pipeline().run(&batch, &policy(10.0)).unwrap();
        assert_eq!(table.len(), 5);
        let keys: Vec<_> = table
            .iter()
            .map(|r| (r.subject_id.as_str(), r.window_id))
            .collect();
        assert_eq!(
            keys,
            vec![("p1", 0), ("p1", 1), ("p2", 0), ("p2", 1), ("p2", 2)]
        );
        assert!(table.iter().all(|r| r.sample_id == format!("{}-id", r.subject_id)));
        assert_eq!(table.records()[1].window_start, 10.0);
        assert_eq!(table.records()[1].window_end, 19.99);
        for r in table.iter() {
            assert!(r.mean_rr > 0.7 && r.mean_rr < 1.0);
            assert!(r.hf_band > 0.0);
            assert!(r.lf_hf_ratio.is_finite());
        }
    }

    #[test]
    fn first_failure_aborts_the_batch() {
        let batch = Batch::new(
            metadata(),
            FS,
            vec![
                beating_sample("p1", 20),
                flat_sample("p2", 20),
                flat_sample("p3", 20),
            ],
        )
        .unwrap();
        let err = pipeline().run(&batch, &policy(10.0)).unwrap_err();
        assert_eq!(err.subject_id, "p2");
        assert_eq!(err.window_id, Some(0));
        assert_eq!(err.stage, Stage::Features);
        assert!(matches!(
            err.kind(),
            HRVError::InsufficientBeats { found: 0, .. }
        ));
    }

    #[test]
    fn isolated_run_keeps_successful_subjects() {
        let batch = Batch::new(
            metadata(),
            FS,
            vec![flat_sample("p1", 20), beating_sample("p2", 20)],
        )
        .unwrap();
        let outcomes = pipeline().run_per_subject(&batch, &policy(10.0));
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].subject_id, "p1");
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
        let (table, failures) = partition_outcomes(outcomes);
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|r| r.subject_id == "p2"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].subject_id, "p1");
    }

    struct Truncating;

    impl SignalConditioner for Truncating {
        fn clean(&self, raw: &[f64], _fs: f64) -> Result<Vec<f64>, HRVError> {
            Ok(raw[1..].to_vec())
        }
    }

    #[test]
    fn length_changing_conditioner_is_a_conditioning_error() {
        let batch = Batch::new(metadata(), FS, vec![beating_sample("p1", 20)]).unwrap();
        let pipeline = BatchPipeline::new(
            Truncating,
            HRVFeatureComputer::new(LocalMaxima { threshold: 0.5 }, FrequencyConfig::default()),
        );
        let err = pipeline.run(&batch, &policy(10.0)).unwrap_err();
        assert_eq!(err.stage, Stage::Conditioning);
        assert_eq!(err.window_id, None);
    }

    #[test]
    fn subject_without_label_transitions_yields_no_rows() {
        let batch = Batch::new(metadata(), FS, vec![beating_sample("p1", 20)]).unwrap();
        let policy = WindowingPolicy::new(WindowingMethod::LabelRelatedAfter, 10.0).unwrap();
        let table = pipeline().run(&batch, &policy).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn label_windows_flow_through_the_pipeline() {
        let base = beating_sample("p1", 30);
        let labels = (0..base.len())
            .map(|i| if i < 1500 { "baseline" } else { "stress" }.to_string())
            .collect();
        let sample = Sample::new(
            "p1",
            "p1-id",
            base.timestamps().to_vec(),
            base.ecg().to_vec(),
            Some(labels),
        )
        .unwrap();
        let batch = Batch::new(metadata(), FS, vec![sample]).unwrap();
        let policy = WindowingPolicy::new(WindowingMethod::LabelRelatedMiddle, 12.0).unwrap();
        let table = pipeline().run(&batch, &policy).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].window_start, 9.0);
        assert_eq!(table.records()[0].window_end, 20.99);
    }

    #[test]
    fn rejects_non_positive_sampling_rate() {
        assert!(matches!(
            Batch::new(metadata(), 0.0, vec![]),
            Err(HRVError::Configuration(_))
        ));
    }

    #[test]
    fn table_serialises_as_flat_array() {
        let batch = Batch::new(metadata(), FS, vec![beating_sample("p1", 10)]).unwrap();
        let table = pipeline().run(&batch, &policy(10.0)).unwrap();
        let value = serde_json::to_value(&table).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        let object = rows[0].as_object().unwrap();
        assert_eq!(object.len(), HRVFeatureRecord::COLUMNS.len());
        for key in HRVFeatureRecord::COLUMNS {
            assert!(rows[0].get(key).is_some(), "missing {key}");
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_run_matches_sequential() {
        let batch = Batch::new(
            metadata(),
            FS,
            vec![
                beating_sample("p1", 20),
                beating_sample("p2", 30),
                beating_sample("p3", 10),
            ],
        )
        .unwrap();
        let p = pipeline();
        assert_eq!(
            p.run(&batch, &policy(10.0)).unwrap(),
            p.run_parallel(&batch, &policy(10.0)).unwrap()
        );
    }
}
