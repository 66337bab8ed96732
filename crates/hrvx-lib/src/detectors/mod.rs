pub mod ecg;

pub use ecg::{BeatDetector, DetectorConfig, PanTompkinsDetector};
