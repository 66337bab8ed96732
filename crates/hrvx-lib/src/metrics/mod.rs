pub mod hrv;
pub mod spectral;

pub use hrv::{hrv_features, hrv_frequency, hrv_time, FrequencyConfig, HRVFeatures};
pub use spectral::{welch, Psd};
