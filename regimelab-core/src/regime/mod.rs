//! Regime detection: standardise features, fit an HMM, label its states.

pub mod detector;
pub mod scaler;

pub use detector::{
    DetectorConfig, InferenceMode, RegimeDetector, RegimeDiagnostics, RegimeError, RegimeFilter,
    RegimeModel,
};
pub use scaler::StandardScaler;
