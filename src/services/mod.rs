pub mod checkpoint_store;
pub mod error_classifier;
pub mod fingerprint;
pub mod prompt;
pub mod timing;

pub use checkpoint_store::{CheckpointStore, CheckpointSummary};
pub use error_classifier::ErrorClassifier;
pub use fingerprint::ConfigFingerprint;
pub use prompt::{build_analysis_prompt, AnalysisPrompt};
pub use timing::{
    CallTiming, FileTiming, TimingAccumulator, TimingExporter, TimingReport, TimingSnapshot,
};
