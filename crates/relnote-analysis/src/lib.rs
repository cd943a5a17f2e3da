pub mod classifier;
pub mod deep_dive;
pub mod prompts;

pub use classifier::{ClassifyError, ClassifyOutcome, Classifier, Verdict, coerce_score, parse_verdict};
pub use deep_dive::{DeepDiveAnalyzer, DeepDiveOutcome, MergeReport, merge_flagged, patch_digest};
