//! Diagnostic normalizer: SARIF parsing, severity mapping, fingerprinting,
//! and merge for the scan pipeline's `normalize` stage.

pub mod fingerprint;
pub mod sarif;
pub mod severity;

pub use fingerprint::fingerprint as compute_fingerprint;
pub use sarif::{merge_sarif_runs, parse_sarif_to_findings};
