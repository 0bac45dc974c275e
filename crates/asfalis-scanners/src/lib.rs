//! Scanner driver adapters: one per external security tool.

pub mod codeql;
pub mod driver;
pub mod osv;
pub mod semgrep;
pub mod sonar;

pub use codeql::CodeqlDriver;
pub use driver::{DriverOutcome, ScannerDriver};
pub use osv::OsvDriver;
pub use semgrep::SemgrepDriver;
pub use sonar::SonarDriver;
