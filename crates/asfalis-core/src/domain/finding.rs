//! Canonical, severity-normalized diagnostic records.

use serde::{Deserialize, Serialize};

use super::ids::ScanRunId;

/// Canonical severity band. Always one of these five regardless of tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Med,
    High,
    Critical,
}

/// The scanner that produced a finding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Osv,
    Semgrep,
    Codeql,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Osv => "osv",
            Tool::Semgrep => "semgrep",
            Tool::Codeql => "codeql",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One canonical diagnostic, normalized from a tool-specific structured log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub run_id: ScanRunId,
    pub tool: Tool,
    pub rule_id: Option<String>,
    pub title: Option<String>,
    pub severity_raw: Option<String>,
    pub cvss: Option<String>,
    pub cwe: Option<String>,
    pub confidence: Option<String>,
    pub path: Option<String>,
    pub start_line: Option<i64>,
    pub end_line: Option<i64>,
    pub fingerprint: String,
    pub help_text: Option<String>,
    pub codeql_trace: Option<String>,
    pub severity_normalized: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_runs_info_to_critical() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Low < Severity::Med);
        assert!(Severity::Med < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_serde_uses_uppercase() {
        let json = serde_json::to_string(&Severity::Med).expect("serialize");
        assert_eq!(json, "\"MED\"");
    }

    #[test]
    fn tool_serde_uses_snake_case() {
        let json = serde_json::to_string(&Tool::Semgrep).expect("serialize");
        assert_eq!(json, "\"semgrep\"");
    }
}
