//! Severity normalization: a pure tagged-dispatch table per tool, not via
//! inheritance or a shared enum of levels.

use asfalis_core::{Severity, Tool};

pub fn normalize(tool: Tool, raw_level: Option<&str>, cvss: Option<&str>) -> Severity {
    match tool {
        Tool::Osv => normalize_osv(cvss),
        Tool::Semgrep => normalize_semgrep(raw_level),
        Tool::Codeql => normalize_codeql(raw_level),
    }
}

fn normalize_osv(cvss: Option<&str>) -> Severity {
    let Some(score) = cvss.and_then(|s| s.parse::<f64>().ok()) else {
        return Severity::Med;
    };
    if score >= 9.0 {
        Severity::Critical
    } else if score >= 7.0 {
        Severity::High
    } else if score >= 4.0 {
        Severity::Med
    } else {
        Severity::Low
    }
}

fn normalize_semgrep(raw_level: Option<&str>) -> Severity {
    match raw_level.unwrap_or("").to_uppercase().as_str() {
        "ERROR" => Severity::High,
        "WARNING" => Severity::Med,
        "INFO" => Severity::Info,
        _ => Severity::Med,
    }
}

fn normalize_codeql(raw_level: Option<&str>) -> Severity {
    match raw_level.unwrap_or("").to_lowercase().as_str() {
        "error" => Severity::High,
        "warning" => Severity::Med,
        "recommendation" => Severity::Low,
        "note" => Severity::Info,
        _ => Severity::Med,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osv_maps_cvss_bands() {
        assert_eq!(normalize_osv(Some("9.8")), Severity::Critical);
        assert_eq!(normalize_osv(Some("7.1")), Severity::High);
        assert_eq!(normalize_osv(Some("4.0")), Severity::Med);
        assert_eq!(normalize_osv(Some("1.0")), Severity::Low);
        assert_eq!(normalize_osv(None), Severity::Med);
        assert_eq!(normalize_osv(Some("not-a-number")), Severity::Med);
    }

    #[test]
    fn semgrep_maps_level_strings() {
        assert_eq!(normalize_semgrep(Some("error")), Severity::High);
        assert_eq!(normalize_semgrep(Some("WARNING")), Severity::Med);
        assert_eq!(normalize_semgrep(Some("info")), Severity::Info);
        assert_eq!(normalize_semgrep(Some("unknown")), Severity::Med);
    }

    #[test]
    fn codeql_maps_level_strings() {
        assert_eq!(normalize_codeql(Some("error")), Severity::High);
        assert_eq!(normalize_codeql(Some("warning")), Severity::Med);
        assert_eq!(normalize_codeql(Some("recommendation")), Severity::Low);
        assert_eq!(normalize_codeql(Some("note")), Severity::Info);
    }
}
