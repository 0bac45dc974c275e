//! Parses the de-facto standard 2.1.0 structured-log schema into canonical
//! findings, and merges multiple such documents into one.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use asfalis_core::{Finding, ScanRunId, Tool};

use crate::fingerprint::fingerprint;
use crate::severity;

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses one structured-log document into canonical findings. Never
/// propagates a parse error: an invalid document yields zero findings.
pub fn parse_sarif_to_findings(content: &str, tool: Tool, run_id: ScanRunId) -> Vec<Finding> {
    let data: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "structured log failed to parse, yielding zero findings");
            return Vec::new();
        }
    };

    let mut findings = Vec::new();
    let runs = data.get("runs").and_then(Value::as_array).cloned().unwrap_or_default();
    for run in runs {
        let results = run.get("results").and_then(Value::as_array).cloned().unwrap_or_default();
        let driver = run.pointer("/tool/driver").cloned().unwrap_or(Value::Null);
        let rules: HashMap<String, Value> = driver
            .get("rules")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|r| {
                        r.get("id")
                            .and_then(Value::as_str)
                            .map(|id| (id.to_string(), r.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        for result in results {
            let rule_id = result.get("ruleId").and_then(Value::as_str).unwrap_or("").to_string();
            let rule = rules.get(&rule_id).cloned().unwrap_or(Value::Null);

            let message = result
                .pointer("/message/text")
                .and_then(Value::as_str)
                .or_else(|| result.pointer("/message/markdown").and_then(Value::as_str))
                .unwrap_or("")
                .to_string();

            let title = rule
                .pointer("/shortDescription/text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| truncate(&message, 512));

            let help_text = rule
                .pointer("/fullDescription/text")
                .and_then(Value::as_str)
                .or_else(|| rule.pointer("/help/text").and_then(Value::as_str))
                .or_else(|| rule.get("helpUri").and_then(Value::as_str))
                .map(str::to_string);

            let level = result
                .get("level")
                .and_then(Value::as_str)
                .unwrap_or("warning")
                .to_lowercase();

            let location = result
                .get("locations")
                .and_then(Value::as_array)
                .and_then(|a| a.first())
                .cloned()
                .unwrap_or(Value::Null);
            let phys = location.get("physicalLocation").cloned().unwrap_or(Value::Null);
            let path = phys
                .pointer("/artifactLocation/uri")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let region = phys.get("region").cloned().unwrap_or(Value::Null);
            let start_line = region.get("startLine").and_then(Value::as_i64);
            let end_line = region.get("endLine").and_then(Value::as_i64).or(start_line);

            let cvss = result
                .pointer("/properties/cvss")
                .and_then(value_as_string)
                .or_else(|| rule.pointer("/properties/cvss").and_then(value_as_string));

            let severity_normalized = severity::normalize(tool, Some(&level), cvss.as_deref());
            let fp = fingerprint(tool.as_str(), &rule_id, &path, start_line, end_line, &message);

            let codeql_trace = if matches!(tool, Tool::Codeql) {
                result.get("codeFlows").map(|flows| truncate(&flows.to_string(), 8000))
            } else {
                None
            };

            findings.push(Finding {
                run_id,
                tool,
                rule_id: non_empty(truncate(&rule_id, 255)),
                title: non_empty(truncate(&title, 512)),
                severity_raw: non_empty(truncate(&level, 64)),
                cvss: cvss.map(|c| truncate(&c, 32)),
                cwe: None,
                confidence: None,
                path: non_empty(truncate(&path, 1024)),
                start_line,
                end_line,
                fingerprint: fp,
                help_text: help_text.map(|h| truncate(&h, 10000)).filter(|s| !s.is_empty()),
                codeql_trace,
                severity_normalized,
            });
        }
    }
    findings
}

/// Concatenates the `runs` arrays of every document into one. Returns `None`
/// if the concatenation is empty (no merged artifact is emitted).
pub fn merge_sarif_runs(docs: &[String]) -> Option<String> {
    let mut merged_runs = Vec::new();
    for doc in docs {
        if let Ok(data) = serde_json::from_str::<Value>(doc) {
            if let Some(runs) = data.get("runs").and_then(Value::as_array) {
                merged_runs.extend(runs.iter().cloned());
            }
        }
    }
    if merged_runs.is_empty() {
        return None;
    }
    let merged = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": merged_runs,
    });
    serde_json::to_string_pretty(&merged).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sarif(rule_id: &str, level: &str) -> String {
        serde_json::json!({
            "version": "2.1.0",
            "runs": [{
                "tool": {"driver": {"name": "semgrep", "rules": [
                    {"id": rule_id, "shortDescription": {"text": "Hardcoded secret"}}
                ]}},
                "results": [{
                    "ruleId": rule_id,
                    "level": level,
                    "message": {"text": "found a secret"},
                    "locations": [{"physicalLocation": {
                        "artifactLocation": {"uri": "hello.py"},
                        "region": {"startLine": 3, "endLine": 3}
                    }}]
                }]
            }]
        })
        .to_string()
    }

    #[test]
    fn parses_one_result_into_one_finding() {
        let run_id = ScanRunId::new();
        let findings = parse_sarif_to_findings(&sample_sarif("rule.secret", "error"), Tool::Semgrep, run_id);
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.rule_id.as_deref(), Some("rule.secret"));
        assert_eq!(f.title.as_deref(), Some("Hardcoded secret"));
        assert_eq!(f.path.as_deref(), Some("hello.py"));
        assert_eq!(f.start_line, Some(3));
        assert_eq!(f.severity_normalized, asfalis_core::Severity::High);
    }

    #[test]
    fn malformed_json_yields_zero_findings_not_an_error() {
        let findings = parse_sarif_to_findings("not json", Tool::Osv, ScanRunId::new());
        assert!(findings.is_empty());
    }

    #[test]
    fn normalizing_twice_yields_identical_findings() {
        let doc = sample_sarif("rule.a", "warning");
        let run_id = ScanRunId::new();
        let first = parse_sarif_to_findings(&doc, Tool::Semgrep, run_id);
        let second = parse_sarif_to_findings(&doc, Tool::Semgrep, run_id);
        assert_eq!(first, second);
    }

    #[test]
    fn merging_single_document_preserves_its_runs() {
        let doc = sample_sarif("rule.a", "warning");
        let merged = merge_sarif_runs(&[doc.clone()]).expect("merged");
        let original: Value = serde_json::from_str(&doc).unwrap();
        let merged_value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(merged_value["runs"], original["runs"]);
    }

    #[test]
    fn merging_empty_runs_yields_no_artifact() {
        assert!(merge_sarif_runs(&[]).is_none());
        let empty_doc = serde_json::json!({"version": "2.1.0", "runs": []}).to_string();
        assert!(merge_sarif_runs(&[empty_doc]).is_none());
    }
}
