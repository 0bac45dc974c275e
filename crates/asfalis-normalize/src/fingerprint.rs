//! Deterministic finding fingerprinting.

use sha2::{Digest, Sha256};

/// First 32 hex characters of SHA-256 over `tool:rule_id:path:start:end:msg`.
pub fn fingerprint(
    tool: &str,
    rule_id: &str,
    path: &str,
    start_line: Option<i64>,
    end_line: Option<i64>,
    message: &str,
) -> String {
    let start = start_line.map(|n| n.to_string()).unwrap_or_default();
    let end = end_line.map(|n| n.to_string()).unwrap_or_default();
    let input = format!("{tool}:{rule_id}:{path}:{start}:{end}:{message}");
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("semgrep", "rule-1", "a.py", Some(1), Some(2), "msg");
        let b = fingerprint("semgrep", "rule-1", "a.py", Some(1), Some(2), "msg");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn fingerprint_differs_on_any_input_change() {
        let base = fingerprint("semgrep", "rule-1", "a.py", Some(1), Some(2), "msg");
        let different_rule = fingerprint("semgrep", "rule-2", "a.py", Some(1), Some(2), "msg");
        let different_line = fingerprint("semgrep", "rule-1", "a.py", Some(9), Some(2), "msg");
        assert_ne!(base, different_rule);
        assert_ne!(base, different_line);
    }
}
