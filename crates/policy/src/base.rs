//! The default base policy set representing "a static file" per the
//! governance design's Policy Store contract: a small, curated registry
//! covering the highest-confidence blocks and reviews, shipped by the
//! caller at `Engine::new` time and overridable by dynamic policies
//! sharing the same id.

use gov_domain::policy::{Origin, Policy, Severity};
use gov_domain::Decision;

fn base(id: &str, description: &str, target: &str, severity: Severity, action: Decision, args_regex: Option<&str>) -> Policy {
    Policy {
        id: id.to_string(),
        description: description.to_string(),
        target_tool_pattern: target.to_string(),
        severity,
        action,
        url_regex: None,
        args_regex: args_regex.map(String::from),
        active: true,
        origin: Origin::Base,
        version: 1,
    }
}

/// A reasonable default registry of base policies, loaded at engine
/// construction time. Callers are free to supply their own set instead —
/// this one exists so a fresh deployment isn't running with zero policies
/// on day one.
pub fn default_base_policies() -> Vec<Policy> {
    vec![
        base(
            "shell-dangerous",
            "Blocks recognizably destructive shell commands",
            "shell",
            Severity::Critical,
            Decision::Block,
            Some(r"(?i)rm\s+-rf\s+/|drop\s+table|mkfs"),
        ),
        base(
            "shell-exec-dangerous",
            "Blocks recognizably destructive shell commands on the alternate shell tool name",
            "shell_exec",
            Severity::Critical,
            Decision::Block,
            Some(r"(?i)rm\s+-rf\s+/|drop\s+table|mkfs"),
        ),
        base(
            "credential-exfil-http",
            "Reviews outbound HTTP calls whose payload looks like it carries credentials",
            "http_request",
            Severity::High,
            Decision::Review,
            Some(r"(?i)\b(password|secret|api[_-]?key|private[_-]?key)\b"),
        ),
        base(
            "system-path-write",
            "Reviews file writes targeting system paths",
            "file_write",
            Severity::High,
            Decision::Review,
            Some(r"^(/etc|/usr|/bin|/sys|/boot)"),
        ),
        base(
            "mass-recipient-send",
            "Reviews messages addressed to an unusually large recipient list",
            "messaging_send",
            Severity::Medium,
            Decision::Review,
            None,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_includes_shell_dangerous() {
        let policies = default_base_policies();
        assert!(policies.iter().any(|p| p.id == "shell-dangerous"));
    }

    #[test]
    fn every_regex_field_compiles() {
        for policy in default_base_policies() {
            if let Some(pattern) = &policy.args_regex {
                regex::Regex::new(pattern).unwrap_or_else(|e| panic!("policy {} has invalid args_regex: {e}", policy.id));
            }
            if let Some(pattern) = &policy.url_regex {
                regex::Regex::new(pattern).unwrap_or_else(|e| panic!("policy {} has invalid url_regex: {e}", policy.id));
            }
        }
    }

    #[test]
    fn all_ids_are_unique() {
        let policies = default_base_policies();
        let mut ids: Vec<&str> = policies.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }
}
