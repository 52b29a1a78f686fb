//! Risk Estimator (C3): a deterministic heuristic scoring a single tool
//! call from its kind, flattened argument text, and recipient cardinality.
//! No history, no learning — `gov-chain` is what layers session context on
//! top of this.

use std::collections::HashMap;
use std::sync::OnceLock;

use gov_domain::ArgValue;
use regex::Regex;

fn credential_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(password|secret|api[_-]?key|private[_-]?key)\b|\bsk-[a-zA-Z0-9]{10,}\b|\bghp_[a-zA-Z0-9]{10,}\b|\bAKIA[0-9A-Z]{10,}\b",
        )
        .expect("static pattern")
    })
}

fn destructive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)rm\s+-rf|drop\s+table|mkfs|shutdown").expect("static pattern"))
}

/// Whether `text` contains a credential-like token (password/secret/api-key
/// keywords, or a common provider token prefix). Shared with `gov-chain`,
/// whose `multi-cred-harvest` and `credential-then-http` patterns scan
/// prior actions for the same signal.
pub fn contains_credential_keywords(text: &str) -> bool {
    credential_regex().is_match(text)
}

/// Whether `text` contains a destructive-action keyword (`rm -rf`,
/// `DROP TABLE`, `mkfs`, `shutdown`).
pub fn contains_destructive_keywords(text: &str) -> bool {
    destructive_regex().is_match(text)
}

/// Per-signal contributions making up a total risk score, kept separate
/// so callers (and tests) can see which signal fired without re-deriving it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskBreakdown {
    pub tool_base: u8,
    pub credential_bonus: u8,
    pub destructive_bonus: u8,
    pub exfil_bonus: u8,
    pub cardinality_bonus: u8,
}

impl RiskBreakdown {
    /// Sum of every signal, capped at 100.
    pub fn total(&self) -> u8 {
        let sum = self.tool_base as u32
            + self.credential_bonus as u32
            + self.destructive_bonus as u32
            + self.exfil_bonus as u32
            + self.cardinality_bonus as u32;
        sum.min(100) as u8
    }
}

/// Base risk by tool class. Open mapping: callers may extend it for
/// custom tool kinds; anything absent falls back to `default_tool_risk`.
pub struct RiskEstimator {
    tool_class: HashMap<String, u8>,
    default_tool_risk: u8,
    domain_re: Regex,
    internal_allowlist: Vec<String>,
}

fn default_tool_class() -> HashMap<String, u8> {
    let mut m = HashMap::new();
    m.insert("shell".to_string(), 60);
    m.insert("shell_exec".to_string(), 60);
    m.insert("http_request".to_string(), 30);
    m.insert("file_write".to_string(), 40);
    m.insert("file_read".to_string(), 15);
    m.insert("messaging_send".to_string(), 25);
    m
}

impl RiskEstimator {
    /// `internal_allowlist` holds domain substrings (e.g. `"internal.corp"`)
    /// that never trigger the network-exfil bonus even when they look
    /// domain-shaped.
    pub fn new(internal_allowlist: Vec<String>) -> Self {
        Self {
            tool_class: default_tool_class(),
            default_tool_risk: 20,
            domain_re: Regex::new(r"(?i)\b(?:[a-z0-9][a-z0-9-]*\.)+[a-z]{2,}\b").expect("static pattern"),
            internal_allowlist,
        }
    }

    /// Registers or overrides a tool-class base risk. Returns `self` for
    /// chained construction.
    pub fn with_tool_risk(mut self, tool: impl Into<String>, risk: u8) -> Self {
        self.tool_class.insert(tool.into(), risk);
        self
    }

    pub fn estimate(&self, tool: &str, flattened: &str, args: &ArgValue) -> RiskBreakdown {
        let tool_base = self.tool_class.get(tool).copied().unwrap_or(self.default_tool_risk);

        let credential_bonus = if contains_credential_keywords(flattened) { 25 } else { 0 };
        let destructive_bonus = if contains_destructive_keywords(flattened) { 30 } else { 0 };
        let exfil_bonus = if self.has_exfil_domain(flattened) { 15 } else { 0 };
        let cardinality_bonus = if self.recipient_count(args) >= 10 { 15 } else { 0 };

        RiskBreakdown {
            tool_base,
            credential_bonus,
            destructive_bonus,
            exfil_bonus,
            cardinality_bonus,
        }
    }

    fn has_exfil_domain(&self, flattened: &str) -> bool {
        self.domain_re
            .find_iter(flattened)
            .any(|m| !self.internal_allowlist.iter().any(|allowed| m.as_str().contains(allowed.as_str())))
    }

    fn recipient_count(&self, args: &ArgValue) -> usize {
        args.list_len("recipients").max(args.list_len("to"))
    }
}

impl Default for RiskEstimator {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
