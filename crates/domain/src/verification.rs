use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Skip,
}

/// Result of one of the eight independent post-execution checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub outcome: CheckOutcome,
    pub detail: String,
    pub risk_delta: i32,
}

impl CheckResult {
    pub fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            outcome: CheckOutcome::Pass,
            detail: detail.into(),
            risk_delta: 0,
        }
    }

    pub fn fail(name: &'static str, detail: impl Into<String>, risk_delta: i32) -> Self {
        Self {
            name,
            outcome: CheckOutcome::Fail,
            detail: detail.into(),
            risk_delta,
        }
    }

    pub fn skip(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            outcome: CheckOutcome::Skip,
            detail: detail.into(),
            risk_delta: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Compliant,
    Suspicious,
    Violation,
}

/// Persisted outcome of a `Verify` call: one row per verified action,
/// linking back to it via `action_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationLog {
    pub id: String,
    pub action_id: String,
    pub checks: Vec<CheckResult>,
    pub verdict: Verdict,
    pub aggregated_risk_delta: i32,
    pub drift_score: u8,
    pub timestamp: DateTime<Utc>,
}

/// The tool-execution result being verified, plus the optional diff the
/// caller observed (e.g. a file diff, a set of rows changed).
#[derive(Debug, Clone, Deserialize)]
pub struct ToolResult {
    pub status: Option<String>,
    pub output: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    /// Arbitrary structured payload, scanned as text where needed.
    #[serde(default)]
    pub raw: Option<Json>,
}
