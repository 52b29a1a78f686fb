use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::action::Decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Base,
    Dynamic,
}

/// A single governance rule mapping a tool invocation pattern to a
/// decision and severity.
///
/// Invariant: any regex field present on a `Policy` has already been
/// compiled successfully — the store rejects malformed policies at
/// `create`/`patch` time (see `gov-policy`), so by the time a `Policy`
/// value exists it is safe to re-compile its regex fields without
/// additional error handling in matching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    pub description: String,
    /// Literal tool name, or `"*"` to match any tool.
    pub target_tool_pattern: String,
    pub severity: Severity,
    pub action: Decision,
    pub url_regex: Option<String>,
    pub args_regex: Option<String>,
    pub active: bool,
    pub origin: Origin,
    pub version: u32,
}

/// Fields needed to create a new `Policy`. `id` must be unique within the
/// store; `version`/`origin` are assigned by the store, not the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySpec {
    pub id: String,
    pub description: String,
    pub target_tool_pattern: String,
    pub severity: Severity,
    pub action: Decision,
    #[serde(default)]
    pub url_regex: Option<String>,
    #[serde(default)]
    pub args_regex: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Partial update to an existing `Policy`. `None` fields are left
/// unchanged; regex fields use a double-option so a caller can
/// distinguish "don't touch" from "clear this regex" — `Some(None)`
/// clears, `None` leaves as-is, `Some(Some(_))` sets a new pattern.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyPatch {
    pub description: Option<String>,
    pub target_tool_pattern: Option<String>,
    pub severity: Option<Severity>,
    pub action: Option<Decision>,
    #[serde(default)]
    pub url_regex: Option<Option<String>>,
    #[serde(default)]
    pub args_regex: Option<Option<String>>,
    pub active: Option<bool>,
}

/// Immutable snapshot of a `Policy`'s state at write time, appended on
/// every write. `restore(id, n)` writes a *new* version whose body
/// equals version `n`'s snapshot; it never mutates history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVersion {
    pub policy_id: String,
    pub version: u32,
    pub snapshot: Policy,
    pub before: Option<Json>,
    pub after: Json,
    pub actor_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}
