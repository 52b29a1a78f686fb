use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::args::ArgValue;

/// Final verdict of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Review,
    Block,
}

/// Per-layer outcome recorded on a `TraceStep`. Distinct from `Decision`
/// because a layer can `pass` without the overall call being `allow` yet
/// (e.g. layer 1-3 all `pass`, layer 5 elevates to `review`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Review,
    Block,
}

impl From<Decision> for Outcome {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Allow => Outcome::Pass,
            Decision::Review => Outcome::Review,
            Decision::Block => Outcome::Block,
        }
    }
}

/// One pipeline layer's contribution to the overall decision. Appended in
/// pipeline order; layers skipped by a short-circuit are simply absent —
/// the trace never contains placeholder entries for layers that didn't run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    /// 1-6, matching the six pipeline layers.
    pub layer: u8,
    pub name: String,
    pub outcome: Outcome,
    /// Signed risk contribution of this layer (may be 0).
    pub risk_contribution: i32,
    pub matched_ids: Vec<String>,
    pub detail: String,
    pub duration_ms: u64,
}

impl TraceStep {
    pub fn new(
        layer: u8,
        name: impl Into<String>,
        outcome: Outcome,
        risk_contribution: i32,
        matched_ids: Vec<String>,
        detail: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            layer,
            name: name.into(),
            outcome,
            risk_contribution,
            matched_ids,
            detail: detail.into(),
            duration_ms,
        }
    }
}

/// Request-level context accompanying a tool call, independent of the
/// tool's own arguments. Fields are all optional except where noted by
/// the spec; absent fields simply disable the checks that depend on them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub conversation_id: Option<String>,
    pub turn_id: Option<String>,
    pub prompt: Option<String>,
}

/// A proposed tool call submitted to `Engine::evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    pub args: ArgValue,
    #[serde(default)]
    pub context: RequestContext,
}

/// One evaluated tool call. Immutable once written to the `Store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub tool: String,
    pub args: ArgValue,
    /// Derived, indexed-for-search flattening of `args` (see gov-normalize).
    pub flattened_args: String,
    pub decision: Decision,
    pub risk_score: u8,
    pub matched_policy_ids: Vec<String>,
    pub chain_pattern: Option<String>,
    pub execution_trace: Vec<TraceStep>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub conversation_id: Option<String>,
    pub fee_charged: Option<String>,
}

/// The outcome of one `Engine::evaluate` call, as returned to the caller.
/// Mirrors `Action` plus response-only flags that are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDecision {
    pub action_id: String,
    pub decision: Decision,
    pub risk_score: u8,
    pub explanation: String,
    pub policy_ids: Vec<String>,
    pub chain_pattern: Option<String>,
    pub modified_args: Option<ArgValue>,
    pub execution_trace: Vec<TraceStep>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub payment_required: bool,
}
