use serde::Serialize;

/// Structured operational telemetry emitted across the governance engine
/// crates. Distinct from `TraceStep` (which is per-action pipeline data,
/// persisted on the `Action` itself) — `TraceEvent` is for operators
/// watching logs, not for the audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ActionEvaluated {
        action_id: String,
        tool: String,
        decision: String,
        risk_score: u8,
        duration_ms: u64,
    },
    KillSwitchToggled {
        engaged: bool,
        actor_id: Option<String>,
    },
    PolicyChanged {
        policy_id: String,
        version: u32,
        actor_id: Option<String>,
    },
    ChainPatternMatched {
        pattern_id: String,
        boost: i32,
        agent_id: String,
    },
    EscalationCreated {
        escalation_id: String,
        action_id: String,
        severity: String,
    },
    WalletDeducted {
        owner_id: String,
        amount: String,
        tier: String,
    },
    VerificationCompleted {
        action_id: String,
        verdict: String,
        drift_score: u8,
    },
    SubscriberDropped {
        subscriber_id: u64,
        dropped_count: u64,
    },
    PolicyStoreDegraded {
        reason: String,
    },
    ChainTimedOut {
        agent_id: String,
        patterns_evaluated: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "gov_event");
    }
}
