use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic, tamper-evident attestation of a single governance decision.
/// Advisory, not source of truth: a failed receipt write never rolls back
/// the `Action` it attests to (see `gov-audit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: u64,
    pub action_id: String,
    /// Hex-encoded SHA-256 of `action_id|tool|decision|risk|timestamp_iso`.
    pub hash: String,
    pub fee_tier: String,
    pub fee_amount: String,
    pub timestamp: DateTime<Utc>,
}
