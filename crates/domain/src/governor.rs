use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One process-wide flag tracked in `GovernorState` — at minimum the kill
/// switch, but the key-value shape allows callers to layer in additional
/// global flags without a schema change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorFlag {
    pub key: String,
    pub value: bool,
    pub updated_at: DateTime<Utc>,
    pub actor_id: Option<String>,
}

/// Well-known `GovernorState` key for the kill switch.
pub const KILL_SWITCH_KEY: &str = "kill_switch";
