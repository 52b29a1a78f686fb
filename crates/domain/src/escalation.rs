use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// A record of an action requiring or receiving human adjudication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub id: String,
    pub action_id: String,
    pub severity: Severity,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_by: Option<String>,
}

/// Filter accepted by `EscalationList`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EscalationFilter {
    pub status: Option<EscalationStatus>,
    pub agent_id: Option<String>,
}
