use crate::action::Action;

/// Derived (never stored) ordered sequence of a session's recent actions,
/// oldest-first, bounded by the configured window and entry cap. Produced
/// by `gov-sessions` from the audit log; consumed by `gov-chain`.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    pub agent_id: String,
    pub session_id: Option<String>,
    pub actions: Vec<Action>,
}

impl SessionHistory {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}
