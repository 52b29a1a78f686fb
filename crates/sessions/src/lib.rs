//! Session Store (C4): reconstructs a rolling per-agent/session window of
//! recent actions from the audit log. Holds no state of its own — every
//! call re-derives the window from `Store::query_actions`, so results are
//! only ever as fresh as the last persisted action.

use gov_domain::error::Result;
use gov_domain::session::SessionHistory;
use gov_domain::traits::{Clock, Store};

/// Parameters for windowed session reconstruction. Defaults match
/// `gov_domain::config::SessionConfig`'s defaults (60 minutes, 50 entries)
/// but this type takes plain values so callers aren't coupled to the
/// config crate.
#[derive(Debug, Clone, Copy)]
pub struct SessionWindow {
    pub window_minutes: i64,
    pub max_entries: usize,
}

impl SessionWindow {
    pub fn new(window_minutes: i64, max_entries: usize) -> Self {
        Self { window_minutes, max_entries }
    }

    /// Reconstructs the last `max_entries` actions within the trailing
    /// `window_minutes` for `(agent_id, session_id?)`, oldest-first. If
    /// `session_id` is `None`, scoping is by `agent_id` alone.
    pub async fn reconstruct(
        &self,
        store: &dyn Store,
        clock: &dyn Clock,
        agent_id: &str,
        session_id: Option<&str>,
    ) -> Result<SessionHistory> {
        let since = clock.now() - chrono::Duration::minutes(self.window_minutes);
        let actions = store
            .query_actions(agent_id, session_id, since, self.max_entries)
            .await?;
        Ok(SessionHistory {
            agent_id: agent_id.to_string(),
            session_id: session_id.map(String::from),
            actions,
        })
    }
}

impl Default for SessionWindow {
    fn default() -> Self {
        Self { window_minutes: 60, max_entries: 50 }
    }
}
