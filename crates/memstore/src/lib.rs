//! Reference in-memory implementations of `gov_domain::traits::{Store,
//! Clock, Notifier}`, used by tests, the CLI demo, and anywhere a real
//! persistence backend hasn't been wired in. Mirrors the shape of a real
//! store closely enough that swapping one in later changes no call site.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use gov_domain::action::Action;
use gov_domain::error::Result;
use gov_domain::escalation::{EscalationEvent, EscalationFilter};
use gov_domain::governor::GovernorFlag;
use gov_domain::policy::{Policy, PolicyVersion};
use gov_domain::receipt::Receipt;
use gov_domain::traits::{Clock, Notifier, NotifierEvent, Store};
use gov_domain::verification::VerificationLog;
use gov_domain::wallet::Wallet;

#[derive(Default)]
struct Tables {
    actions: HashMap<String, Action>,
    policies: HashMap<String, Policy>,
    policy_versions: HashMap<String, Vec<PolicyVersion>>,
    governor_flags: HashMap<String, GovernorFlag>,
    verification_logs: HashMap<String, VerificationLog>,
    receipts: Vec<Receipt>,
    wallets: HashMap<String, Wallet>,
    escalations: HashMap<String, EscalationEvent>,
}

/// Single-process `Store` backed by `parking_lot::RwLock`-guarded maps.
/// Unbounded — fine for tests and demos, not for a long-lived process
/// under real load.
#[derive(Default)]
pub struct MemStore {
    tables: RwLock<Tables>,
    receipt_seq: AtomicU64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn append_action(&self, action: Action) -> Result<()> {
        self.tables.write().actions.insert(action.id.clone(), action);
        Ok(())
    }

    async fn get_action(&self, id: &str) -> Result<Option<Action>> {
        Ok(self.tables.read().actions.get(id).cloned())
    }

    async fn query_actions(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Action>> {
        let tables = self.tables.read();
        let mut matched: Vec<Action> = tables
            .actions
            .values()
            .filter(|a| a.agent_id.as_deref() == Some(agent_id))
            .filter(|a| session_id.is_none() || a.session_id.as_deref() == session_id)
            .filter(|a| a.timestamp >= since)
            .cloned()
            .collect();
        matched.sort_by_key(|a| a.timestamp);
        if matched.len() > limit {
            let drop = matched.len() - limit;
            matched.drain(0..drop);
        }
        Ok(matched)
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        Ok(self.tables.read().policies.values().cloned().collect())
    }

    async fn get_policy(&self, id: &str) -> Result<Option<Policy>> {
        Ok(self.tables.read().policies.get(id).cloned())
    }

    async fn put_policy(&self, policy: Policy) -> Result<()> {
        self.tables.write().policies.insert(policy.id.clone(), policy);
        Ok(())
    }

    async fn delete_policy(&self, id: &str) -> Result<()> {
        self.tables.write().policies.remove(id);
        Ok(())
    }

    async fn append_policy_version(&self, version: PolicyVersion) -> Result<()> {
        self.tables
            .write()
            .policy_versions
            .entry(version.policy_id.clone())
            .or_default()
            .push(version);
        Ok(())
    }

    async fn list_policy_versions(&self, id: &str) -> Result<Vec<PolicyVersion>> {
        Ok(self
            .tables
            .read()
            .policy_versions
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_governor_flag(&self, key: &str) -> Result<Option<GovernorFlag>> {
        Ok(self.tables.read().governor_flags.get(key).cloned())
    }

    async fn put_governor_flag(&self, flag: GovernorFlag) -> Result<()> {
        self.tables.write().governor_flags.insert(flag.key.clone(), flag);
        Ok(())
    }

    async fn append_verification_log(&self, log: VerificationLog) -> Result<()> {
        self.tables
            .write()
            .verification_logs
            .insert(log.action_id.clone(), log);
        Ok(())
    }

    async fn get_verification_log_for_action(&self, action_id: &str) -> Result<Option<VerificationLog>> {
        Ok(self.tables.read().verification_logs.get(action_id).cloned())
    }

    async fn append_receipt(&self, receipt: Receipt) -> Result<()> {
        self.tables.write().receipts.push(receipt);
        Ok(())
    }

    async fn next_receipt_id(&self) -> Result<u64> {
        Ok(self.receipt_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    async fn get_wallet(&self, owner_id: &str) -> Result<Option<Wallet>> {
        Ok(self.tables.read().wallets.get(owner_id).cloned())
    }

    async fn put_wallet(&self, wallet: Wallet) -> Result<()> {
        self.tables.write().wallets.insert(wallet.owner_id.clone(), wallet);
        Ok(())
    }

    async fn put_escalation(&self, event: EscalationEvent) -> Result<()> {
        self.tables.write().escalations.insert(event.id.clone(), event);
        Ok(())
    }

    async fn get_escalation(&self, id: &str) -> Result<Option<EscalationEvent>> {
        Ok(self.tables.read().escalations.get(id).cloned())
    }

    async fn list_escalations(&self, filter: EscalationFilter) -> Result<Vec<EscalationEvent>> {
        let tables = self.tables.read();
        Ok(tables
            .escalations
            .values()
            .filter(|e| filter.status.is_none() || Some(e.status) == filter.status)
            .filter(|e| {
                filter.agent_id.is_none()
                    || tables
                        .actions
                        .get(&e.action_id)
                        .and_then(|a| a.agent_id.as_deref())
                        == filter.agent_id.as_deref()
            })
            .cloned()
            .collect())
    }
}

/// Controllable clock for deterministic tests: starts at a fixed instant
/// and only moves when `advance`/`set` is called.
pub struct TestClock {
    now: RwLock<DateTime<Utc>>,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(start) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.write();
        *now = *now + delta;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// `Notifier` that records every event it receives, for assertions in tests.
#[derive(Default)]
pub struct RecordingNotifier {
    events: RwLock<Vec<NotifierEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotifierEvent> {
        self.events.read().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifierEvent) -> Result<()> {
        self.events.write().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_domain::action::{Action, TraceStep};
    use gov_domain::args::ArgValue;
    use gov_domain::{Decision, Outcome};
    use chrono::Duration;

    fn action(id: &str, agent: &str, at: DateTime<Utc>) -> Action {
        Action {
            id: id.to_string(),
            timestamp: at,
            agent_id: Some(agent.to_string()),
            session_id: None,
            user_id: None,
            tool: "noop".to_string(),
            args: ArgValue::Null,
            flattened_args: String::new(),
            decision: Decision::Allow,
            risk_score: 0,
            matched_policy_ids: vec![],
            chain_pattern: None,
            execution_trace: vec![TraceStep::new(1, "kill_switch", Outcome::Pass, 0, vec![], "ok", 0)],
            trace_id: None,
            span_id: None,
            conversation_id: None,
            fee_charged: None,
        }
    }

    #[tokio::test]
    async fn query_actions_returns_oldest_first_within_window_limit() {
        let store = MemStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .append_action(action(&format!("a{i}"), "agent-1", base + Duration::seconds(i)))
                .await
                .unwrap();
        }
        let got = store
            .query_actions("agent-1", None, base, 3)
            .await
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].id, "a2");
        assert_eq!(got[2].id, "a4");
    }

    #[tokio::test]
    async fn query_actions_filters_by_session() {
        let store = MemStore::new();
        let base = Utc::now();
        let mut a = action("a0", "agent-1", base);
        a.session_id = Some("s1".to_string());
        store.append_action(a).await.unwrap();
        let mut b = action("a1", "agent-1", base);
        b.session_id = Some("s2".to_string());
        store.append_action(b).await.unwrap();

        let got = store.query_actions("agent-1", Some("s1"), base, 10).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].id, "a0");
    }

    #[test]
    fn test_clock_only_moves_on_command() {
        let clock = TestClock::new(Utc::now());
        let first = clock.now();
        let second = clock.now();
        assert_eq!(first, second);
        clock.advance(Duration::seconds(5));
        assert!(clock.now() > first);
    }
}
