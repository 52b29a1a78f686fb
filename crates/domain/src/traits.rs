use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::action::Action;
use crate::error::Result;
use crate::escalation::{EscalationEvent, EscalationFilter};
use crate::governor::GovernorFlag;
use crate::policy::{Policy, PolicyVersion};
use crate::receipt::Receipt;
use crate::verification::VerificationLog;
use crate::wallet::Wallet;

/// Pre-validated caller identity. Authentication (password hashing, token
/// issuance, role-guard middleware) happens entirely outside the engine;
/// by the time a `Principal` reaches a method here, it is trusted.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub actor_id: Option<String>,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn system() -> Self {
        Self {
            actor_id: Some("system".to_string()),
            roles: vec!["system".to_string()],
        }
    }
}

/// Source of time, injected so that TTL caches, session windows, and
/// chain-analysis deadlines are deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation of `Clock`, used in production wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Typed persistence boundary. A single-node store is assumed (per the
/// spec's non-goals); horizontal scaling is the caller's concern. Every
/// method that can fail does so with `Error::PersistenceFailed` or a more
/// specific variant — callers decide retry policy.
#[async_trait]
pub trait Store: Send + Sync {
    async fn append_action(&self, action: Action) -> Result<()>;
    async fn get_action(&self, id: &str) -> Result<Option<Action>>;
    /// Indexed query backing session-history reconstruction and
    /// escalation thresholds: actions for `agent_id` (optionally scoped
    /// to `session_id`), newest N within the trailing window, returned
    /// **oldest-first**.
    async fn query_actions(
        &self,
        agent_id: &str,
        session_id: Option<&str>,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Action>>;

    async fn list_policies(&self) -> Result<Vec<Policy>>;
    async fn get_policy(&self, id: &str) -> Result<Option<Policy>>;
    async fn put_policy(&self, policy: Policy) -> Result<()>;
    async fn delete_policy(&self, id: &str) -> Result<()>;
    async fn append_policy_version(&self, version: PolicyVersion) -> Result<()>;
    async fn list_policy_versions(&self, id: &str) -> Result<Vec<PolicyVersion>>;

    async fn get_governor_flag(&self, key: &str) -> Result<Option<GovernorFlag>>;
    async fn put_governor_flag(&self, flag: GovernorFlag) -> Result<()>;

    async fn append_verification_log(&self, log: VerificationLog) -> Result<()>;
    async fn get_verification_log_for_action(&self, action_id: &str) -> Result<Option<VerificationLog>>;

    async fn append_receipt(&self, receipt: Receipt) -> Result<()>;
    async fn next_receipt_id(&self) -> Result<u64>;

    async fn get_wallet(&self, owner_id: &str) -> Result<Option<Wallet>>;
    async fn put_wallet(&self, wallet: Wallet) -> Result<()>;

    async fn put_escalation(&self, event: EscalationEvent) -> Result<()>;
    async fn get_escalation(&self, id: &str) -> Result<Option<EscalationEvent>>;
    async fn list_escalations(&self, filter: EscalationFilter) -> Result<Vec<EscalationEvent>>;
}

/// Abstract sink for human-facing notifications (email, chat, issue
/// tracker, generic webhook). Failures are logged by the caller and never
/// block persistence — the trait itself returns `Result` so an
/// implementation *can* report failure, but `gov-escalation` treats any
/// `Err` as best-effort and swallows it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifierEvent) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct NotifierEvent {
    pub escalation_id: String,
    pub kind: NotifierEventKind,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierEventKind {
    Created,
    Resolved,
}

/// A `Notifier` that does nothing; the default when no transport is wired
/// up (e.g. in tests or the CLI demo).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _event: NotifierEvent) -> Result<()> {
        Ok(())
    }
}
