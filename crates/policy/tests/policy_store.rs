use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gov_domain::action::Action;
use gov_domain::escalation::{EscalationEvent, EscalationFilter};
use gov_domain::governor::GovernorFlag;
use gov_domain::policy::{PolicyPatch, PolicySpec, PolicyVersion};
use gov_domain::receipt::Receipt;
use gov_domain::traits::Store;
use gov_domain::verification::VerificationLog;
use gov_domain::wallet::Wallet;
use gov_domain::{Decision, Origin, Policy, Principal, Severity};
use gov_memstore::{MemStore, TestClock};
use gov_policy::PolicyStore;

/// Delegates every `Store` method to an inner `MemStore`, except
/// `list_policies`, which errors once `fail` is flipped on — used to
/// exercise `PolicyStore::list_degraded`'s stale-cache fallback without
/// a real backend to break.
struct FlakyStore {
    inner: MemStore,
    fail: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self { inner: MemStore::new(), fail: AtomicBool::new(false) }
    }

    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn append_action(&self, action: Action) -> gov_domain::error::Result<()> {
        self.inner.append_action(action).await
    }
    async fn get_action(&self, id: &str) -> gov_domain::error::Result<Option<Action>> {
        self.inner.get_action(id).await
    }
    async fn query_actions(&self, agent_id: &str, session_id: Option<&str>, since: DateTime<Utc>, limit: usize) -> gov_domain::error::Result<Vec<Action>> {
        self.inner.query_actions(agent_id, session_id, since, limit).await
    }
    async fn list_policies(&self) -> gov_domain::error::Result<Vec<Policy>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(gov_domain::error::Error::PersistenceFailed("store unreachable".to_string()));
        }
        self.inner.list_policies().await
    }
    async fn get_policy(&self, id: &str) -> gov_domain::error::Result<Option<Policy>> {
        self.inner.get_policy(id).await
    }
    async fn put_policy(&self, policy: Policy) -> gov_domain::error::Result<()> {
        self.inner.put_policy(policy).await
    }
    async fn delete_policy(&self, id: &str) -> gov_domain::error::Result<()> {
        self.inner.delete_policy(id).await
    }
    async fn append_policy_version(&self, version: PolicyVersion) -> gov_domain::error::Result<()> {
        self.inner.append_policy_version(version).await
    }
    async fn list_policy_versions(&self, id: &str) -> gov_domain::error::Result<Vec<PolicyVersion>> {
        self.inner.list_policy_versions(id).await
    }
    async fn get_governor_flag(&self, key: &str) -> gov_domain::error::Result<Option<GovernorFlag>> {
        self.inner.get_governor_flag(key).await
    }
    async fn put_governor_flag(&self, flag: GovernorFlag) -> gov_domain::error::Result<()> {
        self.inner.put_governor_flag(flag).await
    }
    async fn append_verification_log(&self, log: VerificationLog) -> gov_domain::error::Result<()> {
        self.inner.append_verification_log(log).await
    }
    async fn get_verification_log_for_action(&self, action_id: &str) -> gov_domain::error::Result<Option<VerificationLog>> {
        self.inner.get_verification_log_for_action(action_id).await
    }
    async fn append_receipt(&self, receipt: Receipt) -> gov_domain::error::Result<()> {
        self.inner.append_receipt(receipt).await
    }
    async fn next_receipt_id(&self) -> gov_domain::error::Result<u64> {
        self.inner.next_receipt_id().await
    }
    async fn get_wallet(&self, owner_id: &str) -> gov_domain::error::Result<Option<Wallet>> {
        self.inner.get_wallet(owner_id).await
    }
    async fn put_wallet(&self, wallet: Wallet) -> gov_domain::error::Result<()> {
        self.inner.put_wallet(wallet).await
    }
    async fn put_escalation(&self, event: EscalationEvent) -> gov_domain::error::Result<()> {
        self.inner.put_escalation(event).await
    }
    async fn get_escalation(&self, id: &str) -> gov_domain::error::Result<Option<EscalationEvent>> {
        self.inner.get_escalation(id).await
    }
    async fn list_escalations(&self, filter: EscalationFilter) -> gov_domain::error::Result<Vec<EscalationEvent>> {
        self.inner.list_escalations(filter).await
    }
}

fn base_policy() -> Policy {
    Policy {
        id: "base-block-rm".to_string(),
        description: "block recursive deletes".to_string(),
        target_tool_pattern: "shell_exec".to_string(),
        severity: Severity::Critical,
        action: Decision::Block,
        url_regex: None,
        args_regex: Some(r"rm\s+-rf".to_string()),
        active: true,
        origin: Origin::Base,
        version: 1,
    }
}

fn store(ttl: u64) -> (PolicyStore, Arc<MemStore>, Arc<TestClock>) {
    let mem = Arc::new(MemStore::new());
    let clock = Arc::new(TestClock::new(Utc::now()));
    let policy_store = PolicyStore::new(vec![base_policy()], mem.clone(), clock.clone(), ttl).unwrap();
    (policy_store, mem, clock)
}

#[tokio::test]
async fn lists_base_policy_by_default() {
    let (store, _mem, _clock) = store(0);
    let all = store.list(false).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "base-block-rm");
}

#[tokio::test]
async fn create_rejects_duplicate_of_base_id() {
    let (store, _mem, _clock) = store(0);
    let spec = PolicySpec {
        id: "base-block-rm".to_string(),
        description: "dup".to_string(),
        target_tool_pattern: "*".to_string(),
        severity: Severity::Low,
        action: Decision::Allow,
        url_regex: None,
        args_regex: None,
        active: true,
    };
    let err = store.create(spec, &Principal::system()).await.unwrap_err();
    assert!(matches!(err, gov_domain::Error::Conflict(_)));
}

#[tokio::test]
async fn create_rejects_invalid_regex() {
    let (store, _mem, _clock) = store(0);
    let spec = PolicySpec {
        id: "new-1".to_string(),
        description: "broken".to_string(),
        target_tool_pattern: "*".to_string(),
        severity: Severity::Low,
        action: Decision::Review,
        url_regex: Some("(unclosed".to_string()),
        args_regex: None,
        active: true,
    };
    let err = store.create(spec, &Principal::system()).await.unwrap_err();
    assert!(matches!(err, gov_domain::Error::InvalidPolicy(_)));
}

#[tokio::test]
async fn dynamic_policy_overrides_base_in_place() {
    let (store, _mem, _clock) = store(0);
    store
        .patch(
            "base-block-rm",
            PolicyPatch {
                severity: Some(Severity::High),
                ..Default::default()
            },
            &Principal::system(),
        )
        .await
        .unwrap();

    let all = store.list(false).await.unwrap();
    assert_eq!(all.len(), 1, "override replaces in place, doesn't append");
    assert_eq!(all[0].severity, Severity::High);
    assert_eq!(all[0].version, 2);
    assert_eq!(all[0].origin, Origin::Dynamic);
}

#[tokio::test]
async fn cannot_delete_a_base_policy() {
    let (store, _mem, _clock) = store(0);
    let err = store.delete("base-block-rm").await.unwrap_err();
    assert!(matches!(err, gov_domain::Error::Conflict(_)));
}

#[tokio::test]
async fn versioning_accumulates_and_restore_appends_not_mutates() {
    let (store, _mem, _clock) = store(0);
    let spec = PolicySpec {
        id: "new-2".to_string(),
        description: "v1".to_string(),
        target_tool_pattern: "http_request".to_string(),
        severity: Severity::Medium,
        action: Decision::Review,
        url_regex: None,
        args_regex: None,
        active: true,
    };
    store.create(spec, &Principal::system()).await.unwrap();
    store
        .patch(
            "new-2",
            PolicyPatch {
                description: Some("v2".to_string()),
                ..Default::default()
            },
            &Principal::system(),
        )
        .await
        .unwrap();

    let versions = store.versions("new-2").await.unwrap();
    assert_eq!(versions.len(), 2);

    let restored = store.restore("new-2", 1, &Principal::system()).await.unwrap();
    assert_eq!(restored.description, "v1");
    assert_eq!(restored.version, 3, "restore appends a new version, never rewrites history");

    let versions_after = store.versions("new-2").await.unwrap();
    assert_eq!(versions_after.len(), 3);
    assert_eq!(versions_after[0].snapshot.description, "v1", "original history entry untouched");
}

#[tokio::test]
async fn cache_is_served_until_ttl_elapses() {
    let (store, mem, clock) = store(10);
    let first = store.list(false).await.unwrap();
    assert_eq!(first.len(), 1);

    // Mutate the backing store directly, bypassing the cache-invalidating API.
    let mut extra = base_policy();
    extra.id = "direct-insert".to_string();
    extra.origin = Origin::Dynamic;
    gov_domain::traits::Store::put_policy(mem.as_ref(), extra).await.unwrap();

    let still_cached = store.list(false).await.unwrap();
    assert_eq!(still_cached.len(), 1, "within TTL, cached snapshot is served");

    clock.advance(Duration::seconds(11));
    let refreshed = store.list(false).await.unwrap();
    assert_eq!(refreshed.len(), 2, "after TTL elapses, store is re-queried");
}

#[tokio::test]
async fn toggle_flips_active_flag() {
    let (store, _mem, _clock) = store(0);
    let toggled = store.toggle("base-block-rm", &Principal::system()).await.unwrap();
    assert!(!toggled.active);
    let toggled_again = store.toggle("base-block-rm", &Principal::system()).await.unwrap();
    assert!(toggled_again.active);
}

#[tokio::test]
async fn list_degraded_serves_stale_cache_when_store_errors() {
    let flaky = Arc::new(FlakyStore::new());
    let clock = Arc::new(TestClock::new(Utc::now()));
    let policy_store = PolicyStore::new(vec![base_policy()], flaky.clone(), clock.clone(), 10).unwrap();

    let (first, degraded) = policy_store.list_degraded(false).await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(!degraded, "first call populates the cache from a healthy store");

    clock.advance(Duration::seconds(11));
    flaky.set_failing(true);

    let (fallback, degraded) = policy_store.list_degraded(false).await.unwrap();
    assert_eq!(fallback.len(), 1, "stale cache still served despite live error");
    assert!(degraded);
}

#[tokio::test]
async fn list_degraded_propagates_error_with_no_cache_to_fall_back_on() {
    let flaky = Arc::new(FlakyStore::new());
    let clock = Arc::new(TestClock::new(Utc::now()));
    flaky.set_failing(true);
    let policy_store = PolicyStore::new(vec![base_policy()], flaky, clock, 10).unwrap();

    let err = policy_store.list_degraded(false).await.unwrap_err();
    assert!(matches!(err, gov_domain::Error::PersistenceFailed(_)));
}
