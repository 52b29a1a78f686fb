//! Policy Store (C2): dual-source, TTL-cached, regex-validated, versioned
//! registry of governance rules.

mod base;
mod matching;

pub use base::default_base_policies;
pub use matching::matches;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use gov_domain::error::{Error, Result};
use gov_domain::policy::{Origin, Policy, PolicyPatch, PolicySpec, PolicyVersion};
use gov_domain::trace::TraceEvent;
use gov_domain::traits::{Clock, Principal, Store};

/// Snapshot of the merged `base ∪ dynamic` policy list, cached for
/// `cache_ttl_secs`. Readers copy this `Arc` and never block on writers
/// beyond that.
#[derive(Clone)]
struct CacheEntry {
    snapshot: Arc<Vec<Policy>>,
    fetched_at: DateTime<Utc>,
}

pub struct PolicyStore {
    base: Vec<Policy>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    cache: RwLock<Option<CacheEntry>>,
    cache_ttl_secs: u64,
}

impl PolicyStore {
    pub fn new(
        base: Vec<Policy>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        cache_ttl_secs: u64,
    ) -> Result<Self> {
        for policy in &base {
            validate_regexes(policy.url_regex.as_deref(), policy.args_regex.as_deref())?;
        }
        Ok(Self {
            base,
            store,
            clock,
            cache: RwLock::new(None),
            cache_ttl_secs,
        })
    }

    /// Ordered merge: base entries in declared order, with any dynamic
    /// policy sharing an id overriding the base entry **in place**; any
    /// dynamic-only policies are appended afterward in their own order.
    async fn merged(&self) -> Result<Arc<Vec<Policy>>> {
        if self.cache_ttl_secs > 0 {
            if let Some(entry) = self.cache.read().clone() {
                let age = (self.clock.now() - entry.fetched_at).num_seconds();
                if age >= 0 && (age as u64) < self.cache_ttl_secs {
                    return Ok(entry.snapshot);
                }
            }
        }

        let dynamic = self.store.list_policies().await?;
        let mut merged: Vec<Policy> = Vec::with_capacity(self.base.len() + dynamic.len());
        let mut used_dynamic_ids = std::collections::HashSet::new();

        for base_policy in &self.base {
            if let Some(over) = dynamic.iter().find(|p| p.id == base_policy.id) {
                merged.push(over.clone());
                used_dynamic_ids.insert(over.id.clone());
            } else {
                merged.push(base_policy.clone());
            }
        }
        for d in &dynamic {
            if !used_dynamic_ids.contains(&d.id) {
                merged.push(d.clone());
            }
        }

        let snapshot = Arc::new(merged);
        *self.cache.write() = Some(CacheEntry {
            snapshot: snapshot.clone(),
            fetched_at: self.clock.now(),
        });
        Ok(snapshot)
    }

    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Policy>> {
        let merged = self.merged().await?;
        Ok(merged
            .iter()
            .filter(|p| !active_only || p.active)
            .cloned()
            .collect())
    }

    /// Like `list`, but on a live store error falls back to the last
    /// cached snapshot (even if past its TTL) instead of propagating,
    /// reporting whether the fallback kicked in. Used by the pipeline's
    /// policy layer, where serving a stale snapshot beats failing the
    /// whole evaluation because policy storage hiccuped.
    pub async fn list_degraded(&self, active_only: bool) -> Result<(Vec<Policy>, bool)> {
        match self.merged().await {
            Ok(snapshot) => Ok((filter_active(&snapshot, active_only), false)),
            Err(err) => match self.cache.read().clone() {
                Some(entry) => {
                    tracing::warn!(error = %err, "policy store unavailable, serving stale cached snapshot");
                    TraceEvent::PolicyStoreDegraded { reason: err.to_string() }.emit();
                    Ok((filter_active(&entry.snapshot, active_only), true))
                }
                None => Err(err),
            },
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Policy>> {
        let merged = self.merged().await?;
        Ok(merged.iter().find(|p| p.id == id).cloned())
    }

    fn is_base_id(&self, id: &str) -> bool {
        self.base.iter().any(|p| p.id == id)
    }

    pub async fn create(&self, spec: PolicySpec, actor: &Principal) -> Result<Policy> {
        if self.is_base_id(&spec.id) || self.store.get_policy(&spec.id).await?.is_some() {
            return Err(Error::Conflict(format!("policy id already exists: {}", spec.id)));
        }
        validate_regexes(spec.url_regex.as_deref(), spec.args_regex.as_deref())?;

        let policy = Policy {
            id: spec.id,
            description: spec.description,
            target_tool_pattern: spec.target_tool_pattern,
            severity: spec.severity,
            action: spec.action,
            url_regex: spec.url_regex,
            args_regex: spec.args_regex,
            active: spec.active,
            origin: Origin::Dynamic,
            version: 1,
        };

        self.store.put_policy(policy.clone()).await?;
        self.record_version(&policy, None, actor).await?;
        self.invalidate();
        Ok(policy)
    }

    pub async fn patch(&self, id: &str, patch: PolicyPatch, actor: &Principal) -> Result<Policy> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("policy {id}")))?;
        let before = serde_json::to_value(&existing).map_err(Error::Json)?;

        let mut next = existing.clone();
        if let Some(v) = patch.description {
            next.description = v;
        }
        if let Some(v) = patch.target_tool_pattern {
            next.target_tool_pattern = v;
        }
        if let Some(v) = patch.severity {
            next.severity = v;
        }
        if let Some(v) = patch.action {
            next.action = v;
        }
        if let Some(v) = patch.url_regex {
            next.url_regex = v;
        }
        if let Some(v) = patch.args_regex {
            next.args_regex = v;
        }
        if let Some(v) = patch.active {
            next.active = v;
        }
        next.version = existing.version + 1;
        next.origin = Origin::Dynamic;

        validate_regexes(next.url_regex.as_deref(), next.args_regex.as_deref())?;

        self.store.put_policy(next.clone()).await?;
        self.record_version(&next, Some(before), actor).await?;
        self.invalidate();
        Ok(next)
    }

    pub async fn toggle(&self, id: &str, actor: &Principal) -> Result<Policy> {
        let existing = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("policy {id}")))?;
        self.patch(
            id,
            PolicyPatch {
                active: Some(!existing.active),
                ..Default::default()
            },
            actor,
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        if self.is_base_id(id) {
            return Err(Error::Conflict(format!("cannot delete base policy {id}")));
        }
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("policy {id}")))?;
        self.store.delete_policy(id).await?;
        self.invalidate();
        Ok(())
    }

    pub async fn versions(&self, id: &str) -> Result<Vec<PolicyVersion>> {
        self.store.list_policy_versions(id).await
    }

    pub async fn restore(&self, id: &str, version: u32, actor: &Principal) -> Result<Policy> {
        let versions = self.versions(id).await?;
        let target = versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| Error::NotFound(format!("policy {id} version {version}")))?;
        let snapshot = target.snapshot.clone();

        let current = self
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("policy {id}")))?;
        let before = serde_json::to_value(&current).map_err(Error::Json)?;

        let mut restored = snapshot;
        restored.version = current.version + 1;
        self.store.put_policy(restored.clone()).await?;
        self.record_version(&restored, Some(before), actor).await?;
        self.invalidate();
        Ok(restored)
    }

    async fn record_version(
        &self,
        policy: &Policy,
        before: Option<serde_json::Value>,
        actor: &Principal,
    ) -> Result<()> {
        let after = serde_json::to_value(policy).map_err(Error::Json)?;
        let version = PolicyVersion {
            policy_id: policy.id.clone(),
            version: policy.version,
            snapshot: policy.clone(),
            before,
            after,
            actor_id: actor.actor_id.clone(),
            timestamp: self.clock.now(),
        };
        self.store.append_policy_version(version).await?;
        TraceEvent::PolicyChanged { policy_id: policy.id.clone(), version: policy.version, actor_id: actor.actor_id.clone() }.emit();
        Ok(())
    }
}

fn filter_active(snapshot: &[Policy], active_only: bool) -> Vec<Policy> {
    snapshot.iter().filter(|p| !active_only || p.active).cloned().collect()
}

/// Compile-check every regex field present; used at create/patch time and
/// again defensively at base-load time.
fn validate_regexes(url_regex: Option<&str>, args_regex: Option<&str>) -> Result<()> {
    if let Some(p) = url_regex {
        regex::Regex::new(p).map_err(|e| Error::InvalidPolicy(format!("invalid url_regex: {e}")))?;
    }
    if let Some(p) = args_regex {
        regex::Regex::new(p).map_err(|e| Error::InvalidPolicy(format!("invalid args_regex: {e}")))?;
    }
    Ok(())
}
