//! Escalation Engine (C11): per-agent threshold monitoring over the
//! trailing window of persisted actions, the human-review queue, and
//! notifier dispatch on creation/resolution.

use chrono::{DateTime, Utc};

use gov_domain::action::Action;
use gov_domain::error::Result;
use gov_domain::escalation::{EscalationEvent, EscalationFilter, EscalationStatus};
use gov_domain::policy::Severity;
use gov_domain::trace::TraceEvent;
use gov_domain::traits::{Clock, Notifier, NotifierEvent, NotifierEventKind, Principal, Store};
use gov_domain::Decision;
use gov_killswitch::KillSwitch;

#[derive(Debug, Clone, Copy)]
pub struct EscalationConfig {
    pub block_threshold: usize,
    pub window: usize,
    pub risk_threshold: u8,
    pub expiry_secs: i64,
}

pub struct EscalationEngine {
    config: EscalationConfig,
}

fn severity_from_risk(risk: u8) -> Severity {
    match risk {
        0..=39 => Severity::Low,
        40..=69 => Severity::Medium,
        70..=89 => Severity::High,
        _ => Severity::Critical,
    }
}

impl EscalationEngine {
    pub fn new(config: EscalationConfig) -> Self {
        Self { config }
    }

    /// Runs the per-agent threshold checks over the trailing window and,
    /// if the current action's decision warrants it, opens a pending
    /// `EscalationEvent`. Call this *after* `action` has been persisted —
    /// the window query must observe it.
    pub async fn on_action_persisted(
        &self,
        store: &dyn Store,
        clock: &dyn Clock,
        kill_switch: &KillSwitch,
        notifier: &dyn Notifier,
        action: &Action,
    ) -> Result<Option<EscalationEvent>> {
        let agent_id = action.agent_id.as_deref().unwrap_or("unknown");
        // Threshold checks scan by count, not wall-clock recency, so the
        // window start is pushed arbitrarily far back.
        let since = clock.now() - chrono::Duration::days(3650);
        let recent = store.query_actions(agent_id, None, since, self.config.window).await?;

        let block_count = recent.iter().filter(|a| a.decision == Decision::Block).count();
        let avg_risk = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|a| a.risk_score as f64).sum::<f64>() / recent.len() as f64
        };

        let mut forced_critical = false;
        if block_count >= self.config.block_threshold {
            kill_switch.engage(store, clock, &Principal::system()).await?;
            forced_critical = true;
        } else if avg_risk >= self.config.risk_threshold as f64 {
            kill_switch.engage(store, clock, &Principal::system()).await?;
        }

        if !matches!(action.decision, Decision::Block | Decision::Review) {
            return Ok(None);
        }

        let severity = if forced_critical { Severity::Critical } else { severity_from_risk(action.risk_score) };
        let event = self.create_pending(store, clock, notifier, &action.id, severity).await?;
        Ok(Some(event))
    }

    /// Opens a pending escalation directly from a verification-engine
    /// `violation` verdict, bypassing the threshold scan above (a
    /// violation is already a standalone trigger, not a trend). Severity
    /// is derived from the aggregated risk delta using the same banding
    /// as action risk scores.
    pub async fn create_for_verification(
        &self,
        store: &dyn Store,
        clock: &dyn Clock,
        notifier: &dyn Notifier,
        action_id: &str,
        aggregated_risk_delta: i32,
    ) -> Result<EscalationEvent> {
        let severity = severity_from_risk(aggregated_risk_delta.clamp(0, 100) as u8);
        self.create_pending(store, clock, notifier, action_id, severity).await
    }

    async fn create_pending(
        &self,
        store: &dyn Store,
        clock: &dyn Clock,
        notifier: &dyn Notifier,
        action_id: &str,
        severity: Severity,
    ) -> Result<EscalationEvent> {
        let event = EscalationEvent {
            id: uuid::Uuid::new_v4().to_string(),
            action_id: action_id.to_string(),
            severity,
            status: EscalationStatus::Pending,
            created_at: clock.now(),
            updated_at: clock.now(),
            resolved_by: None,
        };
        store.put_escalation(event.clone()).await?;
        TraceEvent::EscalationCreated {
            escalation_id: event.id.clone(),
            action_id: action_id.to_string(),
            severity: format!("{severity:?}"),
        }
        .emit();

        let _ = notifier
            .notify(NotifierEvent {
                escalation_id: event.id.clone(),
                kind: NotifierEventKind::Created,
                summary: format!("action {} escalated ({:?})", action_id, severity),
            })
            .await;

        Ok(event)
    }

    pub async fn approve(&self, store: &dyn Store, clock: &dyn Clock, notifier: &dyn Notifier, id: &str, actor: &Principal) -> Result<EscalationEvent> {
        self.resolve(store, clock, notifier, id, actor, EscalationStatus::Approved).await
    }

    pub async fn reject(&self, store: &dyn Store, clock: &dyn Clock, notifier: &dyn Notifier, id: &str, actor: &Principal) -> Result<EscalationEvent> {
        self.resolve(store, clock, notifier, id, actor, EscalationStatus::Rejected).await
    }

    async fn resolve(
        &self,
        store: &dyn Store,
        clock: &dyn Clock,
        notifier: &dyn Notifier,
        id: &str,
        actor: &Principal,
        status: EscalationStatus,
    ) -> Result<EscalationEvent> {
        let mut event = store
            .get_escalation(id)
            .await?
            .ok_or_else(|| gov_domain::error::Error::NotFound(format!("escalation {id}")))?;
        event.status = status;
        event.updated_at = clock.now();
        event.resolved_by = actor.actor_id.clone();
        store.put_escalation(event.clone()).await?;

        let _ = notifier
            .notify(NotifierEvent {
                escalation_id: event.id.clone(),
                kind: NotifierEventKind::Resolved,
                summary: format!("escalation {id} resolved as {status:?}"),
            })
            .await;
        Ok(event)
    }

    /// Expires any still-`Pending` event whose age exceeds the configured
    /// timeout. Returns how many were expired.
    pub async fn expire_stale(&self, store: &dyn Store, clock: &dyn Clock) -> Result<usize> {
        let pending = store
            .list_escalations(EscalationFilter { status: Some(EscalationStatus::Pending), agent_id: None })
            .await?;
        let now = clock.now();
        let mut expired = 0;
        for mut event in pending {
            if (now - event.created_at).num_seconds() >= self.config.expiry_secs {
                event.status = EscalationStatus::Expired;
                event.updated_at = now;
                store.put_escalation(event).await?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    pub async fn list(&self, store: &dyn Store, filter: EscalationFilter) -> Result<Vec<EscalationEvent>> {
        store.list_escalations(filter).await
    }
}
