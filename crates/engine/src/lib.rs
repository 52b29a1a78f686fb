//! Pipeline Orchestrator (C7) and the `Engine` facade gluing every other
//! component into the one stateful handle a caller constructs once and
//! clones freely. `Engine::evaluate` runs the six-layer sequence
//! described in the governance design: kill switch, injection firewall,
//! scope enforcement, policy engine, risk + chain analysis, and
//! finalize (persist / publish / fee / escalation). Each layer is a
//! private method returning a `TraceStep` plus an optional short-circuit
//! `Decision` — `evaluate` is the straight-line sequence that stops at
//! the first `Some`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use gov_domain::action::{Action, ActionDecision, Decision, Outcome, RequestContext, ToolRequest, TraceStep};
use gov_domain::args::ArgValue;
use gov_domain::config::{ConfigSeverity, EngineConfig};
use gov_domain::error::{Error, Result};
use gov_domain::escalation::{EscalationEvent, EscalationFilter};
use gov_domain::policy::{Policy, PolicyPatch, PolicySpec, PolicyVersion, Severity};
use gov_domain::trace::TraceEvent;
use gov_domain::traits::{Clock, Notifier, Principal, Store};
use gov_domain::verification::{ToolResult, VerificationLog};
use gov_domain::wallet::{Decimal3, Wallet};

use gov_audit::AuditLog;
use gov_chain::ChainAnalyzer;
use gov_escalation::EscalationEngine;
use gov_eventbus::{EventBus, GovEvent, Subscription};
use gov_killswitch::KillSwitch;
use gov_normalize::InjectionScanner;
use gov_policy::PolicyStore;
use gov_risk::RiskEstimator;
use gov_sessions::SessionWindow;
use gov_verify::VerificationEngine;
use gov_wallet::WalletLedger;

struct Inner {
    config: EngineConfig,

    // ── injected collaborators ──────────────────────────────────────
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,

    // ── pipeline components ─────────────────────────────────────────
    policy_store: PolicyStore,
    risk_estimator: RiskEstimator,
    session_window: SessionWindow,
    chain_analyzer: ChainAnalyzer,
    injection_scanner: InjectionScanner,
    kill_switch: KillSwitch,

    // ── post-decision components ────────────────────────────────────
    event_bus: EventBus,
    wallet_ledger: WalletLedger,
    escalation_engine: EscalationEngine,
    audit_log: AuditLog,
    verification_engine: VerificationEngine,
}

/// `Clone`-cheap handle over the whole governance engine. Every field
/// that needs to be shared across concurrent `evaluate` calls already
/// manages its own interior synchronization (`parking_lot`, `AtomicBool`,
/// `tokio::sync::broadcast`); cloning an `Engine` just bumps an `Arc`.
#[derive(Clone)]
pub struct Engine(Arc<Inner>);

fn decision_rank(d: Decision) -> u8 {
    match d {
        Decision::Allow => 0,
        Decision::Review => 1,
        Decision::Block => 2,
    }
}

/// Risk floor for a policy-engine block, keyed by the most severe
/// matching policy. The spec pins only a lower bound ("risk ≥ 85");
/// critical/high matches push higher so a block from a critical policy
/// always outranks one from a merely-high one in any downstream
/// severity-banded decision (e.g. escalation severity).
fn severity_risk_floor(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 100,
        Severity::High => 92,
        Severity::Medium => 88,
        Severity::Low => 85,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

struct PolicyLayerOutcome {
    step: TraceStep,
    matched_ids: Vec<String>,
    tentative: Decision,
    risk_floor: Option<u8>,
    degraded: bool,
}

struct RiskChainOutcome {
    step: TraceStep,
    risk: u8,
    chain_pattern: Option<String>,
    decision: Decision,
    degraded: bool,
}

impl Engine {
    /// Builds a new engine: validates `config`, seeds the policy store
    /// with `base_policies`, restores the kill switch from `store`, and
    /// wires every sub-component. `internal_domain_allowlist` is forwarded
    /// to the risk estimator's exfiltration-domain check.
    pub async fn new(
        config: EngineConfig,
        base_policies: Vec<Policy>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        internal_domain_allowlist: Vec<String>,
    ) -> Result<Self> {
        let issues = config.validate();
        let fatal: Vec<String> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .map(|e| e.to_string())
            .collect();
        if !fatal.is_empty() {
            return Err(Error::InvalidInput(fatal.join("; ")));
        }
        for warning in issues.iter().filter(|e| e.severity == ConfigSeverity::Warning) {
            tracing::warn!("{warning}");
        }

        let policy_store = PolicyStore::new(base_policies, store.clone(), clock.clone(), config.policy.cache_ttl_secs)?;

        let kill_switch = KillSwitch::default();
        kill_switch.load_from_store(&*store).await?;

        let escalation_config = gov_escalation::EscalationConfig {
            block_threshold: config.escalation.block_threshold as usize,
            window: config.escalation.window,
            risk_threshold: config.escalation.risk_threshold,
            expiry_secs: config.escalation.expiry_secs as i64,
        };

        let inner = Inner {
            risk_estimator: RiskEstimator::new(internal_domain_allowlist),
            session_window: SessionWindow::new(config.session.window_minutes, config.session.max_entries),
            chain_analyzer: ChainAnalyzer::new(),
            injection_scanner: InjectionScanner::new(),
            event_bus: EventBus::new(config.event_bus.subscriber_buffer_size),
            wallet_ledger: WalletLedger::new(config.fees.wallet_initial_balance),
            escalation_engine: EscalationEngine::new(escalation_config),
            audit_log: AuditLog::new(),
            verification_engine: VerificationEngine::new(config.verification.diff_size_limit_bytes, config.verification.drift_baseline_depth),
            config,
            store,
            clock,
            notifier,
            policy_store,
            kill_switch,
        };

        Ok(Engine(Arc::new(inner)))
    }

    // ── layer 1: kill switch ─────────────────────────────────────────

    fn layer1_kill(&self) -> (TraceStep, Option<Decision>) {
        let started = Instant::now();
        if self.0.kill_switch.is_engaged() {
            let step = TraceStep::new(1, "kill_switch", Outcome::Block, 100, vec![], "kill switch is engaged", elapsed_ms(started));
            (step, Some(Decision::Block))
        } else {
            let step = TraceStep::new(1, "kill_switch", Outcome::Pass, 0, vec![], "kill switch not engaged", elapsed_ms(started));
            (step, None)
        }
    }

    // ── layer 2: injection firewall ─────────────────────────────────

    fn layer2_injection(&self, flattened: &str) -> (TraceStep, Option<Decision>) {
        let started = Instant::now();
        let matched = self.0.injection_scanner.scan(flattened);
        if matched.is_empty() {
            let step = TraceStep::new(2, "injection_firewall", Outcome::Pass, 0, vec![], "no injection patterns matched", elapsed_ms(started));
            (step, None)
        } else {
            let detail = format!("matched {} injection pattern(s)", matched.len());
            let ids = matched.into_iter().map(str::to_string).collect();
            let step = TraceStep::new(2, "injection_firewall", Outcome::Block, 95, ids, detail, elapsed_ms(started));
            (step, Some(Decision::Block))
        }
    }

    // ── layer 3: scope enforcer ──────────────────────────────────────

    fn layer3_scope(&self, tool: &str, context: &RequestContext) -> (TraceStep, Option<Decision>) {
        let started = Instant::now();
        if !context.allowed_tools.is_empty() && !context.allowed_tools.iter().any(|t| t == tool) {
            let detail = format!("tool '{tool}' is not in the caller's allowed_tools scope");
            let step = TraceStep::new(3, "scope_enforcer", Outcome::Block, 90, vec![], detail, elapsed_ms(started));
            (step, Some(Decision::Block))
        } else {
            let step = TraceStep::new(3, "scope_enforcer", Outcome::Pass, 0, vec![], "scope check passed", elapsed_ms(started));
            (step, None)
        }
    }

    // ── layer 4: policy engine ───────────────────────────────────────

    async fn layer4_policy(&self, tool: &str, args: &ArgValue, flattened: &str) -> Result<PolicyLayerOutcome> {
        let started = Instant::now();
        let (policies, degraded) = self.0.policy_store.list_degraded(true).await?;
        let matched: Vec<&Policy> = policies.iter().filter(|p| gov_policy::matches(p, tool, args, flattened)).collect();
        let matched_ids: Vec<String> = matched.iter().map(|p| p.id.clone()).collect();
        let tentative = matched.iter().map(|p| p.action).max_by_key(|d| decision_rank(*d)).unwrap_or(Decision::Allow);

        let degraded_note = if degraded { " (degraded: served stale policy cache)" } else { "" };
        let (outcome, risk_floor) = if tentative == Decision::Block {
            let floor = matched
                .iter()
                .filter(|p| p.action == Decision::Block)
                .map(|p| severity_risk_floor(p.severity))
                .max()
                .unwrap_or(85);
            (Outcome::Block, Some(floor))
        } else {
            (Outcome::from(tentative), None)
        };

        let detail = format!("{} polic{} matched{degraded_note}", matched_ids.len(), if matched_ids.len() == 1 { "y" } else { "ies" });
        let risk_contribution = risk_floor.map(|f| f as i32).unwrap_or(0);
        let step = TraceStep::new(4, "policy_engine", outcome, risk_contribution, matched_ids.clone(), detail, elapsed_ms(started));

        Ok(PolicyLayerOutcome { step, matched_ids, tentative, risk_floor, degraded })
    }

    // ── layer 5: risk + chain ────────────────────────────────────────

    async fn layer5_risk_chain(
        &self,
        tool: &str,
        args: &ArgValue,
        flattened: &str,
        context: &RequestContext,
        tentative: Decision,
    ) -> Result<RiskChainOutcome> {
        let started = Instant::now();
        let breakdown = self.0.risk_estimator.estimate(tool, flattened, args);
        let base_risk = breakdown.total();

        let agent_id = context.agent_id.as_deref().unwrap_or("unknown");
        let history = self
            .0
            .session_window
            .reconstruct(&*self.0.store, &*self.0.clock, agent_id, context.session_id.as_deref())
            .await?;

        let now = self.0.clock.now();
        let chain_outcome = self.0.chain_analyzer.analyze(&history, tool, flattened, args, now, base_risk, tentative);
        if let Some(m) = &chain_outcome.matched {
            TraceEvent::ChainPatternMatched { pattern_id: m.pattern_id.to_string(), boost: m.boost, agent_id: agent_id.to_string() }.emit();
        }
        if chain_outcome.degraded {
            TraceEvent::ChainTimedOut { agent_id: agent_id.to_string(), patterns_evaluated: history.len() }.emit();
        }

        let decision = if tentative == Decision::Review {
            Decision::Review
        } else if chain_outcome.elevate_to_review {
            Decision::Review
        } else {
            tentative
        };

        let chain_pattern = chain_outcome.matched.map(|m| m.pattern_id.to_string());
        let matched_ids = chain_pattern.clone().into_iter().collect::<Vec<_>>();

        let mut detail = match &chain_outcome.matched {
            Some(m) => format!("base_risk={base_risk}, pattern={} (+{}), combined={}", m.pattern_id, m.boost, chain_outcome.combined_risk),
            None => format!("base_risk={base_risk}, no chain pattern matched, combined={}", chain_outcome.combined_risk),
        };
        if chain_outcome.degraded {
            detail.push_str(" (degraded: chain analysis soft cap exceeded)");
        }

        let risk_contribution = chain_outcome.combined_risk as i32 - base_risk as i32;
        let step = TraceStep::new(5, "risk_chain", Outcome::from(decision), risk_contribution, matched_ids, detail, elapsed_ms(started));

        Ok(RiskChainOutcome { step, risk: chain_outcome.combined_risk, chain_pattern, decision, degraded: chain_outcome.degraded })
    }

    // ── layer 6: finalize ────────────────────────────────────────────

    /// Persists the action, publishes its event, deducts the fee (if
    /// enabled), and runs the escalation check. This never adds its own
    /// `TraceStep` — the testable property that a kill-switch short
    /// circuit emits exactly one trace step only holds because finalize
    /// is a side effect, not a recorded pipeline layer.
    ///
    /// Persistence happens *before* the fee deduction, per the spec's
    /// explicit ordering: the action is the source of truth and is never
    /// rolled back, so a deduction that errors or reports insufficient
    /// funds only ever downgrades the response to `payment_required`/
    /// `degraded` — it can't make an already-persisted action disappear.
    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        tool: String,
        args: ArgValue,
        flattened: String,
        context: RequestContext,
        decision: Decision,
        risk: u8,
        matched_policy_ids: Vec<String>,
        chain_pattern: Option<String>,
        trace: Vec<TraceStep>,
        mut degraded: bool,
    ) -> Result<ActionDecision> {
        let now = self.0.clock.now();

        let action = Action {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            agent_id: context.agent_id.clone(),
            session_id: context.session_id.clone(),
            user_id: context.user_id.clone(),
            tool,
            args,
            flattened_args: flattened,
            decision,
            risk_score: risk,
            matched_policy_ids,
            chain_pattern,
            execution_trace: trace,
            trace_id: context.trace_id.clone(),
            span_id: context.span_id.clone(),
            conversation_id: context.conversation_id.clone(),
            fee_charged: None,
        };

        let fee_tier = WalletLedger::tier_label(risk);
        let fee_amount = gov_wallet::WalletLedger::tier_fee(risk).to_string();
        let (persisted, _receipt) = self.0.audit_log.record(&*self.0.store, action, fee_tier, &fee_amount).await?;

        let mut payment_required = false;
        if self.0.config.fees.enabled {
            if let Some(agent_id) = &context.agent_id {
                match self.0.wallet_ledger.deduct(&*self.0.store, &*self.0.clock, agent_id, risk).await {
                    Ok(outcome) if outcome.charged => {}
                    Ok(_) => {
                        payment_required = true;
                        degraded = true;
                    }
                    Err(err) => {
                        tracing::warn!(action_id = %persisted.id, error = %err, "wallet deduction failed after persisting action");
                        payment_required = true;
                        degraded = true;
                    }
                }
            }
        }

        self.0.event_bus.publish(GovEvent::ActionEvaluated {
            action_id: persisted.id.clone(),
            tool: persisted.tool.clone(),
            decision: persisted.decision,
            risk_score: persisted.risk_score,
            agent_id: persisted.agent_id.clone(),
            timestamp: persisted.timestamp,
        });
        TraceEvent::ActionEvaluated {
            action_id: persisted.id.clone(),
            tool: persisted.tool.clone(),
            decision: format!("{:?}", persisted.decision),
            risk_score: persisted.risk_score,
            duration_ms: persisted.execution_trace.iter().map(|s| s.duration_ms).sum(),
        }
        .emit();

        if let Err(err) = self
            .0
            .escalation_engine
            .on_action_persisted(&*self.0.store, &*self.0.clock, &self.0.kill_switch, &*self.0.notifier, &persisted)
            .await
        {
            tracing::warn!(action_id = %persisted.id, error = %err, "escalation threshold check failed after persisting action");
        }

        let explanation = build_explanation(&persisted, degraded, payment_required);

        Ok(ActionDecision {
            action_id: persisted.id.clone(),
            decision: persisted.decision,
            risk_score: persisted.risk_score,
            explanation,
            policy_ids: persisted.matched_policy_ids.clone(),
            chain_pattern: persisted.chain_pattern.clone(),
            modified_args: None,
            execution_trace: persisted.execution_trace.clone(),
            degraded,
            payment_required,
        })
    }

    /// Runs the six-layer pipeline for one proposed tool call.
    pub async fn evaluate(&self, req: ToolRequest) -> Result<ActionDecision> {
        let normalized = gov_normalize::normalize_request(&req.tool, &req.args);
        let tool = normalized.tool;
        let flattened = normalized.flattened;
        let context = req.context;
        let mut trace = Vec::with_capacity(5);

        let (step, short) = self.layer1_kill();
        trace.push(step);
        if let Some(decision) = short {
            return self.finalize(tool, req.args, flattened, context, decision, 100, vec![], None, trace, false).await;
        }

        let (step, short) = self.layer2_injection(&flattened);
        trace.push(step);
        if let Some(decision) = short {
            return self.finalize(tool, req.args, flattened, context, decision, 95, vec![], None, trace, false).await;
        }

        let (step, short) = self.layer3_scope(&tool, &context);
        trace.push(step);
        if let Some(decision) = short {
            return self.finalize(tool, req.args, flattened, context, decision, 90, vec![], None, trace, false).await;
        }

        let policy_outcome = self.layer4_policy(&tool, &req.args, &flattened).await?;
        trace.push(policy_outcome.step);
        if policy_outcome.tentative == Decision::Block {
            let risk = policy_outcome.risk_floor.unwrap_or(85);
            return self
                .finalize(tool, req.args, flattened, context, Decision::Block, risk, policy_outcome.matched_ids, None, trace, policy_outcome.degraded)
                .await;
        }

        let risk_outcome = self.layer5_risk_chain(&tool, &req.args, &flattened, &context, policy_outcome.tentative).await?;
        trace.push(risk_outcome.step);
        let degraded = policy_outcome.degraded || risk_outcome.degraded;

        self.finalize(
            tool,
            req.args,
            flattened,
            context,
            risk_outcome.decision,
            risk_outcome.risk,
            policy_outcome.matched_ids,
            risk_outcome.chain_pattern,
            trace,
            degraded,
        )
        .await
    }

    /// Like `evaluate`, but bounded by a caller-supplied deadline. On
    /// expiry the in-flight pipeline is abandoned (its trace, if any
    /// side effect already landed, is not retried) and the call returns
    /// `Error::Timeout`.
    pub async fn evaluate_with_deadline(&self, req: ToolRequest, deadline: Duration) -> Result<ActionDecision> {
        match tokio::time::timeout(deadline, self.evaluate(req)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!("evaluate exceeded deadline of {deadline:?}"))),
        }
    }

    // ── verification (C8) ───────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn verify(
        &self,
        action_id: &str,
        result: &ToolResult,
        diff: Option<&str>,
        context: &RequestContext,
    ) -> Result<VerificationLog> {
        let (policies, _degraded) = self.0.policy_store.list_degraded(true).await?;
        self.0
            .verification_engine
            .verify(&*self.0.store, &*self.0.clock, &self.0.escalation_engine, &*self.0.notifier, action_id, result, diff, context, &policies)
            .await
    }

    // ── policy store (C2) ────────────────────────────────────────────

    pub async fn policy_list(&self, active_only: bool) -> Result<Vec<Policy>> {
        self.0.policy_store.list(active_only).await
    }

    pub async fn policy_get(&self, id: &str) -> Result<Option<Policy>> {
        self.0.policy_store.get(id).await
    }

    pub async fn policy_create(&self, spec: PolicySpec, actor: &Principal) -> Result<Policy> {
        self.0.policy_store.create(spec, actor).await
    }

    pub async fn policy_patch(&self, id: &str, patch: PolicyPatch, actor: &Principal) -> Result<Policy> {
        self.0.policy_store.patch(id, patch, actor).await
    }

    pub async fn policy_toggle(&self, id: &str, actor: &Principal) -> Result<Policy> {
        self.0.policy_store.toggle(id, actor).await
    }

    pub async fn policy_delete(&self, id: &str) -> Result<()> {
        self.0.policy_store.delete(id).await
    }

    pub async fn policy_versions(&self, id: &str) -> Result<Vec<PolicyVersion>> {
        self.0.policy_store.versions(id).await
    }

    pub async fn policy_restore(&self, id: &str, version: u32, actor: &Principal) -> Result<Policy> {
        self.0.policy_store.restore(id, version, actor).await
    }

    // ── kill switch (C6) ─────────────────────────────────────────────

    pub async fn kill_engage(&self, actor: &Principal) -> Result<()> {
        self.0.kill_switch.engage(&*self.0.store, &*self.0.clock, actor).await
    }

    pub async fn kill_release(&self, actor: &Principal) -> Result<()> {
        self.0.kill_switch.release(&*self.0.store, &*self.0.clock, actor).await
    }

    pub fn kill_status(&self) -> bool {
        self.0.kill_switch.is_engaged()
    }

    // ── event bus (C10) ──────────────────────────────────────────────

    pub fn subscribe(&self) -> Subscription {
        self.0.event_bus.subscribe()
    }

    /// Starts the 15s (configurable) heartbeat task. Requires a running
    /// Tokio runtime; call once after constructing the engine inside an
    /// async context, not from `Engine::new` itself.
    pub fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        self.0.event_bus.spawn_heartbeat(self.0.config.event_bus.heartbeat_interval_secs)
    }

    // ── wallet (C12) ─────────────────────────────────────────────────

    pub async fn wallet_get(&self, owner_id: &str) -> Result<Wallet> {
        self.0.wallet_ledger.get_or_provision(&*self.0.store, &*self.0.clock, owner_id).await
    }

    pub async fn wallet_top_up(&self, owner_id: &str, amount: Decimal3) -> Result<Wallet> {
        self.0.wallet_ledger.top_up(&*self.0.store, &*self.0.clock, owner_id, amount).await
    }

    // ── escalation (C11) ─────────────────────────────────────────────

    pub async fn escalation_list(&self, filter: EscalationFilter) -> Result<Vec<EscalationEvent>> {
        self.0.escalation_engine.list(&*self.0.store, filter).await
    }

    pub async fn escalation_approve(&self, id: &str, actor: &Principal) -> Result<EscalationEvent> {
        self.0.escalation_engine.approve(&*self.0.store, &*self.0.clock, &*self.0.notifier, id, actor).await
    }

    pub async fn escalation_reject(&self, id: &str, actor: &Principal) -> Result<EscalationEvent> {
        self.0.escalation_engine.reject(&*self.0.store, &*self.0.clock, &*self.0.notifier, id, actor).await
    }

    pub async fn escalation_expire_stale(&self) -> Result<usize> {
        self.0.escalation_engine.expire_stale(&*self.0.store, &*self.0.clock).await
    }
}

fn build_explanation(action: &Action, degraded: bool, payment_required: bool) -> String {
    let mut parts = vec![format!("{:?} (risk={})", action.decision, action.risk_score)];
    if !action.matched_policy_ids.is_empty() {
        parts.push(format!("policies: {}", action.matched_policy_ids.join(", ")));
    }
    if let Some(pattern) = &action.chain_pattern {
        parts.push(format!("chain pattern: {pattern}"));
    }
    if degraded {
        parts.push("degraded: a dependency served a stale snapshot or skipped work under its soft cap".to_string());
    }
    if payment_required {
        parts.push("payment required: wallet balance insufficient for this call's fee tier".to_string());
    }
    parts.join("; ")
}
