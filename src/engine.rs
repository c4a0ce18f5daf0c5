//! Engine facade: the governed, atomic fact-insertion pipeline.
//!
//! [`GovernanceEngine`] owns the fact store, the governance gate and the
//! process-flag provider. One call to
//! [`GovernanceEngine::governed_add_facts_atomic`] is one state transition,
//! PENDING → COMMITTED or ROLLED_BACK:
//!
//! 1. the gate decides every fact, in input order
//! 2. allowed facts are staged inside one SQLite transaction
//! 3. the transaction commits; any non-duplicate storage error rolls it back
//!    and is returned
//! 4. audit entries are appended in input order, best-effort

use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::audit::{AuditAction, BYPASS_SOURCE};
use crate::config::EngineConfig;
use crate::error::HakResult;
use crate::governance::{
    BypassSource, ConfigProvider, Constitution, DecisionReason, EnvConfigProvider, GateDecision,
    GovernanceContext, GovernanceError, GovernanceGate, OperationKind,
};
use crate::store::{FactStore, NewFact, StageOutcome, StoreResult};

/// Smoothing factor of the latency moving average.
const LATENCY_EMA_ALPHA: f64 = 0.1;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one submitted fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FactStatus {
    Inserted { id: i64 },
    Duplicate,
    Denied { reason: DecisionReason },
}

#[derive(Debug, Clone, Serialize)]
pub struct FactOutcome {
    pub input: String,
    pub status: FactStatus,
    pub decision: GateDecision,
}

/// Per-fact diagnostics for one committed batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<FactOutcome>,
    pub inserted: usize,
    pub duplicates: usize,
    pub denied: usize,
    pub audit_failures: usize,
    pub elapsed_ms: f64,
}

impl BatchReport {
    pub fn denied_reasons(&self) -> impl Iterator<Item = DecisionReason> + '_ {
        self.outcomes.iter().filter_map(|o| match o.status {
            FactStatus::Denied { reason } => Some(reason),
            _ => None,
        })
    }
}

/// Counters over the lifetime of one engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineMetrics {
    pub total_requests: u64,
    pub successful_commits: u64,
    pub failed_transactions: u64,
    pub facts_inserted: u64,
    pub facts_denied: u64,
    pub duplicates: u64,
    pub audit_failures: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub slo_violations: u64,
    #[serde(skip)]
    latency_samples: u64,
}

impl EngineMetrics {
    fn observe_latency(&mut self, ms: f64) {
        self.avg_latency_ms = if self.latency_samples == 0 {
            ms
        } else {
            LATENCY_EMA_ALPHA * ms + (1.0 - LATENCY_EMA_ALPHA) * self.avg_latency_ms
        };
        self.latency_samples += 1;
        self.max_latency_ms = self.max_latency_ms.max(ms);
    }

    /// Share of requests that committed, in `[0, 1]`.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        self.successful_commits as f64 / self.total_requests as f64
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct GovernanceEngine {
    store: FactStore,
    gate: GovernanceGate,
    settings: Box<dyn ConfigProvider>,
    config: EngineConfig,
    metrics: EngineMetrics,
}

impl GovernanceEngine {
    /// Open the configured store and constitution. Process flags come from
    /// the environment.
    pub fn new(config: EngineConfig) -> HakResult<Self> {
        let store = match &config.db_path {
            Some(path) => FactStore::open(path)?,
            None => FactStore::open_in_memory()?,
        };
        let constitution = match &config.constitution_path {
            Some(path) => Constitution::load(path)?,
            None => Constitution::builtin(),
        };
        let gate = GovernanceGate::new(constitution).with_limits(config.limits.clone());

        tracing::info!(
            db = ?config.db_path,
            policy_version = %gate.constitution().version,
            policy_hash = %gate.constitution().policy_hash(),
            "governance engine ready"
        );

        Ok(Self::from_parts(
            store,
            gate,
            Box::new(EnvConfigProvider),
            config,
        ))
    }

    pub fn from_parts(
        store: FactStore,
        gate: GovernanceGate,
        settings: Box<dyn ConfigProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            gate,
            settings,
            config,
            metrics: EngineMetrics::default(),
        }
    }

    /// Replace the process-flag provider.
    pub fn with_config_provider(mut self, settings: Box<dyn ConfigProvider>) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &FactStore {
        &self.store
    }

    pub fn gate(&self) -> &GovernanceGate {
        &self.gate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Gate decision for one fact without touching the store or the audit log.
    pub fn explain(&self, fact: &str, ctx: &GovernanceContext) -> GateDecision {
        self.gate.decide(fact, ctx, &self.settings.current())
    }

    /// Govern and insert `facts` as one batch. Returns how many were inserted.
    ///
    /// Denied, unparseable and duplicate facts are skipped, not errors. A
    /// storage failure rolls back the whole batch and is returned.
    pub fn governed_add_facts_atomic<S: AsRef<str>>(
        &mut self,
        facts: &[S],
        ctx: &GovernanceContext,
    ) -> HakResult<usize> {
        self.governed_add_facts_verbose(facts, ctx)
            .map(|report| report.inserted)
    }

    /// [`Self::governed_add_facts_atomic`] with the context given as a JSON
    /// object.
    pub fn governed_add_facts_json<S: AsRef<str>>(
        &mut self,
        facts: &[S],
        context: &serde_json::Value,
    ) -> HakResult<usize> {
        let ctx = GovernanceContext::from_json(context).map_err(|e| {
            GovernanceError::InvalidContext {
                message: e.to_string(),
            }
        })?;
        self.governed_add_facts_atomic(facts, &ctx)
    }

    /// Like [`Self::governed_add_facts_atomic`], reporting every fact's outcome.
    pub fn governed_add_facts_verbose<S: AsRef<str>>(
        &mut self,
        facts: &[S],
        ctx: &GovernanceContext,
    ) -> HakResult<BatchReport> {
        let started = Instant::now();
        self.metrics.total_requests += 1;

        let settings = self.settings.current();
        let decisions: Vec<GateDecision> = facts
            .iter()
            .map(|fact| self.gate.decide(fact.as_ref(), ctx, &settings))
            .collect();

        for (fact, decision) in facts.iter().zip(&decisions) {
            tracing::debug!(
                fact = fact.as_ref(),
                allow = decision.allow,
                reason = %decision.reason,
                "governance decision"
            );
            if let Some(bypass) = &decision.bypass {
                let via = match bypass {
                    BypassSource::Environment => "GOVERNANCE_BYPASS",
                    BypassSource::Context { .. } => "context",
                };
                tracing::warn!(fact = fact.as_ref(), via, "governance bypass active");
            }
        }

        let source = ctx
            .source
            .clone()
            .unwrap_or_else(|| self.config.default_source.clone());
        let confidence = ctx.effective_confidence();

        let staged = match stage_and_commit(&mut self.store, &decisions, &source, confidence) {
            Ok(staged) => staged,
            Err(e) => {
                self.metrics.failed_transactions += 1;
                tracing::error!(error = %e, facts = facts.len(), "governed batch rolled back");
                let payload = json!({
                    "facts": facts.len(),
                    "source": source,
                    "error": e.to_string(),
                });
                if let Err(audit_err) = self
                    .store
                    .audit()
                    .record(AuditAction::BatchRolledBack, &payload)
                {
                    self.metrics.audit_failures += 1;
                    tracing::warn!(error = %audit_err, "failed to audit rollback");
                }
                self.finish_latency(started);
                return Err(e.into());
            }
        };

        let mut report = BatchReport::default();
        for ((fact, decision), staged) in facts.iter().zip(decisions).zip(staged) {
            let status = match staged {
                Some(StageOutcome::Staged(id)) => FactStatus::Inserted { id },
                Some(StageOutcome::Duplicate) => FactStatus::Duplicate,
                None => FactStatus::Denied {
                    reason: decision.reason,
                },
            };
            match status {
                FactStatus::Inserted { .. } => report.inserted += 1,
                FactStatus::Duplicate => report.duplicates += 1,
                FactStatus::Denied { .. } => report.denied += 1,
            }
            report.outcomes.push(FactOutcome {
                input: fact.as_ref().to_string(),
                status,
                decision,
            });
        }

        report.audit_failures = self.audit_batch(&report.outcomes, ctx, &source);

        self.metrics.successful_commits += 1;
        self.metrics.facts_inserted += report.inserted as u64;
        self.metrics.facts_denied += report.denied as u64;
        self.metrics.duplicates += report.duplicates as u64;
        self.metrics.audit_failures += report.audit_failures as u64;
        report.elapsed_ms = self.finish_latency(started);

        tracing::info!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            denied = report.denied,
            elapsed_ms = report.elapsed_ms,
            "governed batch committed"
        );
        Ok(report)
    }

    /// One entry per inserted or denied fact, in input order. Returns the
    /// number of entries that could not be written.
    fn audit_batch(&self, outcomes: &[FactOutcome], ctx: &GovernanceContext, source: &str) -> usize {
        let audit = self.store.audit();
        let mut failures = 0;
        for outcome in outcomes {
            let decision = &outcome.decision;
            let (action, payload) = match &outcome.status {
                FactStatus::Duplicate => continue,
                FactStatus::Inserted { id } => {
                    let kind = decision.classification.unwrap_or(OperationKind::Add);
                    let fact_source = if decision.is_bypass() { BYPASS_SOURCE } else { source };
                    let payload = json!({
                        "fact_id": id,
                        "statement": decision.canonical(),
                        "classification": kind,
                        "reason": decision.reason,
                        "source": fact_source,
                        "bypass": decision.bypass,
                        "user_role": ctx.user_role,
                        "policy_version": decision.policy_version,
                        "policy_hash": decision.policy_hash,
                    });
                    (AuditAction::for_commit(kind, decision.is_bypass()), payload)
                }
                FactStatus::Denied { reason } => {
                    let payload = json!({
                        "input": outcome.input,
                        "statement": decision.canonical(),
                        "classification": decision.classification,
                        "reason": reason,
                        "detail": decision.detail,
                        "source": source,
                        "user_role": ctx.user_role,
                        "policy_version": decision.policy_version,
                        "policy_hash": decision.policy_hash,
                    });
                    (AuditAction::GovernanceDenied, payload)
                }
            };
            if let Err(e) = audit.record(action, &payload) {
                failures += 1;
                tracing::warn!(error = %e, event = %action, "audit write failed; commit kept");
            }
        }
        failures
    }

    fn finish_latency(&mut self, started: Instant) -> f64 {
        let ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.observe_latency(ms);
        if ms > self.config.latency_budget_ms as f64 {
            self.metrics.slo_violations += 1;
            tracing::warn!(
                elapsed_ms = ms,
                budget_ms = self.config.latency_budget_ms,
                "governed call exceeded latency budget"
            );
        }
        ms
    }
}

impl std::fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceEngine")
            .field("store", &self.store)
            .field("gate", &self.gate)
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Stage every allowed fact in one transaction and commit it.
///
/// `None` marks a fact the gate denied. Skips the transaction entirely when
/// nothing was allowed.
fn stage_and_commit(
    store: &mut FactStore,
    decisions: &[GateDecision],
    source: &str,
    confidence: f64,
) -> StoreResult<Vec<Option<StageOutcome>>> {
    if !decisions.iter().any(|d| d.allow) {
        return Ok(vec![None; decisions.len()]);
    }

    let mut batch = store.begin_batch()?;
    let mut staged = Vec::with_capacity(decisions.len());
    for decision in decisions {
        let outcome = match (&decision.statement, decision.allow) {
            (Some(parsed), true) => {
                let fact_source = if decision.is_bypass() { BYPASS_SOURCE } else { source };
                let fact = NewFact::from_parsed(parsed)
                    .with_source(fact_source)
                    .with_confidence(confidence);
                Some(batch.stage_insert(&fact)?)
            }
            _ => None,
        };
        staged.push(outcome);
    }
    batch.commit()?;
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::{GovernanceConfig, StaticConfigProvider};

    fn engine() -> GovernanceEngine {
        GovernanceEngine::new(EngineConfig::default())
            .unwrap()
            .with_config_provider(Box::new(StaticConfigProvider::default()))
    }

    #[test]
    fn verbose_report_covers_every_fact() {
        let mut eng = engine();
        let ctx = GovernanceContext::new("user");
        let report = eng
            .governed_add_facts_verbose(
                &["IsA(A, B).", "IsA(A,B)", "garbage", "Delete(X)."],
                &ctx,
            )
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.denied, 2);
        let reasons: Vec<_> = report.denied_reasons().collect();
        assert_eq!(
            reasons,
            vec![
                DecisionReason::UnparseableStatement,
                DecisionReason::RoleInsufficient
            ]
        );
    }

    #[test]
    fn audit_has_one_entry_per_insert_or_denial() {
        let mut eng = engine();
        let ctx = GovernanceContext::new("user");
        eng.governed_add_facts_atomic(&["IsA(A, B).", "IsA(A, B).", "nope"], &ctx)
            .unwrap();
        let entries = eng.store().audit().entries(10).unwrap();
        let events: Vec<_> = entries.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(events, vec!["add_fact", "governance_denied"]);
        assert_eq!(entries[0].payload["source"], "user");
        assert_eq!(entries[1].payload["reason"], "unparseable_statement");
    }

    #[test]
    fn source_falls_back_to_default() {
        let mut eng = engine();
        let ctx = GovernanceContext {
            externally_legal: Some(true),
            ..Default::default()
        };
        eng.governed_add_facts_atomic(&["Uses(A, B)"], &ctx).unwrap();
        let fact = eng.store().get("Uses(A, B)").unwrap().unwrap();
        assert_eq!(fact.source.as_deref(), Some(crate::config::DEFAULT_SOURCE));
    }

    #[test]
    fn confidence_from_context_is_stored() {
        let mut eng = engine();
        let ctx = GovernanceContext::new("user").with_confidence(0.4);
        eng.governed_add_facts_atomic(&["Uses(A, B)"], &ctx).unwrap();
        let fact = eng.store().get("Uses(A, B)").unwrap().unwrap();
        assert!((fact.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn explain_is_a_dry_run() {
        let eng = engine();
        let d = eng.explain("IsA(A, B)", &GovernanceContext::new("user"));
        assert!(d.allow);
        assert_eq!(eng.store().count().unwrap(), 0);
        assert_eq!(eng.store().audit().count().unwrap(), 0);
    }

    #[test]
    fn json_context_entry_point() {
        let mut eng = engine();
        let n = eng
            .governed_add_facts_json(
                &["IsA(TestEntity, Entity)."],
                &json!({"source": "user", "externally_legal": true}),
            )
            .unwrap();
        assert_eq!(n, 1);
        let err = eng
            .governed_add_facts_json(&["IsA(A, B)"], &json!({"externally_legal": "yes"}))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::HakError::Governance(GovernanceError::InvalidContext { .. })
        ));
    }

    #[test]
    fn metrics_track_requests() {
        let mut eng = engine();
        let ctx = GovernanceContext::new("user");
        eng.governed_add_facts_atomic(&["IsA(A, B)", "Delete(X)"], &ctx)
            .unwrap();
        eng.governed_add_facts_atomic(&["IsA(A, B)"], &ctx).unwrap();
        let m = eng.metrics();
        assert_eq!(m.total_requests, 2);
        assert_eq!(m.successful_commits, 2);
        assert_eq!(m.facts_inserted, 1);
        assert_eq!(m.facts_denied, 1);
        assert_eq!(m.duplicates, 1);
        assert_eq!(m.failed_transactions, 0);
        assert!(m.max_latency_ms >= m.avg_latency_ms);
        assert_eq!(m.success_rate(), 1.0);
    }

    #[test]
    fn latency_ema() {
        let mut m = EngineMetrics::default();
        m.observe_latency(10.0);
        assert_eq!(m.avg_latency_ms, 10.0);
        m.observe_latency(20.0);
        assert!((m.avg_latency_ms - 11.0).abs() < 1e-9);
        assert_eq!(m.max_latency_ms, 20.0);
    }

    #[test]
    fn zero_budget_counts_slo_violations() {
        let mut eng = engine();
        eng.config.latency_budget_ms = 0;
        eng.governed_add_facts_atomic(&["IsA(A, B)"], &GovernanceContext::new("user"))
            .unwrap();
        assert_eq!(eng.metrics().slo_violations, 1);
    }

    #[test]
    fn provider_is_read_per_call() {
        let provider = StaticConfigProvider::new(GovernanceConfig::default());
        let mut eng = GovernanceEngine::new(EngineConfig::default())
            .unwrap()
            .with_config_provider(Box::new(provider.clone()));
        let ctx = GovernanceContext::default();
        assert_eq!(eng.governed_add_facts_atomic(&["IsA(A, B)"], &ctx).unwrap(), 0);
        provider.set_bypass(true);
        assert_eq!(eng.governed_add_facts_atomic(&["IsA(A, B)"], &ctx).unwrap(), 1);
    }
}
