//! End-to-end tests for the governed insertion pipeline.
//!
//! Each test builds an in-memory engine with a static flag provider so the
//! process environment never leaks into a decision.

use hakgal::audit::BYPASS_SOURCE;
use hakgal::config::EngineConfig;
use hakgal::engine::{FactStatus, GovernanceEngine};
use hakgal::error::HakError;
use hakgal::governance::{
    DecisionReason, GovernanceConfig, GovernanceContext, OverrideFlags, StaticConfigProvider,
};
use hakgal::statement::SchemaLimits;
use serde_json::json;

fn engine_with(config: EngineConfig) -> (GovernanceEngine, StaticConfigProvider) {
    let provider = StaticConfigProvider::new(GovernanceConfig::default());
    let engine = GovernanceEngine::new(config)
        .unwrap()
        .with_config_provider(Box::new(provider.clone()));
    (engine, provider)
}

fn test_engine() -> GovernanceEngine {
    engine_with(EngineConfig::default()).0
}

fn events(engine: &GovernanceEngine) -> Vec<String> {
    engine
        .store()
        .audit()
        .entries(1000)
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn insert_then_duplicate_returns_zero() {
    let mut engine = test_engine();
    let ctx = json!({"source": "user", "externally_legal": true});
    let facts = ["IsA(TestEntity, Entity)."];

    assert_eq!(engine.governed_add_facts_json(&facts, &ctx).unwrap(), 1);
    assert_eq!(engine.governed_add_facts_json(&facts, &ctx).unwrap(), 0);
    assert_eq!(engine.store().count().unwrap(), 1);
    // The duplicate leaves no audit entry.
    assert_eq!(events(&engine), vec!["add_fact"]);
}

#[test]
fn non_admin_delete_returns_zero() {
    let mut engine = test_engine();
    let n = engine
        .governed_add_facts_json(&["Delete(SomeFact)."], &json!({"source": "user"}))
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(engine.store().count().unwrap(), 0);
}

#[test]
fn delete_is_denied_for_every_non_admin_context() {
    let mut engine = test_engine();
    let contexts = [
        GovernanceContext::new("user"),
        GovernanceContext::new("trusted_system"),
        GovernanceContext::new("user").with_role("operator"),
        GovernanceContext::new("user").with_overrides(OverrideFlags::granted()),
        GovernanceContext::new("user").with_bulk(true),
        GovernanceContext::new("user")
            .with_role("user")
            .with_overrides(OverrideFlags::granted())
            .with_confidence(1.0),
    ];
    for ctx in &contexts {
        let report = engine
            .governed_add_facts_verbose(&["DeleteFact(IsA(A, B))."], ctx)
            .unwrap();
        assert_eq!(report.inserted, 0, "context {ctx:?}");
        assert!(matches!(report.outcomes[0].status, FactStatus::Denied { .. }));
    }

    let admin = GovernanceContext::new("user").with_role("admin");
    assert_eq!(
        engine
            .governed_add_facts_atomic(&["DeleteFact(IsA(A, B))."], &admin)
            .unwrap(),
        1
    );
}

#[test]
fn admin_bulk_delete_uses_admin_harm_ceiling() {
    let mut engine = test_engine();
    let admin = GovernanceContext::new("user").with_role("admin").with_bulk(true);
    let report = engine
        .governed_add_facts_verbose(&["Delete(OldFact)."], &admin)
        .unwrap();
    assert_eq!(report.inserted, 1);
    let metrics = report.outcomes[0].decision.metrics.as_ref().unwrap();
    assert!(metrics.harm_human_prob > 0.05);
    assert_eq!(metrics.risk_threshold, 0.20);
    assert_eq!(events(&engine), vec!["delete_fact"]);

    // The same bulk delete from a plain user exceeds the default ceiling.
    let user = GovernanceContext::new("user").with_bulk(true);
    let report = engine
        .governed_add_facts_verbose(&["Delete(OtherFact)."], &user)
        .unwrap();
    assert_eq!(
        report.denied_reasons().collect::<Vec<_>>(),
        vec![DecisionReason::RulesFailed]
    );
}

#[test]
fn missing_externally_legal_fails_closed() {
    let mut engine = test_engine();
    let report = engine
        .governed_add_facts_verbose(&["IsA(A, B)."], &GovernanceContext::default())
        .unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(
        report.denied_reasons().collect::<Vec<_>>(),
        vec![DecisionReason::RulesFailed]
    );
    let entries = engine.store().audit().entries(10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, "governance_denied");
    assert_eq!(entries[0].payload["reason"], "rules_failed");
}

#[test]
fn environment_bypass_is_audited() {
    let (mut engine, provider) = engine_with(EngineConfig::default());
    provider.set_bypass(true);

    let n = engine
        .governed_add_facts_atomic(&["Delete(Everything)."], &GovernanceContext::default())
        .unwrap();
    assert_eq!(n, 1);

    let fact = engine.store().get("Delete(Everything).").unwrap().unwrap();
    assert_eq!(fact.source.as_deref(), Some(BYPASS_SOURCE));

    let entries = engine.store().audit().entries(10).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, "bypass");
    assert_eq!(entries[0].payload["source"], BYPASS_SOURCE);
    assert_eq!(entries[0].payload["bypass"]["via"], "environment");

    // Flipping the flag back takes effect on the next call.
    provider.set_bypass(false);
    assert_eq!(
        engine
            .governed_add_facts_atomic(&["Delete(Other)."], &GovernanceContext::default())
            .unwrap(),
        0
    );
}

#[test]
fn context_bypass_is_audited_with_authorization() {
    let mut engine = test_engine();
    let ctx = GovernanceContext::new("operator").with_bypass("INC-7");
    assert_eq!(
        engine.governed_add_facts_atomic(&["OverrideLimit(Disk, 0)."], &ctx).unwrap(),
        1
    );
    let entries = engine.store().audit().entries(10).unwrap();
    assert_eq!(entries[0].event, "bypass");
    assert_eq!(entries[0].payload["source"], BYPASS_SOURCE);
    assert_eq!(entries[0].payload["bypass"]["authorization"], "INC-7");
}

#[test]
fn context_bypass_without_authorization_is_ignored() {
    let mut engine = test_engine();
    let ctx = json!({"source": "user", "bypass_governance": true, "bypass_authorization": ""});
    assert_eq!(
        engine.governed_add_facts_json(&["Delete(X)."], &ctx).unwrap(),
        0
    );
}

#[test]
fn storage_failure_rolls_back_whole_batch() {
    let mut engine = test_engine();
    let facts: Vec<String> = (0..6).map(|i| format!("Fact(c{i}).")).collect();
    engine
        .store()
        .connection()
        .execute_batch(
            "CREATE TRIGGER inject_failure BEFORE INSERT ON facts_extended
             WHEN NEW.statement = 'Fact(c3).'
             BEGIN SELECT RAISE(ABORT, 'injected'); END;",
        )
        .unwrap();

    let err = engine
        .governed_add_facts_atomic(&facts, &GovernanceContext::new("user"))
        .unwrap_err();
    assert!(matches!(err, HakError::Store(_)));
    assert_eq!(engine.store().count().unwrap(), 0);
    assert_eq!(events(&engine), vec!["batch_rolled_back"]);
    assert_eq!(engine.metrics().failed_transactions, 1);
    assert_eq!(engine.metrics().successful_commits, 0);
}

#[test]
fn audit_failure_does_not_block_commit() {
    let mut engine = test_engine();
    engine
        .store()
        .connection()
        .execute_batch("DROP TABLE audit_log")
        .unwrap();

    let report = engine
        .governed_add_facts_verbose(&["IsA(A, B).", "IsA(B, C)."], &GovernanceContext::new("user"))
        .unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.audit_failures, 2);
    assert_eq!(engine.store().count().unwrap(), 2);
    assert_eq!(engine.metrics().audit_failures, 2);
}

#[test]
fn duplicates_do_not_fail_the_batch() {
    let mut engine = test_engine();
    let ctx = GovernanceContext::new("user");
    engine.governed_add_facts_atomic(&["IsA(A, B)."], &ctx).unwrap();
    let report = engine
        .governed_add_facts_verbose(&["IsA(A, B).", "IsA(B, C).", "IsA(B,C)"], &ctx)
        .unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 2);
    assert_eq!(engine.store().count().unwrap(), 2);
}

#[test]
fn audit_entries_follow_input_order() {
    let mut engine = test_engine();
    let ctx = GovernanceContext::new("user").with_overrides(OverrideFlags::granted());
    engine
        .governed_add_facts_atomic(
            &["Uses(A, B).", "broken", "OverrideLimit(Q, 1).", "Delete(X)."],
            &ctx,
        )
        .unwrap();
    assert_eq!(
        events(&engine),
        vec!["add_fact", "governance_denied", "override_fact", "governance_denied"]
    );
    assert!(engine.store().audit().verify_chain().unwrap().is_intact());
}

#[test]
fn constitution_file_replaces_builtin() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("constitution.json");
    std::fs::write(
        &path,
        r#"{
            "version": "9.1",
            "rules": [
                {"rule_id": "DEFAULT_PASS", "conditions": {"type": "ALL", "clauses": [
                    {"metric": "Source", "operator": "EQUALS", "value": "trusted_system"}
                ]}},
                {"rule_id": "OVERRIDE_GATE", "conditions": {"type": "ANY", "clauses": [
                    {"metric": "Fact.ArgCount", "operator": "GREATER_THAN", "value": 2}
                ]}}
            ]
        }"#,
    )
    .unwrap();
    let config = EngineConfig {
        constitution_path: Some(path),
        ..Default::default()
    };
    let (mut engine, _) = engine_with(config);
    assert_eq!(engine.gate().constitution().version, "9.1");

    assert_eq!(
        engine.governed_add_facts_atomic(&["IsA(A, B)."], &GovernanceContext::new("user")).unwrap(),
        0
    );
    assert_eq!(
        engine
            .governed_add_facts_atomic(&["IsA(A, B)."], &GovernanceContext::new("trusted_system"))
            .unwrap(),
        1
    );
    assert_eq!(
        engine
            .governed_add_facts_atomic(&["Between(A, B, C)."], &GovernanceContext::new("user"))
            .unwrap(),
        1
    );

    let entries = engine.store().audit().entries(10).unwrap();
    let hash = engine.gate().constitution().policy_hash().to_string();
    assert!(entries.iter().all(|e| e.payload["policy_hash"] == hash.as_str()));
}

#[test]
fn configured_limits_deny_oversized_facts() {
    let config = EngineConfig {
        limits: SchemaLimits {
            max_arg_count: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let (mut engine, _) = engine_with(config);
    let report = engine
        .governed_add_facts_verbose(&["Between(A, B, C)."], &GovernanceContext::new("user"))
        .unwrap();
    assert_eq!(
        report.denied_reasons().collect::<Vec<_>>(),
        vec![DecisionReason::SchemaViolation]
    );
    let entries = engine.store().audit().entries(1).unwrap();
    assert!(
        entries[0].payload["detail"]
            .as_str()
            .unwrap()
            .contains("too many arguments")
    );
}

#[test]
fn stored_fact_carries_derived_columns() {
    let mut engine = test_engine();
    engine
        .governed_add_facts_atomic(
            &["  LocatedIn ( Berlin ,Germany ) "],
            &GovernanceContext::new("user").with_confidence(0.75),
        )
        .unwrap();
    let fact = engine.store().get("LocatedIn(Berlin, Germany).").unwrap().unwrap();
    assert_eq!(fact.predicate, "LocatedIn");
    assert_eq!(fact.arguments, vec!["Berlin", "Germany"]);
    assert_eq!(fact.domain, "spatial");
    assert_eq!(fact.source.as_deref(), Some("user"));
    assert!((fact.confidence - 0.75).abs() < 1e-9);
    assert!(!fact.created_at.is_empty());
}
