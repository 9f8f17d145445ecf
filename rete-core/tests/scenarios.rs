//! End-to-end command-surface scenarios, one per concrete walkthrough in
//! the engine's design notes.

use std::sync::Arc;

use rete_core::action::{Action, FactTemplate, TemplateValue};
use rete_core::config::EngineOptions;
use rete_core::engine::{AssertOptions, Engine, ReturnFilter, RunOptions};
use rete_core::network::{AlphaTest, Network, NetworkBuilder};
use rete_core::predicate::Operator;
use rete_fact::{FactId, FactValue, Record};

fn overtime_network() -> Arc<Network> {
    let mut builder = NetworkBuilder::new();
    let alpha = builder.add_alpha(
        "Employee",
        vec![AlphaTest { field: "hours".into(), op: Operator::Gt, literal: FactValue::Int(40) }],
        vec![("id".into(), "E".into()), ("hours".into(), "H".into())],
    );
    builder.add_production(
        alpha,
        "overtime_rule",
        0,
        vec![Action::Emit {
            template: FactTemplate::new("Overtime")
                .with_field("employee_id", TemplateValue::Binding("E".into()))
                .with_field(
                    "hours",
                    TemplateValue::Calc {
                        function: "subtract".into(),
                        args: vec![TemplateValue::Binding("H".into()), TemplateValue::Literal(FactValue::Int(40))],
                    },
                ),
        }],
    );
    Arc::new(builder.build())
}

#[test]
fn scenario_1_threshold_rule() {
    let mut engine = Engine::new("acme", overtime_network(), EngineOptions::default());
    engine
        .assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &AssertOptions::default())
        .unwrap();

    let outputs = engine.run(&RunOptions { fire_limit: Some(10), ..Default::default() }).unwrap();
    assert_eq!(outputs.fired.len(), 1);
    assert_eq!(outputs.derived.len(), 1);
    assert_eq!(outputs.derived[0].record.fact_type(), "Overtime");
    assert_eq!(outputs.derived[0].record.field("employee_id"), Some(&FactValue::Str("e1".into())));
    assert_eq!(outputs.derived[0].record.field("hours"), Some(&FactValue::Decimal(5.0)));

    let second = engine.run(&RunOptions { fire_limit: Some(10), ..Default::default() }).unwrap();
    assert_eq!(second.fired.len(), 0);
}

#[test]
fn scenario_2_retract_cancels_activation() {
    let mut engine = Engine::new("acme", overtime_network(), EngineOptions::default());
    let batch_opts = AssertOptions { batch: true, ..Default::default() };
    engine
        .assert(vec![Record::new("e2", "Employee").with_field("hours", 50i64)], &batch_opts)
        .unwrap();
    assert_eq!(engine.agenda_size(), 1);

    engine.retract(&[FactId::new("e2")], &batch_opts).unwrap();
    assert_eq!(engine.agenda_size(), 0);

    let outputs = engine.run(&RunOptions::default()).unwrap();
    assert_eq!(outputs.fired.len(), 0);
    assert!(outputs.derived.is_empty());
}

#[test]
fn scenario_3_salience_ordering() {
    let mut builder = NetworkBuilder::new();
    let alpha = builder.add_alpha("Employee", vec![], vec![("id".into(), "E".into())]);
    builder.add_production(
        alpha,
        "p1_low_salience",
        10,
        vec![Action::Log { level: "info".into(), message: "p1".into() }],
    );
    builder.add_production(
        alpha,
        "p2_high_salience",
        20,
        vec![Action::Log { level: "info".into(), message: "p2".into() }],
    );
    let network = Arc::new(builder.build());

    let mut engine = Engine::new("acme", network, EngineOptions::default());
    engine.assert(vec![Record::new("e1", "Employee")], &AssertOptions::default()).unwrap();

    let outputs = engine.run(&RunOptions { fire_limit: Some(10), ..Default::default() }).unwrap();
    assert_eq!(outputs.fired.len(), 2);
    assert_eq!(outputs.fired[0].production_id, "p2_high_salience");
    assert_eq!(outputs.fired[1].production_id, "p1_low_salience");
}

#[test]
fn scenario_4_join_is_order_insensitive_and_produces_one_activation() {
    let mut builder = NetworkBuilder::new();
    let manager_alpha = builder.add_alpha("Employee", vec![], vec![("id".into(), "M".into())]);
    let employee_alpha = builder.add_alpha("Employee", vec![], vec![("manager_id".into(), "M".into()), ("id".into(), "E".into())]);
    let join = builder.add_beta(manager_alpha, employee_alpha, vec!["M".into()]);
    builder.add_production(join, "reports_to_manager", 0, vec![Action::Log { level: "info".into(), message: "match".into() }]);
    let network = Arc::new(builder.build());

    let mut engine = Engine::new("acme", network, EngineOptions::default());
    let opts = AssertOptions::default();
    engine.assert(vec![Record::new("m1", "Employee")], &opts).unwrap();
    engine.assert(vec![Record::new("e1", "Employee").with_field("manager_id", "m1")], &opts).unwrap();

    assert_eq!(engine.agenda_size(), 1);
}

#[test]
fn scenario_5_refraction_across_emission_cycles() {
    let mut builder = NetworkBuilder::new();
    let employee_alpha = builder.add_alpha(
        "Employee",
        vec![AlphaTest { field: "hours".into(), op: Operator::Gt, literal: FactValue::Int(40) }],
        vec![("id".into(), "E".into()), ("hours".into(), "H".into())],
    );
    builder.add_production(
        employee_alpha,
        "overtime_rule",
        0,
        vec![Action::Emit {
            template: FactTemplate::new("Overtime")
                .with_field("employee_id", TemplateValue::Binding("E".into()))
                .with_field(
                    "hours",
                    TemplateValue::Calc {
                        function: "subtract".into(),
                        args: vec![TemplateValue::Binding("H".into()), TemplateValue::Literal(FactValue::Int(40))],
                    },
                ),
        }],
    );
    let overtime_alpha = builder.add_alpha("Overtime", vec![], vec![("employee_id".into(), "E".into())]);
    builder.add_production(
        overtime_alpha,
        "notified_rule",
        0,
        vec![Action::Emit {
            template: FactTemplate::new("Notified").with_field("employee_id", TemplateValue::Binding("E".into())),
        }],
    );
    let network = Arc::new(builder.build());

    let mut engine = Engine::new("acme", network, EngineOptions::default());
    engine
        .assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &AssertOptions::default())
        .unwrap();

    let outputs = engine.run(&RunOptions { fire_limit: Some(10), ..Default::default() }).unwrap();
    assert_eq!(outputs.fired.len(), 2);
    assert_eq!(outputs.fired[0].production_id, "overtime_rule");
    assert_eq!(outputs.fired[1].production_id, "notified_rule");

    let second = engine.run(&RunOptions { fire_limit: Some(10), ..Default::default() }).unwrap();
    assert_eq!(second.fired.len(), 0);
}

#[test]
fn scenario_6_memory_eviction_under_load() {
    use rete_core::memory_manager::EvictionPolicy;

    let options = EngineOptions::new().with_memory_limit(2_000, 10, EvictionPolicy::Lru);
    let mut engine = Engine::new("acme", overtime_network(), options);

    for i in 0..100 {
        let _ = engine.assert(
            vec![Record::new(format!("e{i}"), "Employee").with_field("hours", 10i64).with_field("name", "synthetic employee record")],
            &AssertOptions::default(),
        );
    }

    assert!(engine.working_memory_len() < 100);
}

#[test]
fn duplicate_assertion_is_rejected_not_overwritten() {
    let mut engine = Engine::new("acme", overtime_network(), EngineOptions::default());
    let opts = AssertOptions::default();
    engine.assert(vec![Record::new("e1", "Employee").with_field("hours", 10i64)], &opts).unwrap();
    let err = engine.assert(vec![Record::new("e1", "Employee").with_field("hours", 99i64)], &opts).unwrap_err();
    assert!(matches!(err, rete_core::error::EngineError::InvalidFact(_)));
}

#[test]
fn modify_of_unknown_id_behaves_as_a_plain_assert() {
    let mut engine = Engine::new("acme", overtime_network(), EngineOptions::default());
    let outputs = engine
        .modify(vec![Record::new("e9", "Employee").with_field("hours", 50i64)], &AssertOptions::default())
        .unwrap();
    assert!(outputs.retracted.is_empty());
    assert_eq!(engine.agenda_size(), 1);
}

#[test]
fn return_filter_summary_only_drops_fact_payloads_but_keeps_counts() {
    let mut engine = Engine::new("acme", overtime_network(), EngineOptions::default());
    let opts = AssertOptions { batch: false, return_filter: ReturnFilter::SummaryOnly, ..Default::default() };
    let outputs = engine.assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &opts).unwrap();
    assert!(outputs.asserted.is_empty());
    assert!(outputs.derived.is_empty());
    assert_eq!(outputs.fired.len(), 1);
}

#[test]
fn reset_empties_working_memory_agenda_and_refraction_but_keeps_network() {
    let network = overtime_network();
    let mut engine = Engine::new("acme", network.clone(), EngineOptions::default());
    engine.assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &AssertOptions::default()).unwrap();
    engine.run(&RunOptions::default()).unwrap();

    engine.reset();

    assert!(engine.is_working_memory_empty());
    assert!(engine.is_agenda_empty());
    assert_eq!(engine.network_version(), network.version());

    engine.assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &AssertOptions::default()).unwrap();
    let outputs = engine.run(&RunOptions::default()).unwrap();
    assert_eq!(outputs.fired.len(), 1, "refraction store must have been cleared by reset");
}

#[test]
fn snapshot_and_restore_reproduce_the_same_fire_sequence() {
    let network = overtime_network();
    let mut original = Engine::new("acme", network.clone(), EngineOptions::default());
    original
        .assert(vec![Record::new("e1", "Employee").with_field("hours", 45i64)], &AssertOptions::default())
        .unwrap();
    let snapshot = original.snapshot();

    let mut restored = Engine::new("acme", network, EngineOptions::default());
    restored.restore(&snapshot).unwrap();

    let original_outputs = original.run(&RunOptions::default()).unwrap();
    let restored_outputs = restored.run(&RunOptions::default()).unwrap();

    assert_eq!(original_outputs.fired.len(), restored_outputs.fired.len());
    assert_eq!(original_outputs.derived.len(), restored_outputs.derived.len());
    assert_eq!(
        original_outputs.derived[0].record.field("hours"),
        restored_outputs.derived[0].record.field("hours")
    );
}
