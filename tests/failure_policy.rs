// tests/failure_policy.rs

use std::error::Error;
use std::sync::Arc;

use rundag::dag::{DependencyModel, RunError, Scheduler, UnitResult};
use rundag::exec::SharedUnit;
use rundag::types::FailurePolicy;
use rundag_test_utils::builders::{ConfigFileBuilder, UnitConfigBuilder};
use rundag_test_utils::fake_unit::{FakeUnit, Recorder};
use rundag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn blocking(model: DependencyModel) -> Scheduler {
    Scheduler::new(model).with_failure_policy(FailurePolicy::Block)
}

#[test]
fn unblock_is_the_default_policy() {
    assert_eq!(Scheduler::default().failure_policy(), FailurePolicy::Unblock);
    assert_eq!("BLOCK".parse::<FailurePolicy>(), Ok(FailurePolicy::Block));
    assert!("sometimes".parse::<FailurePolicy>().is_err());
}

#[test]
fn scheduler_takes_policy_from_config() {
    let cfg = ConfigFileBuilder::new()
        .with_failure_policy(FailurePolicy::Block)
        .with_unit("a", UnitConfigBuilder::new("true").build())
        .with_unit("b", UnitConfigBuilder::new("true").after("a").build())
        .build();

    let scheduler = Scheduler::from_config(&cfg);
    assert_eq!(scheduler.failure_policy(), FailurePolicy::Block);
    assert!(scheduler.model().dependencies_of("b").contains("a"));
}

#[tokio::test]
async fn block_skips_dependents_of_failed_units_transitively() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("b", ["a"]).with("c", ["b"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &recorder).failing("no branch").shared(),
        FakeUnit::new("B", "b", &recorder).shared(),
        FakeUnit::new("C", "c", &recorder).shared(),
        FakeUnit::new("D", "d", &recorder).delay_ms(5).shared(),
    ];

    let outcome = with_timeout(blocking(model).run(&units, Arc::new(()))).await?;

    assert!(!outcome.is_success());
    assert_eq!(outcome.len(), 4);
    assert_eq!(outcome.skipped(), vec!["B", "C"]);
    assert_eq!(outcome.succeeded(), vec!["D"]);
    assert!(!recorder.was_started("B"));
    assert!(!recorder.was_started("C"));

    match outcome.result_of("C") {
        Some(UnitResult::Skipped { blocked_on }) => assert_eq!(blocked_on, &vec!["b".to_string()]),
        other => panic!("expected C to be skipped, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn block_still_runs_when_another_provider_succeeded() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("app", ["db"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("BrokenDb", "db", &recorder).failing("disk full").shared(),
        FakeUnit::new("GoodDb", "db", &recorder).delay_ms(10).shared(),
        FakeUnit::new("App", "app", &recorder).shared(),
    ];

    let outcome = with_timeout(blocking(model).run(&units, Arc::new(()))).await?;

    assert!(outcome.skipped().is_empty());
    assert!(matches!(outcome.result_of("App"), Some(UnitResult::Succeeded)));
    assert!(recorder.started_after_finished("App", "GoodDb"));
    Ok(())
}

#[tokio::test]
async fn block_does_not_hide_a_cycle() {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new()
        .with("b", ["a"])
        .with("c", ["d"])
        .with("d", ["c"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &recorder).failing("boom").shared(),
        FakeUnit::new("B", "b", &recorder).shared(),
        FakeUnit::new("C", "c", &recorder).shared(),
        FakeUnit::new("D", "d", &recorder).shared(),
    ];

    let err = with_timeout(blocking(model).run(&units, Arc::new(())))
        .await
        .expect_err("cycle must still deadlock");

    assert_eq!(err.unresolved_units(), vec!["C", "D"]);
    let partial = err.partial_outcome().expect("deadlock carries partial outcome");
    assert_eq!(partial.skipped(), vec!["B"]);
    assert_eq!(partial.failures().len(), 1);
}

#[tokio::test]
async fn block_does_not_hide_a_missing_capability() {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("b", ["ghost"]);
    let units: Vec<SharedUnit<()>> = vec![FakeUnit::new("B", "b", &recorder).shared()];

    let result = with_timeout(blocking(model).run(&units, Arc::new(()))).await;

    assert!(matches!(result, Err(RunError::Deadlock { .. })));
}
