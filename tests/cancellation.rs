// tests/cancellation.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, oneshot};

use rundag::dag::{DependencyModel, RunError, Scheduler};
use rundag::exec::SharedUnit;
use rundag_test_utils::fake_unit::{FakeUnit, Recorder};
use rundag_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn shutdown_aborts_in_flight_units_and_reports_the_rest() {
    init_tracing();

    let recorder = Recorder::new();
    let started = Arc::new(Notify::new());
    let model = DependencyModel::new().with("after", ["slow"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("Quick", "quick", &recorder).shared(),
        FakeUnit::new("Slow", "slow", &recorder)
            .notify_on_start(started.clone())
            .hanging()
            .shared(),
        FakeUnit::new("After", "after", &recorder).shared(),
    ];

    let (tx, rx) = oneshot::channel::<()>();
    let shutdown = async move {
        let _ = rx.await;
    };

    let scheduler = Scheduler::new(model);
    let run = scheduler.run_until(&units, Arc::new(()), shutdown);
    let trigger = async move {
        started.notified().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = tx.send(());
    };

    let (result, ()) = with_timeout(async { tokio::join!(run, trigger) }).await;

    match result {
        Err(RunError::Cancelled {
            aborted,
            never_started,
            partial,
        }) => {
            assert_eq!(aborted, vec!["Slow"]);
            assert_eq!(never_started, vec!["After"]);
            assert_eq!(partial.succeeded(), vec!["Quick"]);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert!(!recorder.was_started("After"));
}

#[tokio::test]
async fn run_without_shutdown_signal_completes_normally() {
    init_tracing();

    let recorder = Recorder::new();
    let units: Vec<SharedUnit<()>> = vec![FakeUnit::new("Only", "only", &recorder).shared()];

    let outcome = with_timeout(Scheduler::default().run_until(
        &units,
        Arc::new(()),
        std::future::pending::<()>(),
    ))
    .await
    .expect("run succeeds");

    assert!(outcome.is_success());
}
