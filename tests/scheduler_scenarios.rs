// tests/scheduler_scenarios.rs

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::sync::{Barrier, Notify};

use rundag::dag::{DependencyModel, RunError, Scheduler, UnitResult};
use rundag::exec::{SharedUnit, Unit, UnitFuture};
use rundag_test_utils::fake_unit::{Event, FakeUnit, Recorder};
use rundag_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Copy -> Default -> {Move, Azure, Travis}
fn migration_model() -> DependencyModel {
    DependencyModel::new()
        .with("default-branch", ["copy-branch"])
        .with("move-prs", ["default-branch"])
        .with("azure-pipelines", ["default-branch"])
        .with("travis-ci", ["default-branch"])
}

fn migration_units(recorder: &Recorder, barrier: Arc<Barrier>) -> Vec<SharedUnit<()>> {
    vec![
        FakeUnit::new("Move", "move-prs", recorder)
            .barrier(barrier.clone())
            .shared(),
        FakeUnit::new("Travis", "travis-ci", recorder)
            .barrier(barrier.clone())
            .shared(),
        FakeUnit::new("Default", "default-branch", recorder)
            .delay_ms(10)
            .shared(),
        FakeUnit::new("Azure", "azure-pipelines", recorder)
            .barrier(barrier)
            .shared(),
        FakeUnit::new("Copy", "copy-branch", recorder)
            .delay_ms(10)
            .shared(),
    ]
}

#[tokio::test]
async fn migration_plugins_run_in_dependency_order() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let units = migration_units(&recorder, Arc::new(Barrier::new(3)));
    let scheduler = Scheduler::new(migration_model());

    let outcome = with_timeout(scheduler.run(&units, Arc::new(()))).await?;

    assert!(outcome.is_success());
    assert_eq!(outcome.len(), 5);

    // Copy runs alone first, then Default, then the three leaves together.
    assert_eq!(recorder.started()[0], "Copy");
    assert!(recorder.started_after_finished("Default", "Copy"));
    for leaf in ["Move", "Azure", "Travis"] {
        assert!(recorder.started_after_finished(leaf, "Default"), "{leaf} started too early");
    }
    // The leaves only get past their barrier if all three run concurrently.
    assert_eq!(recorder.max_concurrency(), 3);

    Ok(())
}

#[tokio::test]
async fn two_unit_cycle_deadlocks_without_running_anything() {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("a", ["b"]).with("b", ["a"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &recorder).shared(),
        FakeUnit::new("B", "b", &recorder).shared(),
    ];

    let result = with_timeout(Scheduler::new(model).run(&units, Arc::new(()))).await;

    match result {
        Err(err @ RunError::Deadlock { .. }) => {
            let mut stuck = err.unresolved_units();
            stuck.sort();
            assert_eq!(stuck, vec!["A", "B"]);
            let msg = err.to_string();
            assert!(msg.contains("could not be completed"));
            assert!(msg.contains("A (waiting on b)"));
        }
        other => panic!("expected deadlock, got {other:?}"),
    }
    assert!(recorder.started().is_empty());
}

#[tokio::test]
async fn cycle_reports_its_dependents_too() {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new()
        .with("a", ["b"])
        .with("b", ["a"])
        .with("c", ["a"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &recorder).shared(),
        FakeUnit::new("B", "b", &recorder).shared(),
        FakeUnit::new("C", "c", &recorder).shared(),
        FakeUnit::new("D", "d", &recorder).shared(),
    ];

    let err = with_timeout(Scheduler::new(model).run(&units, Arc::new(())))
        .await
        .expect_err("cycle must deadlock");

    let mut stuck = err.unresolved_units();
    stuck.sort();
    assert_eq!(stuck, vec!["A", "B", "C"]);
    assert_eq!(recorder.started(), vec!["D".to_string()]);
}

#[tokio::test]
async fn missing_capability_deadlocks_only_its_branch() {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new()
        .with("lonely", ["ghost"])
        .with("child", ["lonely"])
        .with("free-dep", ["free"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("Lonely", "lonely", &recorder).shared(),
        FakeUnit::new("Child", "child", &recorder).shared(),
        FakeUnit::new("Free", "free", &recorder).shared(),
        FakeUnit::new("FreeDep", "free-dep", &recorder).shared(),
    ];

    let err = with_timeout(Scheduler::new(model).run(&units, Arc::new(())))
        .await
        .expect_err("unknown capability must deadlock");

    let RunError::Deadlock { unresolved, partial } = err else {
        panic!("expected deadlock");
    };

    let names: Vec<&str> = unresolved.iter().map(|u| u.unit.as_str()).collect();
    assert_eq!(names, vec!["Lonely", "Child"]);
    assert_eq!(unresolved[0].missing, vec!["ghost".to_string()]);
    assert_eq!(unresolved[1].missing, vec!["lonely".to_string()]);

    let mut done = partial.succeeded();
    done.sort();
    assert_eq!(done, vec!["Free", "FreeDep"]);
    assert!(!recorder.was_started("Lonely"));
    assert!(!recorder.was_started("Child"));
}

#[tokio::test]
async fn failed_unit_still_unblocks_dependents() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("b", ["a"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &recorder).failing("boom").shared(),
        FakeUnit::new("B", "b", &recorder).shared(),
    ];

    let outcome = with_timeout(Scheduler::new(model).run(&units, Arc::new(()))).await?;

    assert!(!outcome.is_success());
    assert!(recorder.started_after_finished("B", "A"));
    assert!(matches!(outcome.result_of("B"), Some(UnitResult::Succeeded)));

    let failures = outcome.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].unit, "A");
    assert!(failures[0].cause.to_string().contains("boom"));
    Ok(())
}

#[tokio::test]
async fn every_failure_is_collected() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("c", ["a", "b"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &recorder).failing("a broke").shared(),
        FakeUnit::new("B", "b", &recorder).failing("b broke").shared(),
        FakeUnit::new("C", "c", &recorder).failing("c broke").shared(),
    ];

    let outcome = with_timeout(Scheduler::new(model).run(&units, Arc::new(()))).await?;

    let mut failed: Vec<String> = outcome.failures().into_iter().map(|f| f.unit).collect();
    failed.sort();
    assert_eq!(failed, vec!["A", "B", "C"]);
    assert!(outcome.succeeded().is_empty());
    Ok(())
}

#[tokio::test]
async fn panicking_unit_is_recorded_as_failure() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("after", ["bomb"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("Bomb", "bomb", &recorder).panicking().shared(),
        FakeUnit::new("After", "after", &recorder).shared(),
    ];

    let outcome = with_timeout(Scheduler::new(model).run(&units, Arc::new(()))).await?;

    let failures = outcome.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].unit, "Bomb");
    assert!(failures[0].cause.to_string().contains("panicked"));
    assert!(failures[0].cause.to_string().contains("Bomb exploded"));
    assert!(matches!(outcome.result_of("After"), Some(UnitResult::Succeeded)));
    Ok(())
}

#[tokio::test]
async fn empty_unit_set_trivially_succeeds() -> TestResult {
    let units: Vec<SharedUnit<()>> = Vec::new();
    let outcome = Scheduler::default().run(&units, Arc::new(())).await?;

    assert!(outcome.is_empty());
    assert!(outcome.is_success());
    Ok(())
}

#[tokio::test]
async fn units_without_dependencies_start_together() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let barrier = Arc::new(Barrier::new(3));
    let units: Vec<SharedUnit<()>> = ["X", "Y", "Z"]
        .iter()
        .map(|name| {
            FakeUnit::new(name, &name.to_lowercase(), &recorder)
                .barrier(barrier.clone())
                .shared()
        })
        .collect();

    let outcome = with_timeout(Scheduler::default().run(&units, Arc::new(()))).await?;

    assert!(outcome.is_success());
    assert_eq!(recorder.max_concurrency(), 3);
    Ok(())
}

#[tokio::test]
async fn one_completed_provider_satisfies_a_dependency() -> TestResult {
    init_tracing();

    // SlowDb only finishes once App has started, so App must not wait for
    // every "db" provider.
    let recorder = Recorder::new();
    let app_started = Arc::new(Notify::new());
    let model = DependencyModel::new().with("app", ["db"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("SlowDb", "db", &recorder)
            .wait_for(app_started.clone())
            .shared(),
        FakeUnit::new("FastDb", "db", &recorder).shared(),
        FakeUnit::new("App", "app", &recorder)
            .notify_on_start(app_started)
            .shared(),
    ];

    let outcome = with_timeout(Scheduler::new(model).run(&units, Arc::new(()))).await?;

    assert!(outcome.is_success());
    assert!(recorder.started_after_finished("App", "FastDb"));
    let app_started_at = recorder.index_of(&Event::Started("App".into()));
    let slow_finished_at = recorder.index_of(&Event::Finished("SlowDb".into()));
    assert!(app_started_at < slow_finished_at);
    Ok(())
}

#[tokio::test]
async fn extra_provided_capabilities_satisfy_dependents() -> TestResult {
    init_tracing();

    let recorder = Recorder::new();
    let model = DependencyModel::new().with("badge", ["ci"]);
    let units: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("Travis", "travis-ci", &recorder)
            .also_provides("ci")
            .shared(),
        FakeUnit::new("Badge", "badge", &recorder).shared(),
    ];

    let outcome = with_timeout(Scheduler::new(model).run(&units, Arc::new(()))).await?;

    assert!(outcome.is_success());
    assert!(recorder.started_after_finished("Badge", "Travis"));
    Ok(())
}

/// Records the address of every context it is handed.
struct ContextProbe {
    name: String,
    seen: Arc<Mutex<Vec<usize>>>,
}

impl Unit<String> for ContextProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "probe"
    }

    fn execute(&self, context: Arc<String>) -> UnitFuture<'_> {
        Box::pin(async move {
            assert_eq!(context.as_str(), "acme/api");
            self.seen
                .lock()
                .unwrap()
                .push(Arc::as_ptr(&context) as usize);
            Ok(())
        })
    }
}

#[tokio::test]
async fn context_is_shared_unchanged_with_every_unit() -> TestResult {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let units: Vec<SharedUnit<String>> = (0..4)
        .map(|i| {
            Arc::new(ContextProbe {
                name: format!("probe-{i}"),
                seen: seen.clone(),
            }) as SharedUnit<String>
        })
        .collect();

    let context = Arc::new("acme/api".to_string());
    let outcome = Scheduler::default().run(&units, context.clone()).await?;

    assert!(outcome.is_success());
    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|p| *p == Arc::as_ptr(&context) as usize));
    Ok(())
}

#[tokio::test]
async fn repeated_runs_produce_the_same_partition() -> TestResult {
    init_tracing();

    let model = DependencyModel::new()
        .with("b", ["a"])
        .with("c", ["b"])
        .with("d", ["a"]);
    let scheduler = Scheduler::new(model);

    let mut partitions = Vec::new();
    for _ in 0..2 {
        let recorder = Recorder::new();
        let units: Vec<SharedUnit<()>> = vec![
            FakeUnit::new("A", "a", &recorder).shared(),
            FakeUnit::new("B", "b", &recorder).failing("nope").shared(),
            FakeUnit::new("C", "c", &recorder).delay_ms(5).shared(),
            FakeUnit::new("D", "d", &recorder).delay_ms(1).shared(),
        ];
        let outcome = with_timeout(scheduler.run(&units, Arc::new(()))).await?;

        let mut ok: Vec<String> = outcome.succeeded().iter().map(|s| s.to_string()).collect();
        ok.sort();
        let mut failed: Vec<String> = outcome.failures().into_iter().map(|f| f.unit).collect();
        failed.sort();
        partitions.push((ok, failed));
    }

    assert_eq!(partitions[0], partitions[1]);
    assert_eq!(partitions[0].1, vec!["B".to_string()]);
    Ok(())
}

#[tokio::test]
async fn one_scheduler_drives_concurrent_runs_independently() -> TestResult {
    init_tracing();

    let scheduler = Scheduler::new(DependencyModel::new().with("b", ["a"]));
    let first = Recorder::new();
    let second = Recorder::new();
    let units_a: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &first).delay_ms(5).shared(),
        FakeUnit::new("B", "b", &first).shared(),
    ];
    let units_b: Vec<SharedUnit<()>> = vec![
        FakeUnit::new("A", "a", &second).shared(),
        FakeUnit::new("B", "b", &second).failing("second run only").shared(),
    ];

    let (a, b) = with_timeout(async {
        tokio::join!(
            scheduler.run(&units_a, Arc::new(())),
            scheduler.run(&units_b, Arc::new(()))
        )
    })
    .await;

    assert!(a?.is_success());
    assert_eq!(b?.failures().len(), 1);
    assert!(first.started_after_finished("B", "A"));
    assert!(second.started_after_finished("B", "A"));
    Ok(())
}
