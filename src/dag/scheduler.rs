// src/dag/scheduler.rs

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::model::ConfigFile;
use crate::dag::declarations::DependencyModel;
use crate::dag::outcome::{Outcome, RunError, UnitRecord, UnitResult};
use crate::dag::run_state::{RunState, UnitId, UnitMeta};
use crate::exec::SharedUnit;
use crate::types::FailurePolicy;

/// Monotonically increasing run ID, used only to correlate log lines.
static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Dependency-ordered concurrent executor.
///
/// The scheduler holds the static [`DependencyModel`]; every call to
/// [`run`](Scheduler::run) gets a fresh [`RunState`], so one scheduler can
/// drive any number of runs (sequentially or concurrently).
///
/// Each run:
/// - starts every unit whose declared capabilities are all provided by
///   completed units
/// - waits for the next unit to finish and marks it completed
/// - repeats until nothing is left, or fails with a deadlock when nothing
///   is ready and nothing is running
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    model: DependencyModel,
    policy: FailurePolicy,
}

impl Scheduler {
    pub fn new(model: DependencyModel) -> Self {
        Self {
            model,
            policy: FailurePolicy::default(),
        }
    }

    /// Construct a scheduler from a validated [`ConfigFile`].
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(DependencyModel::from_config(cfg)).with_failure_policy(cfg.config.failure_policy)
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn model(&self) -> &DependencyModel {
        &self.model
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run every unit to completion.
    ///
    /// Unit failures are collected in the returned [`Outcome`]; only a
    /// deadlock (or a task that cannot be awaited) is an `Err`.
    pub async fn run<C>(&self, units: &[SharedUnit<C>], context: Arc<C>) -> Result<Outcome, RunError>
    where
        C: Send + Sync + 'static,
    {
        self.run_until(units, context, std::future::pending::<()>())
            .await
    }

    /// Like [`run`](Scheduler::run), but aborts all in-flight units and
    /// returns [`RunError::Cancelled`] once `shutdown` resolves.
    pub async fn run_until<C, S>(
        &self,
        units: &[SharedUnit<C>],
        context: Arc<C>,
        shutdown: S,
    ) -> Result<Outcome, RunError>
    where
        C: Send + Sync + 'static,
        S: Future<Output = ()>,
    {
        let run_id = RUN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;

        if units.is_empty() {
            debug!(run_id, "no units to schedule; run trivially succeeds");
            return Ok(Outcome::default());
        }

        let metas = units
            .iter()
            .map(|u| UnitMeta::new(u.name(), u.kind(), u.provides(), &self.model))
            .collect();
        let mut run = ActiveRun::new(run_id, units, RunState::new(metas, self.policy));

        info!(
            run_id,
            units = units.len(),
            policy = ?self.policy,
            "scheduler: starting run"
        );

        tokio::pin!(shutdown);

        while !run.state.is_finished() {
            let started = run.start_ready(&context);
            debug_assert!(run.state.check_invariants());

            if started == 0 && run.state.is_stalled() {
                run.skip_blocked();

                if !run.state.outstanding().is_empty() {
                    let unresolved = run.state.unresolved();
                    let names: Vec<&str> = unresolved.iter().map(|u| u.unit.as_str()).collect();
                    error!(
                        run_id,
                        unresolved = ?names,
                        "dependency graph could not be completed; nothing is ready and nothing is running"
                    );
                    return Err(RunError::Deadlock {
                        unresolved,
                        partial: run.outcome(),
                    });
                }
                continue;
            }

            tokio::select! {
                joined = run.handles.join_next_with_id() => match joined {
                    Some(joined) => run.record(joined)?,
                    None => {
                        return Err(RunError::Join {
                            unit: "<none>".to_string(),
                            message: "units are in flight but no task handles remain".to_string(),
                        });
                    }
                },
                () = &mut shutdown => {
                    return Err(run.cancel().await);
                }
            }
        }

        // Every handle is drained by the loop above; this only guards the
        // invariant so no result can be lost.
        while let Some(joined) = run.handles.join_next_with_id().await {
            run.record(joined)?;
        }

        let outcome = run.outcome();
        info!(
            run_id,
            succeeded = outcome.succeeded().len(),
            failed = outcome.failures().len(),
            skipped = outcome.skipped().len(),
            "scheduler: run finished"
        );
        Ok(outcome)
    }
}

/// Bookkeeping for one run in progress.
struct ActiveRun<'u, C> {
    run_id: u64,
    units: &'u [SharedUnit<C>],
    state: RunState,
    results: BTreeMap<UnitId, UnitResult>,
    handles: JoinSet<anyhow::Result<()>>,
    task_ids: HashMap<TaskId, UnitId>,
}

impl<'u, C> ActiveRun<'u, C>
where
    C: Send + Sync + 'static,
{
    fn new(run_id: u64, units: &'u [SharedUnit<C>], state: RunState) -> Self {
        Self {
            run_id,
            units,
            state,
            results: BTreeMap::new(),
            handles: JoinSet::new(),
            task_ids: HashMap::new(),
        }
    }

    /// Readiness scan + start. Returns how many units were started.
    fn start_ready(&mut self, context: &Arc<C>) -> usize {
        let ready = self.state.scan_ready();

        for id in &ready {
            let unit = Arc::clone(&self.units[id.index()]);
            let meta = self.state.meta(*id);
            info!(
                run_id = self.run_id,
                unit = %meta.name,
                kind = %meta.kind,
                "starting unit"
            );

            let ctx = Arc::clone(context);
            let handle = self.handles.spawn(async move { unit.execute(ctx).await });
            self.task_ids.insert(handle.id(), *id);
        }

        ready.len()
    }

    /// Record a finished unit, whatever its result.
    fn record(
        &mut self,
        joined: Result<(TaskId, anyhow::Result<()>), JoinError>,
    ) -> Result<(), RunError> {
        let (task_id, result) = match joined {
            Ok(finished) => finished,
            Err(err) if err.is_panic() => {
                let task_id = err.id();
                let message = panic_message(err.into_panic());
                (task_id, Err(anyhow!("unit panicked: {message}")))
            }
            Err(err) => {
                let unit = self
                    .task_ids
                    .remove(&err.id())
                    .map(|id| self.state.meta(id).name.clone())
                    .unwrap_or_else(|| "<unknown>".to_string());
                return Err(RunError::Join {
                    unit,
                    message: err.to_string(),
                });
            }
        };

        let Some(id) = self.task_ids.remove(&task_id) else {
            return Err(RunError::Join {
                unit: "<unknown>".to_string(),
                message: format!("finished task {task_id} does not belong to this run"),
            });
        };

        self.state.mark_completed(id, result.is_ok());
        let meta = self.state.meta(id);

        let unit_result = match result {
            Ok(()) => {
                info!(run_id = self.run_id, unit = %meta.name, "unit completed");
                UnitResult::Succeeded
            }
            Err(cause) => {
                warn!(
                    run_id = self.run_id,
                    unit = %meta.name,
                    error = %format!("{cause:#}"),
                    unblocks_dependents = self.state.policy() == FailurePolicy::Unblock,
                    "unit failed"
                );
                UnitResult::Failed(Arc::new(cause))
            }
        };
        self.results.insert(id, unit_result);

        Ok(())
    }

    /// Record units left waiting only on failed prerequisites as skipped.
    fn skip_blocked(&mut self) {
        for (id, blocked_on) in self.state.skip_blocked() {
            warn!(
                run_id = self.run_id,
                unit = %self.state.meta(id).name,
                blocked_on = ?blocked_on,
                "skipping unit; prerequisites failed"
            );
            self.results.insert(id, UnitResult::Skipped { blocked_on });
        }
    }

    async fn cancel(mut self) -> RunError {
        let aborted: Vec<String> = self
            .state
            .in_flight()
            .iter()
            .map(|id| self.state.meta(*id).name.clone())
            .collect();
        let never_started: Vec<String> = self
            .state
            .outstanding()
            .iter()
            .map(|id| self.state.meta(*id).name.clone())
            .collect();

        warn!(
            run_id = self.run_id,
            aborted = ?aborted,
            never_started = ?never_started,
            "shutdown requested; aborting in-flight units"
        );

        self.handles.shutdown().await;

        RunError::Cancelled {
            aborted,
            never_started,
            partial: self.outcome(),
        }
    }

    fn outcome(&self) -> Outcome {
        let mut outcome = Outcome::default();
        for (id, result) in &self.results {
            let meta = self.state.meta(*id);
            outcome.insert(UnitRecord {
                id: *id,
                name: meta.name.clone(),
                kind: meta.kind.clone(),
                result: result.clone(),
            });
        }
        outcome
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
