// src/engine/runner.rs

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};

use crate::config::model::ConfigFile;
use crate::dag::{RunError, Scheduler, UnitResult};
use crate::engine::{RunSummary, Target, TargetReport, UnitContext};
use crate::exec::{CommandUnit, SharedUnit};
use crate::types::RunMode;

/// Applies one unit set to a sequence of targets.
///
/// Every target gets an independent scheduler run; a failure or deadlock on
/// one target is reported and the next target is still processed.
pub struct Runner {
    scheduler: Scheduler,
    units: Vec<SharedUnit<UnitContext>>,
    mode: RunMode,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.units.iter().map(|u| u.name()).collect();
        f.debug_struct("Runner")
            .field("scheduler", &self.scheduler)
            .field("units", &names)
            .field("mode", &self.mode)
            .finish()
    }
}

impl Runner {
    pub fn new(scheduler: Scheduler, units: Vec<SharedUnit<UnitContext>>, mode: RunMode) -> Self {
        Self {
            scheduler,
            units,
            mode,
        }
    }

    /// Command units and scheduler built from a validated config.
    pub fn from_config(cfg: &ConfigFile, mode: RunMode) -> Self {
        Self::new(
            Scheduler::from_config(cfg),
            CommandUnit::all_from_config(cfg),
            mode,
        )
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Run every unit against a single target.
    pub async fn run_target<S>(&self, target: Target, shutdown: S) -> TargetReport
    where
        S: Future<Output = ()>,
    {
        let name = target.name.clone();
        let span = info_span!("target", name = %name, mode = %self.mode);

        let ctx = Arc::new(UnitContext {
            target,
            mode: self.mode,
        });

        let result = async {
            info!("applying units to target");
            self.scheduler.run_until(&self.units, ctx, shutdown).await
        }
        .instrument(span)
        .await;

        let report = TargetReport {
            target: name,
            result,
        };
        log_report(&report);
        report
    }

    /// Run every target in order until done or until `shutdown` flips to
    /// `true`.
    pub async fn run_all(&self, targets: Vec<Target>, shutdown: watch::Receiver<bool>) -> RunSummary {
        let mut summary = RunSummary::default();

        for target in targets {
            if *shutdown.borrow() {
                warn!(target_name = %target.name, "shutdown requested; not starting target");
                summary.cancelled = true;
                break;
            }

            let report = self
                .run_target(target, shutdown_requested(shutdown.clone()))
                .await;
            let cancelled = matches!(report.result, Err(RunError::Cancelled { .. }));
            summary.reports.push(report);

            if cancelled {
                summary.cancelled = true;
                break;
            }
        }

        summary
    }
}

/// Resolves once the watch value becomes `true`; never resolves if the
/// sender goes away first.
async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let sender_gone = rx.wait_for(|requested| *requested).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

fn log_report(report: &TargetReport) {
    match &report.result {
        Ok(outcome) if outcome.is_success() => {
            info!(target_name = %report.target, units = outcome.len(), "all units succeeded");
        }
        Ok(outcome) => {
            error!(target_name = %report.target, "failed to apply changes to target");
            for failure in outcome.failures() {
                error!(
                    target_name = %report.target,
                    unit = %failure.unit,
                    kind = %failure.kind,
                    error = %format!("{:#}", failure.cause),
                    "unit failed"
                );
            }
            for record in outcome.records() {
                if let UnitResult::Skipped { blocked_on } = &record.result {
                    warn!(
                        target_name = %report.target,
                        unit = %record.name,
                        blocked_on = ?blocked_on,
                        "unit skipped"
                    );
                }
            }
        }
        Err(err) => {
            error!(target_name = %report.target, error = %err, "run aborted");
        }
    }
}
