// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod types;

use std::path::PathBuf;

use anyhow::{Result, bail};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_from_path;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::DagGraph;
use crate::engine::{Runner, TargetFilter};
use crate::errors::RundagError;
use crate::types::RunMode;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - target selection
/// - one scheduler run per target
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let mode = RunMode::from_apply_flag(args.apply);
    if mode.is_read_only() {
        warn!(
            "--apply not given; units run in read-only mode and should only report what they would change"
        );
    }

    let targets = TargetFilter::from_config(&cfg)?
        .only(args.targets.clone())
        .select(&cfg);
    if targets.is_empty() {
        warn!("no targets selected; nothing to do");
        return Ok(());
    }

    let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
    info!(targets = ?names, %mode, "processing targets");

    // Ctrl-C → abort in-flight units and stop processing targets.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("failed to listen for Ctrl+C: {e}");
            return;
        }
        let _ = shutdown_tx.send(true);
    });

    let runner = Runner::from_config(&cfg, mode);
    let summary = runner.run_all(targets, shutdown_rx).await;

    if summary.cancelled {
        bail!("run cancelled before all targets were processed");
    }

    let failed = summary.failed_targets();
    if !failed.is_empty() {
        bail!(
            "{} of {} targets failed: {}",
            failed.len(),
            summary.reports.len(),
            failed.join(", ")
        );
    }

    info!(targets = summary.reports.len(), "all targets succeeded");
    Ok(())
}

/// Load the config named on the command line and apply the flag
/// overrides, then validate once.
pub fn load_config(args: &CliArgs) -> crate::errors::Result<ConfigFile> {
    let mut raw = load_from_path(PathBuf::from(&args.config))?;
    apply_cli_overrides(&mut raw, args);
    ConfigFile::try_from(raw)
}

/// Command-line flags take precedence over `[config]`.
fn apply_cli_overrides(raw: &mut RawConfigFile, args: &CliArgs) {
    if let Some(policy) = args.failure_policy {
        raw.config.failure_policy = policy;
    }
    if let Some(ref filter) = args.filter {
        raw.config.filter = filter.clone();
    }
    if args.include_forks {
        raw.config.include_forks = true;
    }
}

/// Process exit status for an error returned by [`run`].
///
/// `2` when the config could not be loaded, validated or applied (any
/// [`RundagError`]); `1` for failed, deadlocked or cancelled targets.
pub fn exit_status(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<RundagError>().is_some() {
        2
    } else {
        1
    }
}

/// Dry-run output: units, dependencies, predicted stages and problems.
fn print_dry_run(cfg: &ConfigFile) {
    let graph = DagGraph::from_config(cfg);

    println!("rundag dry-run");
    println!("  config.failure_policy = {:?}", cfg.config.failure_policy);
    println!("  config.filter = {:?}", cfg.config.filter);
    println!("  config.include_forks = {}", cfg.config.include_forks);
    println!();

    println!("targets ({}):", cfg.target.len());
    for (name, target) in cfg.target.iter() {
        if target.fork {
            println!("  - {name} (fork)");
        } else {
            println!("  - {name}");
        }
    }
    println!();

    println!("units ({}):", cfg.unit.len());
    for (name, unit) in cfg.unit.iter() {
        println!("  - {name}");
        println!("      kind: {}", unit.effective_kind(name));
        println!("      cmd: {}", unit.cmd);
        if !unit.after.is_empty() {
            println!("      after: {:?}", unit.after);
        }
        if !unit.provides.is_empty() {
            println!("      provides: {:?}", unit.provides);
        }
    }
    println!();

    let stages = graph.stages();
    println!("stages (assuming every unit succeeds):");
    for (i, stage) in stages.stages.iter().enumerate() {
        println!("  {}: {}", i + 1, stage.join(", "));
    }
    if !stages.stuck.is_empty() {
        println!("  never ready: {}", stages.stuck.join(", "));
    }

    for (unit, tag) in graph.unknown_capabilities() {
        println!("problem: unit '{unit}' depends on '{tag}', which no unit provides");
    }
    for cycle in graph.cycles() {
        println!("problem: dependency cycle between {}", cycle.join(", "));
    }

    debug!("dry-run complete (no execution)");
}
