// src/exec/command.rs

//! Units backed by a shell command.

use std::collections::{BTreeMap, BTreeSet};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result, bail};
use regex::{Captures, Regex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{Instrument, debug, info};

use crate::config::model::ConfigFile;
use crate::dag::CapabilityTag;
use crate::engine::UnitContext;
use crate::exec::unit::{SharedUnit, Unit, UnitFuture};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

/// A unit that runs `cmd` through the platform shell for every target.
#[derive(Debug, Clone)]
pub struct CommandUnit {
    name: String,
    kind: String,
    provides: BTreeSet<CapabilityTag>,
    cmd: String,
    env: BTreeMap<String, String>,
}

impl CommandUnit {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, cmd: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            name: name.into(),
            provides: BTreeSet::from([kind.clone()]),
            kind,
            cmd: cmd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_provides(mut self, tags: impl IntoIterator<Item = CapabilityTag>) -> Self {
        self.provides.extend(tags);
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Build one unit per `[unit.<name>]` table, in name order.
    pub fn all_from_config(cfg: &ConfigFile) -> Vec<SharedUnit<UnitContext>> {
        cfg.unit
            .iter()
            .map(|(name, uc)| {
                let mut env = cfg.default.env.clone();
                env.extend(uc.env.clone());

                let unit = CommandUnit::new(name.clone(), uc.effective_kind(name), uc.cmd.clone())
                    .with_provides(uc.capabilities(name))
                    .with_env(env);
                Arc::new(unit) as SharedUnit<UnitContext>
            })
            .collect()
    }

    async fn run(&self, ctx: Arc<UnitContext>) -> Result<()> {
        let rendered = render_command(&self.cmd, &ctx);
        let target = ctx.target.name.as_str();

        info!(
            unit = %self.name,
            target_name = %target,
            mode = %ctx.mode,
            cmd = %rendered,
            "starting unit process"
        );

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&rendered);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&rendered);
            c
        };

        cmd.envs(&self.env)
            .env("RUNDAG_UNIT", &self.name)
            .env("RUNDAG_KIND", &self.kind)
            .env("RUNDAG_TARGET", target)
            .env("RUNDAG_MODE", ctx.mode.as_str())
            .env("RUNDAG_APPLY", if ctx.mode.is_read_only() { "0" } else { "1" })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for unit '{}'", self.name))?;

        // Always consume output so buffers don't fill. Readers stay in the
        // caller's span and are joined before the exit is reported.
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let unit = self.name.clone();
            readers.push(tokio::spawn(
                async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        info!(unit = %unit, "stdout: {}", line);
                    }
                }
                .in_current_span(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            let unit = self.name.clone();
            readers.push(tokio::spawn(
                async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(unit = %unit, "stderr: {}", line);
                    }
                }
                .in_current_span(),
            ));
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of unit '{}'", self.name))?;

        for reader in readers {
            if let Err(err) = reader.await {
                debug!(unit = %self.name, error = %err, "output reader ended abnormally");
            }
        }

        let code = status.code().unwrap_or(-1);
        info!(
            unit = %self.name,
            target_name = %target,
            exit_code = code,
            success = status.success(),
            "unit process exited"
        );

        if !status.success() {
            bail!("command `{}` exited with code {}", rendered, code);
        }
        Ok(())
    }
}

impl Unit<UnitContext> for CommandUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn provides(&self) -> BTreeSet<CapabilityTag> {
        self.provides.clone()
    }

    fn execute(&self, context: Arc<UnitContext>) -> UnitFuture<'_> {
        Box::pin(self.run(context))
    }
}

/// Expand `{target}`, `{mode}`, `{apply}` and target `vars` in a command.
///
/// Unknown placeholders are left untouched.
pub fn render_command(template: &str, ctx: &UnitContext) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            match key {
                "target" => ctx.target.name.clone(),
                "mode" => ctx.mode.as_str().to_string(),
                "apply" => (!ctx.mode.is_read_only()).to_string(),
                other => ctx
                    .target
                    .vars
                    .get(other)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string()),
            }
        })
        .into_owned()
}
