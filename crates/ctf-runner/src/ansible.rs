//! ansible-playbook configurator.
//!
//! Per run, the inventory and extra variables are written under
//! `.deploy/runs/<track>/` and handed to the runner as files. The common
//! playbook (when present) runs before the track's own `deploy.yaml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ctf_core::config::Config;
use ctf_core::{
    io, paths, Configurator, CtfError, DeployTarget, FlagBindings, InfraOutputs, Inventory,
    Result, Track,
};
use serde_json::Value;

use crate::process::{self, ToolCommand};
use crate::recap;

#[derive(Debug, Clone)]
pub struct AnsibleConfigurator {
    tool: String,
    program: PathBuf,
    root: PathBuf,
    common_playbook: PathBuf,
    timeout: Duration,
}

impl AnsibleConfigurator {
    pub fn new(
        program: impl Into<PathBuf>,
        root: impl Into<PathBuf>,
        common_playbook: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        let program = program.into();
        let tool = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ansible-playbook".to_string());
        Self {
            tool,
            program,
            root: root.into(),
            common_playbook: common_playbook.into(),
            timeout,
        }
    }

    /// A runner missing from PATH only fails once a playbook actually runs,
    /// so tracks without one (and destroys) never need it installed.
    pub fn from_config(root: &Path, config: &Config) -> Self {
        let program = process::resolve_program(&config.config_runner)
            .unwrap_or_else(|_| PathBuf::from(&config.config_runner));
        Self::new(
            program,
            root,
            config.common_playbook_path(root),
            config.configure_timeout(),
        )
    }

    /// Playbooks to run for `track`, in order.
    fn playbooks(&self, track: &Track) -> Vec<PathBuf> {
        let mut books = Vec::new();
        if self.common_playbook.is_file() {
            books.push(self.common_playbook.clone());
        }
        books.push(track.playbook());
        books
    }

    async fn run_playbook(
        &self,
        track: &Track,
        playbook: &Path,
        inventory: &Path,
        extra_vars: &Path,
    ) -> Result<()> {
        let cmd = ToolCommand::new(&self.tool, &self.program, &track.playbook_dir())
            .env("ANSIBLE_NOCOLOR", "1")
            .env("ANSIBLE_RETRY_FILES_ENABLED", "0")
            .arg("-i")
            .arg(inventory.display().to_string())
            .arg("-e")
            .arg(format!("@{}", extra_vars.display()))
            .arg(playbook.display().to_string());

        tracing::info!(playbook = %playbook.display(), "running playbook");
        let out = process::run(&cmd, self.timeout).await?;

        let recaps = recap::parse(&out.stdout);
        if let Some(failed) = recap::first_failure(&recaps) {
            return Err(CtfError::Config {
                host: Some(failed.host.clone()),
                cause: failed.describe(),
            });
        }
        if !out.success() {
            return Err(CtfError::Config {
                host: None,
                cause: out.failure_summary(&self.tool),
            });
        }
        Ok(())
    }
}

/// Variables passed with `-e @extra-vars.json`.
pub fn extra_vars(
    track: &Track,
    bindings: &FlagBindings,
    target: &DeployTarget,
) -> BTreeMap<String, Value> {
    let mut vars: BTreeMap<String, Value> = bindings
        .to_vars()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    vars.insert("ctf_track".into(), Value::String(track.id.clone()));
    vars.insert(
        "ansible_incus_remote".into(),
        Value::String(target.remote.clone()),
    );
    if target.mode.is_production() {
        vars.insert("nsec_production".into(), Value::Bool(true));
    }
    vars
}

impl Configurator for AnsibleConfigurator {
    async fn run(
        &self,
        track: &Track,
        outputs: &InfraOutputs,
        bindings: &FlagBindings,
        target: &DeployTarget,
    ) -> Result<()> {
        if !track.has_playbook() {
            tracing::info!(
                "no {} in {}, skipping configuration",
                paths::PLAYBOOK_FILE,
                paths::ANSIBLE_DIR
            );
            return Ok(());
        }

        let inventory = Inventory::from_outputs(&track.id, outputs);
        if inventory.is_empty() {
            return Err(CtfError::Config {
                host: None,
                cause: "provisioner outputs declare no host address".into(),
            });
        }

        let run_dir = paths::run_dir(&self.root, &track.id);
        let inventory_path = run_dir.join(paths::INVENTORY_FILE);
        let vars_path = run_dir.join(paths::EXTRA_VARS_FILE);
        io::atomic_write(&inventory_path, inventory.to_yaml()?.as_bytes())?;
        io::atomic_write(
            &vars_path,
            &serde_json::to_vec_pretty(&extra_vars(track, bindings, target))?,
        )?;

        let mut result = Ok(());
        for playbook in self.playbooks(track) {
            result = self
                .run_playbook(track, &playbook, &inventory_path, &vars_path)
                .await;
            if result.is_err() {
                break;
            }
        }

        let artifacts = track.playbook_dir().join(paths::ARTIFACTS_DIR);
        if let Err(e) = io::remove_dir_if_exists(&artifacts) {
            tracing::warn!("cannot remove {}: {e}", artifacts.display());
        }
        result
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
