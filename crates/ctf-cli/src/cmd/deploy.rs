use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use clap::Args;
use ctf_core::config::WarnLevel;
use ctf_core::{
    paths, Config, DeployMode, DeployTarget, DeploymentDb, Operation, Orchestrator, RunReport,
    TrackListing, TrackRegistry,
};
use ctf_runner::{AnsibleConfigurator, TofuProvisioner};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args)]
pub struct DeployArgs {
    /// Only these tracks (directory names); default is every deployable track
    #[arg(long = "tracks", short = 't')]
    pub tracks: Vec<String>,

    /// Target the production environment
    #[arg(long)]
    pub production: bool,

    /// Incus remote to deploy to (overrides config)
    #[arg(long)]
    pub remote: Option<String>,

    /// Tracks processed at once (overrides config)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Load the config with the command-line overrides applied and validated.
pub(crate) fn load_config(root: &Path, args: &DeployArgs) -> anyhow::Result<Config> {
    let mut config = Config::load(root).context("failed to load config")?;
    if let Some(remote) = &args.remote {
        config.remote = remote.clone();
    }
    if let Some(n) = args.concurrency {
        config.concurrency = n;
    }
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => anyhow::bail!("invalid config: {}", warning.message),
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
        }
    }
    Ok(config)
}

pub(crate) fn target(config: &Config, args: &DeployArgs) -> DeployTarget {
    DeployTarget {
        mode: DeployMode::from_production_flag(args.production),
        remote: config.remote.clone(),
    }
}

pub fn run(
    root: &Path,
    operation: Operation,
    args: DeployArgs,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root, &args)?;
    let selection = TrackRegistry::new(root)
        .select(&args.tracks)
        .context("failed to discover tracks")?;
    if selection.tracks.is_empty() && selection.failures.is_empty() {
        println!("no deployable tracks found");
        return Ok(());
    }

    if operation == Operation::Destroy && !force && !confirm_destroy(&selection)? {
        println!("aborted");
        return Ok(());
    }

    let target = target(&config, &args);
    let provisioner = TofuProvisioner::from_config(&config)?;
    let configurator = AnsibleConfigurator::from_config(root, &config);
    let db = DeploymentDb::open(&paths::state_db_path(root))
        .context("failed to open deployment state")?;

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(async {
        let orchestrator = Orchestrator::new(
            provisioner,
            configurator,
            Arc::new(db),
            config.concurrency,
            target,
        )?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = orchestrator.run(operation, selection, shutdown_rx);
        tokio::pin!(run);
        let report = tokio::select! {
            report = &mut run => report,
            Ok(()) = tokio::signal::ctrl_c() => {
                eprintln!("interrupt received; waiting for running tracks to stop");
                let _ = shutdown_tx.send(true);
                run.await
            }
        };
        anyhow::Ok(report)
    })?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.success() {
        let failed = report.failures().count();
        anyhow::bail!(
            "{operation}: {failed} of {} track(s) did not reach {}",
            report.outcomes.len(),
            operation.target_state()
        );
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let rows = report
        .outcomes
        .iter()
        .map(|o| {
            vec![
                o.track.clone(),
                o.outcome.to_string(),
                o.state.to_string(),
                or_dash(o.error.as_deref()),
            ]
        })
        .collect();
    print_table(&["TRACK", "OUTCOME", "STATE", "ERROR"], rows);
}

fn confirm_destroy(selection: &TrackListing) -> anyhow::Result<bool> {
    let names: Vec<&str> = selection.tracks.iter().map(|t| t.id.as_str()).collect();
    eprint!(
        "Destroy {} track(s): {}? [y/N] ",
        names.len(),
        names.join(", ")
    );
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
