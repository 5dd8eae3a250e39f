use super::deploy::{load_config, target, DeployArgs};
use crate::output::{print_json, print_table};
use anyhow::Context;
use ctf_core::TrackRegistry;
use ctf_runner::TofuProvisioner;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Serialize)]
struct PlanResult {
    track: String,
    success: bool,
    /// Plan text on success, the failure cause otherwise.
    output: String,
}

/// Plan every selected track without applying anything or recording state.
pub fn run(root: &Path, args: DeployArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(root, &args)?;
    let selection = TrackRegistry::new(root)
        .select(&args.tracks)
        .context("failed to discover tracks")?;
    if selection.tracks.is_empty() && selection.failures.is_empty() {
        println!("no deployable tracks found");
        return Ok(());
    }

    let target = target(&config, &args);
    let provisioner = TofuProvisioner::from_config(&config)?;

    let mut results: Vec<PlanResult> = selection
        .failures
        .into_iter()
        .map(|f| PlanResult {
            track: f.track,
            success: false,
            output: f.error.to_string(),
        })
        .collect();

    let rt = tokio::runtime::Runtime::new()?;
    let planned = rt.block_on(async {
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        let mut handles = Vec::new();
        for track in selection.tracks {
            let provisioner = provisioner.clone();
            let target = target.clone();
            let sem = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await;
                tracing::info!(track = %track.id, "planning");
                let plan = provisioner.plan(&track, &target).await;
                (track.id, plan)
            }));
        }

        let collect = async {
            let mut planned = Vec::new();
            for handle in handles {
                planned.push(handle.await?);
            }
            anyhow::Ok(planned)
        };
        tokio::select! {
            planned = collect => planned,
            Ok(()) = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
        }
    })?;

    results.extend(planned.into_iter().map(|(track, plan)| match plan {
        Ok(text) => PlanResult {
            track,
            success: true,
            output: text,
        },
        Err(e) => PlanResult {
            track,
            success: false,
            output: e.to_string(),
        },
    }));
    results.sort_by(|a, b| a.track.cmp(&b.track));

    if json {
        print_json(&results)?;
    } else {
        print_results(&results);
    }

    let failed = results.iter().filter(|r| !r.success).count();
    if failed > 0 {
        anyhow::bail!("check: {failed} of {} track(s) failed to plan", results.len());
    }
    Ok(())
}

fn print_results(results: &[PlanResult]) {
    for r in results.iter().filter(|r| r.success) {
        println!("==> {}", r.track);
        println!("{}", r.output.trim_end());
    }
    let rows = results
        .iter()
        .map(|r| {
            let summary = if r.success {
                plan_summary(&r.output).unwrap_or("planned").to_string()
            } else {
                r.output.clone()
            };
            vec![
                r.track.clone(),
                if r.success { "ok" } else { "failed" }.to_string(),
                summary,
            ]
        })
        .collect();
    print_table(&["TRACK", "PLAN", "SUMMARY"], rows);
}

/// The `Plan: ...` or `No changes. ...` line of a plan, when present.
fn plan_summary(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find(|l| l.starts_with("Plan:") || l.starts_with("No changes."))
}
