use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use ctf_core::{paths, DeploymentDb, DeploymentRecord};
use std::path::Path;

pub fn run(root: &Path, tracks: &[String], json: bool) -> anyhow::Result<()> {
    let records = load_records(root, tracks)?;

    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        println!("no deployments recorded");
        return Ok(());
    }

    let rows = records
        .iter()
        .map(|r| {
            let outputs: Vec<String> = r
                .infra_outputs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            vec![
                r.track.clone(),
                r.state.to_string(),
                or_dash(Some(&outputs.join(" "))),
                r.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                or_dash(r.last_error.as_deref()),
            ]
        })
        .collect();
    print_table(&["TRACK", "STATE", "OUTPUTS", "UPDATED", "ERROR"], rows);
    Ok(())
}

/// Recorded deployments; named tracks without a record show as not deployed.
fn load_records(root: &Path, tracks: &[String]) -> anyhow::Result<Vec<DeploymentRecord>> {
    let path = paths::state_db_path(root);
    if !path.exists() {
        return Ok(tracks.iter().map(DeploymentRecord::new).collect());
    }
    let db = DeploymentDb::open(&path).context("failed to open deployment state")?;
    if tracks.is_empty() {
        return Ok(db.list()?);
    }
    tracks
        .iter()
        .map(|t| db.get(t).map_err(anyhow::Error::from))
        .collect()
}
