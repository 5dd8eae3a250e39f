use crate::output::{print_json, print_table};
use anyhow::Context;
use ctf_core::track::Contacts;
use ctf_core::TrackRegistry;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct TrackRow<'a> {
    track: &'a str,
    name: &'a str,
    deployable: bool,
    playbook: bool,
    flags: usize,
    services: usize,
    contacts: &'a Contacts,
}

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let listing = TrackRegistry::new(root)
        .list_tracks()
        .context("failed to discover tracks")?;

    let rows: Vec<TrackRow> = listing
        .tracks
        .iter()
        .map(|t| TrackRow {
            track: &t.id,
            name: &t.descriptor.name,
            deployable: t.is_deployable(),
            playbook: t.has_playbook(),
            flags: t.descriptor.flags.len(),
            services: t.descriptor.services.len(),
            contacts: &t.descriptor.contacts,
        })
        .collect();

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("no tracks found under {}", ctf_core::paths::CHALLENGES_DIR);
        return Ok(());
    }
    let yes_no = |b: bool| (if b { "yes" } else { "no" }).to_string();
    print_table(
        &["TRACK", "DEPLOYABLE", "PLAYBOOK", "FLAGS", "SERVICES", "SUPPORT"],
        rows.iter()
            .map(|r| {
                vec![
                    r.track.to_string(),
                    yes_no(r.deployable),
                    yes_no(r.playbook),
                    r.flags.to_string(),
                    r.services.to_string(),
                    r.contacts.support.join(","),
                ]
            })
            .collect(),
    );
    Ok(())
}
