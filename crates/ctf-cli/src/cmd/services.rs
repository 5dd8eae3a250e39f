use super::load_tracks;
use crate::output::print_json;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ServiceRow<'a> {
    track: &'a str,
    instance: &'a str,
    name: &'a str,
    contacts: &'a [String],
    address: &'a str,
    check: &'a str,
    port: u16,
}

/// One line per service: `track/instance/name contacts address check port`.
pub fn run(root: &Path, tracks: &[String], json: bool) -> anyhow::Result<()> {
    let tracks = load_tracks(root, tracks)?;
    let rows: Vec<ServiceRow> = tracks
        .iter()
        .flat_map(|t| {
            t.descriptor.services.iter().map(|s| ServiceRow {
                track: &t.id,
                instance: &s.instance,
                name: &s.name,
                contacts: &t.descriptor.contacts.support,
                address: &s.address,
                check: &s.check,
                port: s.port,
            })
        })
        .collect();

    if json {
        return print_json(&rows);
    }
    for r in &rows {
        println!(
            "{}/{}/{} {} {} {} {}",
            r.track,
            r.instance,
            r.name,
            r.contacts.join(","),
            r.address,
            r.check,
            r.port
        );
    }
    Ok(())
}
