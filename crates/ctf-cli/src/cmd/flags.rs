use super::load_tracks;
use clap::ValueEnum;
use ctf_core::track::Flag;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlagFormat {
    Json,
    Yaml,
    Csv,
}

#[derive(Serialize)]
struct TrackFlag<'a> {
    track: &'a str,
    #[serde(flatten)]
    flag: &'a Flag,
}

pub fn run(root: &Path, tracks: &[String], format: FlagFormat) -> anyhow::Result<()> {
    let tracks = load_tracks(root, tracks)?;
    let flags: Vec<TrackFlag> = tracks
        .iter()
        .flat_map(|t| {
            t.descriptor.flags.iter().map(|flag| TrackFlag {
                track: &t.id,
                flag,
            })
        })
        .collect();

    if flags.is_empty() {
        tracing::warn!("no flag found");
        return Ok(());
    }

    match format {
        FlagFormat::Json => crate::output::print_json(&flags)?,
        FlagFormat::Yaml => print!("{}", serde_yaml::to_string(&flags)?),
        FlagFormat::Csv => print!("{}", to_csv(&flags)),
    }
    Ok(())
}

const CSV_COLUMNS: [&str; 6] = [
    "track",
    "flag",
    "value",
    "description",
    "return_string",
    "discourse",
];

/// Header row then one record per flag; absent fields are empty.
fn to_csv(flags: &[TrackFlag]) -> String {
    let mut out = CSV_COLUMNS.join(",");
    out.push_str("\r\n");
    for f in flags {
        let value = f.flag.value.to_string();
        let fields: [String; 6] = [
            f.track,
            f.flag.flag.as_str(),
            value.as_str(),
            f.flag.description.as_deref().unwrap_or(""),
            f.flag.return_string.as_deref().unwrap_or(""),
            f.flag.tags.discourse.as_deref().unwrap_or(""),
        ]
        .map(csv_field);
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
