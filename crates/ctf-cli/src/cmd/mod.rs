pub mod check;
pub mod deploy;
pub mod flags;
pub mod list;
pub mod services;
pub mod status;

use anyhow::Context;
use ctf_core::{Track, TrackRegistry};
use std::path::Path;

/// Every track under `challenges/`, narrowed to `filter` when it is non-empty.
///
/// Unknown names are an error. Malformed descriptors were already logged
/// by the registry and are left out.
pub(crate) fn load_tracks(root: &Path, filter: &[String]) -> anyhow::Result<Vec<Track>> {
    let registry = TrackRegistry::new(root);
    let listing = registry.list_tracks().with_context(|| {
        format!(
            "failed to read {}",
            ctf_core::paths::challenges_dir(root).display()
        )
    })?;
    if filter.is_empty() {
        return Ok(listing.tracks);
    }
    let known = |id: &String| {
        listing.get(id).is_some() || listing.failures.iter().any(|f| &f.track == id)
    };
    if let Some(missing) = filter.iter().find(|id| !known(*id)) {
        anyhow::bail!("track '{missing}' not found");
    }
    Ok(listing
        .tracks
        .into_iter()
        .filter(|t| filter.contains(&t.id))
        .collect())
}
