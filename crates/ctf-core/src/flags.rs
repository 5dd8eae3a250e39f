//! Deterministic flag bindings.
//!
//! Each flag of a track resolves to a [`FlagBinding`]: a namespaced key
//! (track id + discriminator) and the flag's literal value. Resolution is a
//! pure function of the descriptor, so redeploying never rotates a secret.

use crate::error::{CtfError, Result};
use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// FlagKey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlagKey {
    pub track: String,
    pub discriminator: String,
}

impl FlagKey {
    /// Templating variable name, e.g. `flag_mock_track__mock_track_flag_1`.
    pub fn var_name(&self) -> String {
        format!(
            "flag_{}__{}",
            normalize(&self.track),
            normalize(&self.discriminator)
        )
    }
}

impl fmt::Display for FlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.track, self.discriminator)
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// FlagBinding / FlagBindings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagBinding {
    pub key: FlagKey,
    pub value: String,
}

/// All bindings of one track, ordered by rendered variable name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagBindings {
    track: String,
    bindings: BTreeMap<String, FlagBinding>,
}

impl FlagBindings {
    pub fn empty(track: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn track(&self) -> &str {
        &self.track
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FlagBinding)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, var_name: &str) -> Option<&FlagBinding> {
        self.bindings.get(var_name)
    }

    /// Variable name → literal, ready to be merged into templating variables.
    pub fn to_vars(&self) -> BTreeMap<String, String> {
        self.bindings
            .iter()
            .map(|(k, b)| (k.clone(), b.value.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Resolve the bindings of a single track.
///
/// Fails with `DuplicateFlagKey` when two flags derive the same key; the
/// resolver never merges them.
pub fn resolve(track: &Track) -> Result<FlagBindings> {
    let mut out = FlagBindings::empty(&track.id);
    for (idx, flag) in track.descriptor.flags.iter().enumerate() {
        let discriminator = match flag.tags.discourse.as_deref() {
            Some(tag) if !tag.trim().is_empty() => tag.trim().to_string(),
            _ => format!("flag_{}", idx + 1),
        };
        let key = FlagKey {
            track: track.id.clone(),
            discriminator,
        };
        let var = key.var_name();
        if out.bindings.contains_key(&var) {
            return Err(CtfError::DuplicateFlagKey {
                track: track.id.clone(),
                key: var,
            });
        }
        out.bindings.insert(
            var,
            FlagBinding {
                key,
                value: flag.flag.clone(),
            },
        );
    }
    Ok(out)
}

/// Resolve every track of a run and enforce run-wide key uniqueness.
///
/// Tracks whose own flags collide, or whose keys collide with another
/// track's, come back as errors; the rest resolve normally.
pub fn resolve_run<'a>(
    tracks: impl IntoIterator<Item = &'a Track>,
) -> BTreeMap<String, Result<FlagBindings>> {
    let mut results: BTreeMap<String, Result<FlagBindings>> = BTreeMap::new();
    let mut owners: HashMap<String, Vec<String>> = HashMap::new();

    for track in tracks {
        let resolved = resolve(track);
        if let Ok(bindings) = &resolved {
            for (var, _) in bindings.iter() {
                owners
                    .entry(var.to_string())
                    .or_default()
                    .push(track.id.clone());
            }
        }
        results.insert(track.id.clone(), resolved);
    }

    let mut collisions: BTreeMap<String, String> = BTreeMap::new();
    for (var, tracks) in owners {
        if tracks.len() > 1 {
            for t in tracks {
                collisions.entry(t).or_insert_with(|| var.clone());
            }
        }
    }

    for (track, var) in collisions {
        tracing::warn!(track = %track, key = %var, "flag key collides with another track");
        results.insert(
            track.clone(),
            Err(CtfError::DuplicateFlagKey { track, key: var }),
        );
    }
    results
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
