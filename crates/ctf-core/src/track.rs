//! Track discovery and descriptor parsing.
//!
//! A track lives in `challenges/<id>/` and is described by `track.yaml`.
//! Descriptors are re-read from disk on every invocation; a broken
//! descriptor is reported for its own track and never hides the others.

use crate::error::{CtfError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contacts {
    #[serde(default)]
    pub dev: Vec<String>,
    #[serde(default)]
    pub qa: Vec<String>,
    #[serde(default)]
    pub support: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub instance: String,
    pub address: String,
    pub check: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_port_mapping: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagTags {
    /// Discourse trigger; doubles as the templating discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discourse: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub flag: String,
    pub value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_string: Option<String>,
    #[serde(default)]
    pub tags: FlagTags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub integrated_with_scenario: bool,
    #[serde(default)]
    pub contacts: Contacts,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub flags: Vec<Flag>,
}

impl TrackDescriptor {
    fn check(&self, dir_name: &str) -> Result<()> {
        paths::validate_track_id(dir_name)?;
        if self.name != dir_name {
            return Err(CtfError::descriptor(
                dir_name,
                format!(
                    "descriptor name '{}' does not match directory name",
                    self.name
                ),
            ));
        }

        let mut literals = HashSet::new();
        for flag in &self.flags {
            if !literals.insert(flag.flag.as_str()) {
                return Err(CtfError::descriptor(
                    dir_name,
                    format!("flag '{}' is declared more than once", flag.flag),
                ));
            }
        }

        let mut endpoints = HashSet::new();
        for service in &self.services {
            if !endpoints.insert((service.instance.as_str(), service.port)) {
                return Err(CtfError::descriptor(
                    dir_name,
                    format!(
                        "port {} is declared twice on instance '{}'",
                        service.port, service.instance
                    ),
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: String,
    pub path: PathBuf,
    pub descriptor: TrackDescriptor,
}

impl Track {
    /// Parse `track.yaml` from a track directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CtfError::NotFound(dir.display().to_string()))?;

        let file = dir.join(paths::TRACK_FILE);
        if !file.is_file() {
            return Err(CtfError::NotFound(id));
        }
        let data = std::fs::read_to_string(&file)
            .map_err(|e| CtfError::descriptor(&id, format!("cannot read track.yaml: {e}")))?;
        let descriptor: TrackDescriptor = serde_yaml::from_str(&data)
            .map_err(|e| CtfError::descriptor(&id, format!("malformed track.yaml: {e}")))?;
        descriptor.check(&id)?;

        Ok(Self {
            id,
            path: dir.to_path_buf(),
            descriptor,
        })
    }

    pub fn infra_dir(&self) -> PathBuf {
        self.path.join(paths::TERRAFORM_DIR)
    }

    pub fn playbook_dir(&self) -> PathBuf {
        self.path.join(paths::ANSIBLE_DIR)
    }

    pub fn playbook(&self) -> PathBuf {
        self.playbook_dir().join(paths::PLAYBOOK_FILE)
    }

    pub fn has_playbook(&self) -> bool {
        self.playbook().is_file()
    }

    /// A track can be deployed once it ships an infrastructure definition.
    pub fn is_deployable(&self) -> bool {
        self.infra_dir().join(paths::TERRAFORM_MAIN).is_file()
    }

    pub fn ensure_deployable(&self) -> Result<()> {
        if self.is_deployable() {
            Ok(())
        } else {
            Err(CtfError::descriptor(
                &self.id,
                format!(
                    "missing {}/{}",
                    paths::TERRAFORM_DIR,
                    paths::TERRAFORM_MAIN
                ),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// A track whose descriptor could not be loaded.
#[derive(Debug)]
pub struct DescriptorFailure {
    pub track: String,
    pub error: CtfError,
}

/// Result of a discovery or selection pass: the usable tracks, ordered by id,
/// plus the per-track failures collected along the way.
#[derive(Debug, Default)]
pub struct TrackListing {
    pub tracks: Vec<Track>,
    pub failures: Vec<DescriptorFailure>,
}

impl TrackListing {
    pub fn get(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

impl From<Vec<Track>> for TrackListing {
    fn from(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackRegistry {
    root: PathBuf,
}

impl TrackRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Discover every directory under `challenges/` that carries a `track.yaml`.
    pub fn list_tracks(&self) -> Result<TrackListing> {
        let dir = paths::challenges_dir(&self.root);
        let mut listing = TrackListing::default();
        if !dir.is_dir() {
            return Ok(listing);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.join(paths::TRACK_FILE).is_file())
            .collect();
        entries.sort();

        for path in entries {
            match Track::from_dir(&path) {
                Ok(track) => listing.tracks.push(track),
                Err(error) => {
                    let track = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    tracing::warn!(track = %track, "skipping track: {error}");
                    listing.failures.push(DescriptorFailure { track, error });
                }
            }
        }
        Ok(listing)
    }

    pub fn load_track(&self, id: &str) -> Result<Track> {
        let dir = paths::track_dir(&self.root, id);
        if !dir.is_dir() {
            return Err(CtfError::NotFound(id.to_string()));
        }
        Track::from_dir(&dir)
    }

    /// Resolve an optional name filter into tracks.
    ///
    /// With an empty filter every discovered deployable track is selected.
    /// Named tracks are loaded individually, in the order given, duplicates
    /// dropped; unknown or malformed names become failures.
    pub fn select(&self, filter: &[String]) -> Result<TrackListing> {
        if filter.is_empty() {
            let mut listing = self.list_tracks()?;
            listing.tracks.retain(|t| {
                let deployable = t.is_deployable();
                if !deployable {
                    tracing::debug!(track = %t.id, "not deployable, skipping");
                }
                deployable
            });
            return Ok(listing);
        }

        let mut listing = TrackListing::default();
        let mut seen = HashSet::new();
        for id in filter {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.load_track(id) {
                Ok(track) => listing.tracks.push(track),
                Err(error) => listing.failures.push(DescriptorFailure {
                    track: id.clone(),
                    error,
                }),
            }
        }
        Ok(listing)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
