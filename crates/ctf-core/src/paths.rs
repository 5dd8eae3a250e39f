use crate::error::{CtfError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CHALLENGES_DIR: &str = "challenges";
pub const DEPLOY_DIR: &str = ".deploy";
pub const RUNS_DIR: &str = ".deploy/runs";

pub const CONFIG_FILE: &str = ".deploy/config.yaml";
pub const STATE_DB_FILE: &str = ".deploy/state.redb";
pub const COMMON_PLAYBOOK: &str = ".deploy/common.yaml";

pub const TRACK_FILE: &str = "track.yaml";
pub const TERRAFORM_DIR: &str = "terraform";
pub const TERRAFORM_MAIN: &str = "main.tf";
pub const ANSIBLE_DIR: &str = "ansible";
pub const PLAYBOOK_FILE: &str = "deploy.yaml";
pub const ARTIFACTS_DIR: &str = "artifacts";

pub const INVENTORY_FILE: &str = "inventory.yaml";
pub const EXTRA_VARS_FILE: &str = "extra-vars.json";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn challenges_dir(root: &Path) -> PathBuf {
    root.join(CHALLENGES_DIR)
}

pub fn track_dir(root: &Path, track: &str) -> PathBuf {
    challenges_dir(root).join(track)
}

pub fn track_file(root: &Path, track: &str) -> PathBuf {
    track_dir(root, track).join(TRACK_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn state_db_path(root: &Path) -> PathBuf {
    root.join(STATE_DB_FILE)
}

pub fn run_dir(root: &Path, track: &str) -> PathBuf {
    root.join(RUNS_DIR).join(track)
}

// ---------------------------------------------------------------------------
// Track identifier validation
// ---------------------------------------------------------------------------

static TRACK_ID_RE: OnceLock<Regex> = OnceLock::new();

fn track_id_re() -> &'static Regex {
    // Incus project names: 2-63 chars, starts with a letter, no trailing dash.
    TRACK_ID_RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9\-]{0,61}[a-z0-9]$").expect("track id regex is valid")
    })
}

pub fn validate_track_id(id: &str) -> Result<()> {
    if !track_id_re().is_match(id) {
        return Err(CtfError::descriptor(
            id,
            "name must be 2-63 lowercase letters, digits or dashes, start with a letter and not end with a dash",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
