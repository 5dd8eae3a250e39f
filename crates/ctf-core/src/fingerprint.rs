//! Definition fingerprint used to detect infrastructure drift between runs.
//!
//! The hash covers the track's infrastructure definition tree and its
//! declared flags. The provisioner's own working state inside the tree
//! (`.terraform/`, lock and state files) is skipped, otherwise every apply
//! would change the fingerprint of the definition it just applied.

use crate::error::{CtfError, Result};
use crate::track::Track;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

const PREFIX: &str = "sha256:";

/// Fingerprint of a track's infra + flag definitions.
pub fn definition_hash(track: &Track) -> Result<String> {
    let mut hasher = Sha256::new();
    let infra = track.infra_dir();
    if infra.is_dir() {
        hash_dir_recursive(&mut hasher, &infra, "")?;
    }
    hasher.update([0x1E]);
    hasher.update(serde_json::to_vec(&track.descriptor.flags)?);
    Ok(format!("{PREFIX}{}", hex(&hasher.finalize())))
}

fn is_tool_state(name: &str) -> bool {
    name.starts_with(".terraform") || name.starts_with("terraform.tfstate")
}

fn hash_dir_recursive(hasher: &mut Sha256, dir: &Path, base: &str) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_tool_state(&name) {
            continue;
        }
        let rel_path = if base.is_empty() {
            name
        } else {
            format!("{base}/{name}")
        };

        // metadata() follows symlinks; shared variables.tf files are often linked in.
        let path = entry.path();
        let meta = fs::metadata(&path).map_err(|e| {
            CtfError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", path.display()),
            ))
        })?;

        if meta.is_dir() {
            hasher.update(rel_path.as_bytes());
            hasher.update([0xFF]);
            hash_dir_recursive(hasher, &path, &rel_path)?;
        } else if meta.is_file() {
            hasher.update(rel_path.as_bytes());
            hasher.update([0x00]);
            hasher.update(fs::read(&path)?);
        }
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::{minimal_yaml, write_track};
    use crate::track::TrackRegistry;
    use tempfile::TempDir;

    fn load(root: &Path, id: &str) -> Track {
        TrackRegistry::new(root).load_track(id).unwrap()
    }

    #[test]
    fn hash_is_stable() {
        let dir = TempDir::new().unwrap();
        write_track(dir.path(), "web", &minimal_yaml("web"), true);
        let a = definition_hash(&load(dir.path(), "web")).unwrap();
        let b = definition_hash(&load(dir.path(), "web")).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
        assert_eq!(a.len(), PREFIX.len() + 64);
    }

    #[test]
    fn infra_change_changes_hash() {
        let dir = TempDir::new().unwrap();
        let track_dir = write_track(dir.path(), "web", &minimal_yaml("web"), true);
        let before = definition_hash(&load(dir.path(), "web")).unwrap();
        let main_tf = track_dir.join("terraform/main.tf");
        fs::write(main_tf, "resource \"x\" \"y\" {}\n").unwrap();
        let after = definition_hash(&load(dir.path(), "web")).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn flag_change_changes_hash() {
        let dir = TempDir::new().unwrap();
        write_track(dir.path(), "web", &minimal_yaml("web"), true);
        let before = definition_hash(&load(dir.path(), "web")).unwrap();
        write_track(
            dir.path(),
            "web",
            "name: web\nflags:\n  - flag: FLAG-rotated\n    value: 1\n",
            true,
        );
        let after = definition_hash(&load(dir.path(), "web")).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn provisioner_state_is_ignored() {
        let dir = TempDir::new().unwrap();
        let track_dir = write_track(dir.path(), "web", &minimal_yaml("web"), true);
        let before = definition_hash(&load(dir.path(), "web")).unwrap();

        let tf = track_dir.join("terraform");
        fs::create_dir_all(tf.join(".terraform/providers")).unwrap();
        fs::write(tf.join("terraform.tfstate"), "{}").unwrap();
        fs::write(tf.join("terraform.tfstate.backup"), "{}").unwrap();
        fs::write(tf.join(".terraform.lock.hcl"), "# lock").unwrap();

        let after = definition_hash(&load(dir.path(), "web")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn description_edit_does_not_change_hash() {
        let dir = TempDir::new().unwrap();
        write_track(dir.path(), "web", &minimal_yaml("web"), true);
        let before = definition_hash(&load(dir.path(), "web")).unwrap();
        let yaml = format!("{}description: reworded\n", minimal_yaml("web"));
        write_track(dir.path(), "web", &yaml, true);
        let after = definition_hash(&load(dir.path(), "web")).unwrap();
        assert_eq!(before, after);
    }
}
