use std::path::{Path, PathBuf};

/// Resolve the CTF root directory.
///
/// Priority:
/// 1. `--root` flag / `CTF_ROOT_DIR` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `challenges/` next to `.deploy/`
/// 3. Walk upward from `cwd` looking for `challenges/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root(&cwd)
}

fn find_root(start: &Path) -> PathBuf {
    let markers: [&[&str]; 2] = [&["challenges", ".deploy"], &["challenges"]];
    for marker in markers {
        if let Some(dir) = start
            .ancestors()
            .find(|dir| marker.iter().all(|m| dir.join(m).is_dir()))
        {
            return dir.to_path_buf();
        }
    }
    start.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_challenges_dir_from_inside_a_track() {
        let dir = TempDir::new().unwrap();
        let deep = dir.path().join("challenges/web/terraform");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(find_root(&deep), dir.path());
    }

    #[test]
    fn deploy_dir_breaks_ties() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("mirror");
        std::fs::create_dir_all(dir.path().join("challenges")).unwrap();
        std::fs::create_dir_all(dir.path().join(".deploy")).unwrap();
        std::fs::create_dir_all(inner.join("challenges")).unwrap();
        assert_eq!(find_root(&inner), dir.path());
    }

    #[test]
    fn falls_back_to_start() {
        let dir = TempDir::new().unwrap();
        let start = dir.path().join("nowhere");
        std::fs::create_dir_all(&start).unwrap();
        // The tempdir's ancestors may carry a challenges/ of their own; only
        // assert when they do not.
        if !start.ancestors().any(|d| d.join("challenges").is_dir()) {
            assert_eq!(find_root(&start), start);
        }
    }
}
