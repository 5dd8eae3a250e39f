#![cfg(unix)]
#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Stand-in for tofu: `broken` fails to plan and apply, everything else gets
/// an address.
const TOFU: &str = r#"track=$(basename "$(dirname "$PWD")")
case "$1" in
  init) mkdir -p .terraform ;;
  apply)
    if [ "$track" = "broken" ]; then
      echo '{"type":"diagnostic","diagnostic":{"severity":"error","summary":"Failed to create instance","detail":"quota exceeded"}}'
      exit 1
    fi
    echo '{"type":"outputs","outputs":{"address":{"sensitive":false,"type":"string","value":"9000::1"}}}' ;;
  plan)
    if [ "$track" = "broken" ]; then
      echo 'Error: Unsupported argument' >&2
      exit 1
    fi
    echo 'Plan: 1 to add, 0 to change, 0 to destroy.' ;;
  output) echo '{"address":{"sensitive":false,"type":"string","value":"9000::1"}}' ;;
esac"#;

const ANSIBLE: &str = r#"echo 'PLAY RECAP ***'
echo 'host : ok=2 changed=1 unreachable=0 failed=0'"#;

struct Ctf {
    dir: TempDir,
}

impl Ctf {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".deploy")).unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        let ctf = Self { dir };
        let tofu = ctf.fake_tool("tofu", TOFU);
        let ansible = ctf.fake_tool("ansible-playbook", ANSIBLE);
        std::fs::write(
            ctf.root().join(".deploy/config.yaml"),
            format!(
                "concurrency: 2\nprovisioner: {}\nconfig_runner: {}\n",
                tofu.display(),
                ansible.display()
            ),
        )
        .unwrap();
        ctf
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn fake_tool(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root().join("bin").join(name);
        let script = format!(
            "#!/bin/sh\necho \"{name} $*\" >> '{}'\n{body}\n",
            self.root().join("calls.log").display()
        );
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn add_track(&self, id: &str) {
        let dir = self.root().join("challenges").join(id);
        std::fs::create_dir_all(dir.join("terraform")).unwrap();
        std::fs::create_dir_all(dir.join("ansible")).unwrap();
        std::fs::write(
            dir.join("track.yaml"),
            format!(
                r#"name: {id}
contacts:
  support: [alice, bob]
services:
  - name: {id}-http
    instance: {id}
    address: "9000::1"
    check: http
    port: 80
flags:
  - flag: FLAG-{id}-1
    value: 5
    description: First flag
"#
            ),
        )
        .unwrap();
        std::fs::write(dir.join("terraform/main.tf"), format!("# {id}\n")).unwrap();
        std::fs::write(dir.join("ansible/deploy.yaml"), "- hosts: all\n").unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("ctf").unwrap();
        cmd.current_dir(self.root())
            .env("CTF_ROOT_DIR", self.root())
            .env_remove("RUST_LOG");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let out = self.cmd().arg("--json").args(args).output().unwrap();
        serde_json::from_slice(&out.stdout).unwrap()
    }

    fn calls(&self, prefix: &str) -> usize {
        std::fs::read_to_string(self.root().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter(|l| l.starts_with(prefix))
            .count()
    }
}

fn state_of<'a>(status: &'a Value, track: &str) -> &'a str {
    status
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["track"] == track)
        .map(|r| r["state"]["type"].as_str().unwrap())
        .unwrap_or("missing")
}

// ---------------------------------------------------------------------------
// ctf deploy
// ---------------------------------------------------------------------------

#[test]
fn deploy_all_tracks() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.add_track("crypto");

    let report = ctf.json(&["deploy"]);
    assert_eq!(report["operation"], "deploy");
    let outcomes = report["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o["outcome"] == "succeeded"));

    let status = ctf.json(&["status"]);
    assert_eq!(state_of(&status, "crypto"), "deployed");
    assert_eq!(state_of(&status, "web"), "deployed");
    assert_eq!(ctf.calls("ansible-playbook"), 2);
}

#[test]
fn second_deploy_only_reconfigures() {
    let ctf = Ctf::new();
    ctf.add_track("web");

    ctf.cmd().arg("deploy").assert().success();
    ctf.cmd().arg("deploy").assert().success();

    assert_eq!(ctf.calls("tofu apply"), 1);
    assert_eq!(ctf.calls("ansible-playbook"), 2);
}

#[test]
fn one_failing_track_fails_the_run() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.add_track("broken");

    let out = ctf.cmd().args(["--json", "deploy"]).output().unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("1 of 2 track(s) did not reach deployed"), "{stderr}");

    let report: Value = serde_json::from_slice(&out.stdout).unwrap();
    let broken = &report["outcomes"][0];
    assert_eq!(broken["track"], "broken");
    assert_eq!(broken["outcome"], "failed");
    assert_eq!(broken["state"]["phase"], "provisioning");
    assert!(broken["error"]
        .as_str()
        .unwrap()
        .contains("quota exceeded"));
    assert_eq!(report["outcomes"][1]["outcome"], "succeeded");
}

#[test]
fn selected_tracks_only() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.add_track("crypto");

    ctf.cmd().args(["deploy", "-t", "web"]).assert().success();

    let status = ctf.json(&["status"]);
    assert_eq!(state_of(&status, "web"), "deployed");
    assert_eq!(state_of(&status, "crypto"), "missing");
}

#[test]
fn unknown_track_is_reported() {
    let ctf = Ctf::new();
    ctf.add_track("web");

    ctf.cmd()
        .args(["deploy", "-t", "nope"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("nope"));
}

#[test]
fn invalid_concurrency_is_rejected() {
    let ctf = Ctf::new();
    ctf.add_track("web");

    ctf.cmd()
        .args(["deploy", "--concurrency", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency must be at least 1"));
    assert_eq!(ctf.calls("tofu"), 0);
}

// ---------------------------------------------------------------------------
// ctf destroy
// ---------------------------------------------------------------------------

#[test]
fn check_plans_without_touching_state() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.cmd()
        .args(["check", "--production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan: 1 to add"));

    assert_eq!(ctf.calls("tofu plan -input=false -no-color -var deploy=production"), 1);
    assert_eq!(ctf.calls("tofu apply"), 0);
    assert_eq!(ctf.calls("ansible-playbook"), 0);
    assert!(!ctf.root().join(".deploy/state.redb").exists());
}

#[test]
fn check_reports_failed_plans() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.add_track("broken");
    let results = ctf.json(&["check"]);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["track"], "broken");
    assert_eq!(results[0]["success"], false);
    assert!(results[0]["output"]
        .as_str()
        .unwrap()
        .contains("Unsupported argument"));
    assert_eq!(results[1]["success"], true);

    ctf.cmd()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 track(s) failed to plan"));
}

#[test]
fn destroy_with_force() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.cmd().arg("deploy").assert().success();

    ctf.cmd().args(["destroy", "--force"]).assert().success();

    let status = ctf.json(&["status"]);
    assert_eq!(state_of(&status, "web"), "not_deployed");
    assert_eq!(ctf.calls("tofu destroy"), 1);
}

#[test]
fn destroy_asks_first() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.cmd().arg("deploy").assert().success();

    ctf.cmd()
        .arg("destroy")
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("aborted"));

    assert_eq!(ctf.calls("tofu destroy"), 0);
    assert_eq!(state_of(&ctf.json(&["status"]), "web"), "deployed");
}

// ---------------------------------------------------------------------------
// ctf status / list / flags / services
// ---------------------------------------------------------------------------

#[test]
fn status_without_state() {
    let ctf = Ctf::new();
    ctf.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("no deployments recorded"));
    assert!(!ctf.root().join(".deploy/state.redb").exists());
}

#[test]
fn status_table_lists_outputs() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.cmd().arg("deploy").assert().success();

    ctf.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("deployed"))
        .stdout(predicate::str::contains("address=9000::1"));
}

#[test]
fn list_reports_tracks() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    std::fs::create_dir_all(ctf.root().join("challenges/notes")).unwrap();
    std::fs::write(
        ctf.root().join("challenges/notes/track.yaml"),
        "name: notes\n",
    )
    .unwrap();

    let rows = ctf.json(&["list"]);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["track"], "notes");
    assert_eq!(rows[0]["deployable"], false);
    assert_eq!(rows[1]["track"], "web");
    assert_eq!(rows[1]["flags"], 1);
}

#[test]
fn flags_as_yaml() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.add_track("crypto");

    ctf.cmd()
        .args(["flags", "--format", "yaml", "-t", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("flag: FLAG-web-1"))
        .stdout(predicate::str::contains("track: web"))
        .stdout(predicate::str::contains("FLAG-crypto-1").not());
}

#[test]
fn flags_as_csv() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.cmd()
        .args(["flags", "--format", "csv"])
        .assert()
        .success()
        .stdout(
            "track,flag,value,description,return_string,discourse\r\n\
             web,FLAG-web-1,5,First flag,,\r\n",
        );
}

#[test]
fn flags_of_unknown_track_fail() {
    let ctf = Ctf::new();
    ctf.add_track("web");
    ctf.cmd()
        .args(["flags", "-t", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("track 'nope' not found"));
}

#[test]
fn services_one_line_each() {
    let ctf = Ctf::new();
    ctf.add_track("web");

    ctf.cmd()
        .arg("services")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "web/web/web-http alice,bob 9000::1 http 80",
        ));
}
