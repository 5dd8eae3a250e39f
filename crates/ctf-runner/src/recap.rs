//! `PLAY RECAP` parsing for ansible-playbook output.

/// Counters of one host line in a `PLAY RECAP` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostRecap {
    pub host: String,
    pub ok: u32,
    pub changed: u32,
    pub unreachable: u32,
    pub failed: u32,
    pub skipped: u32,
}

impl HostRecap {
    pub fn is_failure(&self) -> bool {
        self.failed > 0 || self.unreachable > 0
    }

    pub fn describe(&self) -> String {
        format!(
            "ok={} changed={} unreachable={} failed={}",
            self.ok, self.changed, self.unreachable, self.failed
        )
    }
}

/// Every host line of every `PLAY RECAP` block in `stdout`, in output order.
pub fn parse(stdout: &str) -> Vec<HostRecap> {
    let mut recaps = Vec::new();
    let mut in_recap = false;
    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("PLAY RECAP") {
            in_recap = true;
            continue;
        }
        if !in_recap {
            continue;
        }
        match parse_line(trimmed) {
            Some(recap) => recaps.push(recap),
            None if trimmed.is_empty() => {}
            None => in_recap = false,
        }
    }
    recaps
}

/// First host that failed or could not be reached.
pub fn first_failure(recaps: &[HostRecap]) -> Option<&HostRecap> {
    recaps.iter().find(|r| r.is_failure())
}

fn parse_line(line: &str) -> Option<HostRecap> {
    let (host, counters) = line.split_once(" : ")?;
    let mut recap = HostRecap {
        host: host.trim().to_string(),
        ..HostRecap::default()
    };
    let mut seen = false;
    for pair in counters.split_whitespace() {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let Ok(n) = value.parse::<u32>() else {
            continue;
        };
        seen = true;
        match key {
            "ok" => recap.ok = n,
            "changed" => recap.changed = n,
            "unreachable" => recap.unreachable = n,
            "failed" => recap.failed = n,
            "skipped" => recap.skipped = n,
            _ => {}
        }
    }
    seen.then_some(recap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
PLAY [Deploy] ******************************************************************

TASK [Gathering Facts] *********************************************************
ok: [web]
fatal: [db]: UNREACHABLE! => {\"changed\": false, \"unreachable\": true}

PLAY RECAP *********************************************************************
db                         : ok=0    changed=0    unreachable=1    failed=0    skipped=0    rescued=0    ignored=0
web                        : ok=5    changed=2    unreachable=0    failed=0    skipped=1    rescued=0    ignored=0

";

    #[test]
    fn parses_host_lines() {
        let recaps = parse(OUTPUT);
        assert_eq!(recaps.len(), 2);
        assert_eq!(recaps[1].host, "web");
        assert_eq!(recaps[1].ok, 5);
        assert_eq!(recaps[1].skipped, 1);
        assert_eq!(first_failure(&recaps).unwrap().host, "db");
    }

    #[test]
    fn clean_run_has_no_failure() {
        let out = "PLAY RECAP ***\nweb : ok=3 changed=0 unreachable=0 failed=0\n";
        let recaps = parse(out);
        assert_eq!(recaps.len(), 1);
        assert!(first_failure(&recaps).is_none());
    }

    #[test]
    fn recaps_of_several_playbooks_are_concatenated() {
        let out = "PLAY RECAP ***\nweb : ok=1 failed=0\n\nPLAY [next] ***\nPLAY RECAP ***\nweb : ok=1 failed=2\n";
        let recaps = parse(out);
        assert_eq!(recaps.len(), 2);
        assert_eq!(
            first_failure(&recaps).unwrap().describe(),
            "ok=1 changed=0 unreachable=0 failed=2"
        );
    }

    #[test]
    fn no_recap_yields_nothing() {
        assert!(parse("ERROR! the playbook could not be found\n").is_empty());
    }
}
