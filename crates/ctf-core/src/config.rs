use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DeployMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMode {
    #[default]
    Development,
    Production,
}

impl DeployMode {
    pub fn from_production_flag(production: bool) -> Self {
        if production {
            DeployMode::Production
        } else {
            DeployMode::Development
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeployMode::Development => "development",
            DeployMode::Production => "production",
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, DeployMode::Production)
    }
}

impl std::fmt::Display for DeployMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation inputs shared by both adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub mode: DeployMode,
    pub remote: String,
}

impl Default for DeployTarget {
    fn default() -> Self {
        Self {
            mode: DeployMode::Development,
            remote: default_remote(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub provision_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub configure_timeout_secs: u64,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// Provisioner binary. `None` picks `tofu`, then `terraform`, from PATH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<String>,
    #[serde(default = "default_config_runner")]
    pub config_runner: String,
    #[serde(default = "default_common_playbook")]
    pub common_playbook: PathBuf,
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30 * 60
}

fn default_remote() -> String {
    "local".to_string()
}

fn default_config_runner() -> String {
    "ansible-playbook".to_string()
}

fn default_common_playbook() -> PathBuf {
    PathBuf::from(paths::COMMON_PLAYBOOK)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            provision_timeout_secs: default_timeout_secs(),
            configure_timeout_secs: default_timeout_secs(),
            remote: default_remote(),
            provisioner: None,
            config_runner: default_config_runner(),
            common_playbook: default_common_playbook(),
        }
    }
}

impl Config {
    /// Load `.deploy/config.yaml`, falling back to defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub fn configure_timeout(&self) -> Duration {
        Duration::from_secs(self.configure_timeout_secs)
    }

    /// Common playbook resolved against the CTF root.
    pub fn common_playbook_path(&self, root: &Path) -> PathBuf {
        if self.common_playbook.is_absolute() {
            self.common_playbook.clone()
        } else {
            root.join(&self.common_playbook)
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.concurrency == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "concurrency must be at least 1".to_string(),
            });
        } else if self.concurrency > 32 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "concurrency={} may overwhelm the provisioning backend",
                    self.concurrency
                ),
            });
        }

        for (name, secs) in [
            ("provision_timeout_secs", self.provision_timeout_secs),
            ("configure_timeout_secs", self.configure_timeout_secs),
        ] {
            if secs == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name} must be greater than zero"),
                });
            }
        }

        if self.remote.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "remote must not be empty".to_string(),
            });
        }

        if self.config_runner.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "config_runner must not be empty".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
