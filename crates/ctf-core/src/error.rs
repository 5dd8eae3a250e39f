use thiserror::Error;

#[derive(Debug, Error)]
pub enum CtfError {
    #[error("track not found: {0}")]
    NotFound(String),

    #[error("invalid track '{track}': {message}")]
    Descriptor { track: String, message: String },

    #[error("duplicate flag key '{key}' in track '{track}'")]
    DuplicateFlagKey { track: String, key: String },

    #[error("provisioning failed: {0}")]
    Provision(String),

    #[error("configuration failed{}: {cause}", host_suffix(.host))]
    Config { host: Option<String>, cause: String },

    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("track '{0}' already has an operation in progress")]
    StateConflict(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("state store error: {0}")]
    StateDb(String),

    #[error("{0} not found on PATH")]
    ToolNotFound(String),

    #[error("operation cancelled before it started")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CtfError {
    pub fn descriptor(track: impl Into<String>, message: impl Into<String>) -> Self {
        CtfError::Descriptor {
            track: track.into(),
            message: message.into(),
        }
    }
}

fn host_suffix(host: &Option<String>) -> String {
    host.as_deref()
        .map(|h| format!(" on host '{h}'"))
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, CtfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_failing_host() {
        let err = CtfError::Config {
            host: Some("web".into()),
            cause: "failed=1".into(),
        };
        assert_eq!(err.to_string(), "configuration failed on host 'web': failed=1");

        let err = CtfError::Config {
            host: None,
            cause: "exit 2".into(),
        };
        assert_eq!(err.to_string(), "configuration failed: exit 2");
    }
}
