//! Per-track lifecycle record.
//!
//! Lifecycle edges:
//!
//! ```text
//! NotDeployed | Failed(*) | Deployed ──► Provisioning ──► Configuring ──► Deployed
//! Deployed | Failed(Configuring) ──────────────────────► Configuring
//! Provisioning | Configuring | Destroying ──► Failed(same phase)
//! Deployed | Failed(*) | Destroying ──► Destroying ──► NotDeployed
//! ```
//!
//! Every edge goes through [`DeploymentRecord::transition`]; anything else is
//! rejected with `InvalidTransition`.

use crate::error::{CtfError, Result};
use crate::infra::InfraOutputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const HISTORY_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Phase / DeploymentState
// ---------------------------------------------------------------------------

/// Where a failed operation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Provisioning,
    Configuring,
    Destroying,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Provisioning => "provisioning",
            Phase::Configuring => "configuring",
            Phase::Destroying => "destroying",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeploymentState {
    #[default]
    NotDeployed,
    Provisioning,
    Configuring,
    Deployed,
    Destroying,
    Failed { phase: Phase },
}

impl DeploymentState {
    pub fn failed(phase: Phase) -> Self {
        DeploymentState::Failed { phase }
    }

    pub fn is_failed(self) -> bool {
        matches!(self, DeploymentState::Failed { .. })
    }

    /// States an interrupted process can leave behind mid-operation.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            DeploymentState::Provisioning | DeploymentState::Configuring
        )
    }

    fn can_transition_to(self, to: DeploymentState) -> bool {
        use DeploymentState::*;
        match to {
            Provisioning => matches!(self, NotDeployed | Deployed | Failed { .. }),
            Configuring => matches!(
                self,
                Provisioning
                    | Deployed
                    | Failed {
                        phase: Phase::Configuring
                    }
            ),
            Deployed => self == Configuring,
            Failed { phase } => match phase {
                Phase::Provisioning => self == Provisioning,
                Phase::Configuring => self == Configuring,
                Phase::Destroying => self == Destroying,
            },
            Destroying => matches!(self, Deployed | Destroying | Failed { .. }),
            NotDeployed => self == Destroying,
        }
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentState::NotDeployed => f.write_str("not_deployed"),
            DeploymentState::Provisioning => f.write_str("provisioning"),
            DeploymentState::Configuring => f.write_str("configuring"),
            DeploymentState::Deployed => f.write_str("deployed"),
            DeploymentState::Destroying => f.write_str("destroying"),
            DeploymentState::Failed { phase } => write!(f, "failed({phase})"),
        }
    }
}

// ---------------------------------------------------------------------------
// DeploymentRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEntry {
    pub from: DeploymentState,
    pub to: DeploymentState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub track: String,
    pub state: DeploymentState,
    /// Fingerprint of the definition at the last successful apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_hash: Option<String>,
    /// Outputs of the last successful apply. Retained through failures so a
    /// retry can reconfigure without re-provisioning.
    #[serde(default)]
    pub infra_outputs: InfraOutputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<TransitionEntry>,
}

impl DeploymentRecord {
    pub fn new(track: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            track: track.into(),
            state: DeploymentState::NotDeployed,
            definition_hash: None,
            infra_outputs: InfraOutputs::new(),
            last_error: None,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// Move to `to`, clearing any previous error.
    pub fn transition(&mut self, to: DeploymentState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(CtfError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
                reason: format!("track '{}' cannot move from {from} to {to}", self.track),
            });
        }
        let now = Utc::now();
        self.state = to;
        self.last_error = None;
        self.updated_at = now;
        self.history.push(TransitionEntry { from, to, at: now });
        if self.history.len() > HISTORY_LIMIT {
            self.history.drain(..self.history.len() - HISTORY_LIMIT);
        }
        Ok(())
    }

    /// Record a failure of the in-flight `phase`.
    pub fn fail(&mut self, phase: Phase, error: impl Into<String>) -> Result<()> {
        self.transition(DeploymentState::failed(phase))?;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// A failed destroy stays in `Destroying`; only the error is recorded.
    pub fn destroy_failed(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Completed destroy: back to the initial marker, history kept.
    pub fn reset(&mut self) -> Result<()> {
        self.transition(DeploymentState::NotDeployed)?;
        self.infra_outputs.clear();
        self.definition_hash = None;
        Ok(())
    }

    /// Outputs describing infrastructure that is up, or being configured.
    pub fn live_outputs(&self) -> Option<&InfraOutputs> {
        match self.state {
            DeploymentState::Deployed | DeploymentState::Configuring
                if !self.infra_outputs.is_empty() =>
            {
                Some(&self.infra_outputs)
            }
            _ => None,
        }
    }

    pub(crate) fn check_invariants(&self) -> Result<()> {
        if self.state == DeploymentState::NotDeployed && !self.infra_outputs.is_empty() {
            return Err(CtfError::StateDb(format!(
                "record for '{}' is not deployed but still holds outputs",
                self.track
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use DeploymentState::*;

    fn record_in(state: DeploymentState) -> DeploymentRecord {
        let mut r = DeploymentRecord::new("web");
        r.state = state;
        r
    }

    #[test]
    fn happy_path_edges() {
        let mut r = DeploymentRecord::new("web");
        r.transition(Provisioning).unwrap();
        r.transition(Configuring).unwrap();
        r.transition(Deployed).unwrap();
        r.transition(Destroying).unwrap();
        r.reset().unwrap();
        assert_eq!(r.state, NotDeployed);
        assert_eq!(r.history.len(), 5);
        assert_eq!(r.history[0].from, NotDeployed);
        assert_eq!(r.history[4].to, NotDeployed);
    }

    #[test]
    fn configure_only_paths() {
        for from in [Deployed, DeploymentState::failed(Phase::Configuring)] {
            record_in(from).transition(Configuring).unwrap();
        }
        let failed = DeploymentState::failed(Phase::Provisioning);
        for from in [NotDeployed, failed, Destroying] {
            assert!(record_in(from).transition(Configuring).is_err(), "{from}");
        }
    }

    #[test]
    fn illegal_edges_are_rejected() {
        let err = record_in(NotDeployed).transition(Deployed).unwrap_err();
        assert!(matches!(err, CtfError::InvalidTransition { .. }));
        assert!(record_in(Destroying).transition(Provisioning).is_err());
        assert!(record_in(NotDeployed).transition(Destroying).is_err());
        assert!(record_in(Deployed).transition(NotDeployed).is_err());
        assert!(record_in(Provisioning)
            .transition(DeploymentState::failed(Phase::Configuring))
            .is_err());
    }

    #[test]
    fn failure_keeps_outputs_and_error() {
        let mut r = record_in(Configuring);
        r.infra_outputs.insert("web_address", "9000::1");
        r.fail(Phase::Configuring, "host web unreachable").unwrap();
        assert_eq!(r.state, DeploymentState::failed(Phase::Configuring));
        assert_eq!(r.last_error.as_deref(), Some("host web unreachable"));
        assert_eq!(r.infra_outputs.len(), 1);
        assert!(r.live_outputs().is_none());

        r.transition(Configuring).unwrap();
        assert!(r.last_error.is_none());
        assert!(r.live_outputs().is_some());
    }

    #[test]
    fn reset_clears_outputs_and_hash() {
        let mut r = record_in(Destroying);
        r.infra_outputs.insert("address", "9000::1");
        r.definition_hash = Some("sha256:abc".into());
        r.reset().unwrap();
        assert!(r.infra_outputs.is_empty());
        assert!(r.definition_hash.is_none());
        r.check_invariants().unwrap();
    }

    #[test]
    fn history_is_bounded() {
        let mut r = record_in(Deployed);
        for _ in 0..40 {
            r.transition(Configuring).unwrap();
            r.transition(Deployed).unwrap();
        }
        assert_eq!(r.history.len(), HISTORY_LIMIT);
        assert_eq!(r.history.last().unwrap().to, Deployed);
    }

    #[test]
    fn state_serializes_tagged() {
        let json = serde_json::to_string(&DeploymentState::failed(Phase::Provisioning)).unwrap();
        assert_eq!(json, r#"{"type":"failed","phase":"provisioning"}"#);
        assert_eq!(
            DeploymentState::failed(Phase::Destroying).to_string(),
            "failed(destroying)"
        );
    }
}
