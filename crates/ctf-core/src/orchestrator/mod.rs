//! Deployment orchestration.
//!
//! One task per selected track, bounded by a semaphore. Inside a task the
//! steps are strictly sequential and run inside the track's exclusive
//! section, which is taken before the record is read and released after it
//! is durably written. Sibling tracks never affect each other: every error
//! ends up in that track's [`TrackOutcome`].

mod locks;


pub use locks::{TrackGuard, TrackLocks};

use crate::config::DeployTarget;
use crate::configure::Configurator;
use crate::deployment::{DeploymentDb, DeploymentRecord, DeploymentState, Phase};
use crate::error::{CtfError, Result};
use crate::fingerprint;
use crate::flags::{self, FlagBindings};
use crate::infra::Provisioner;
use crate::track::{Track, TrackListing};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deploy,
    Redeploy,
    Destroy,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Deploy => "deploy",
            Operation::Redeploy => "redeploy",
            Operation::Destroy => "destroy",
        }
    }

    /// State every selected track must reach for the run to succeed.
    pub fn target_state(self) -> DeploymentState {
        match self {
            Operation::Deploy | Operation::Redeploy => DeploymentState::Deployed,
            Operation::Destroy => DeploymentState::NotDeployed,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
            Outcome::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackOutcome {
    pub track: String,
    pub outcome: Outcome,
    /// Recorded state once the task finished.
    pub state: DeploymentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub operation: Operation,
    pub outcomes: Vec<TrackOutcome>,
}

impl RunReport {
    /// True when every selected track reached the operation's target state.
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome == Outcome::Succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TrackOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome != Outcome::Succeeded)
    }

    pub fn get(&self, track: &str) -> Option<&TrackOutcome> {
        self.outcomes.iter().find(|o| o.track == track)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<P, C> {
    provisioner: Arc<P>,
    configurator: Arc<C>,
    db: Arc<DeploymentDb>,
    locks: TrackLocks,
    concurrency: usize,
    target: DeployTarget,
}

impl<P, C> Clone for Orchestrator<P, C> {
    fn clone(&self) -> Self {
        Self {
            provisioner: Arc::clone(&self.provisioner),
            configurator: Arc::clone(&self.configurator),
            db: Arc::clone(&self.db),
            locks: self.locks.clone(),
            concurrency: self.concurrency,
            target: self.target.clone(),
        }
    }
}

impl<P: Provisioner, C: Configurator> Orchestrator<P, C> {
    /// Build an orchestrator over `db`.
    ///
    /// Records a previous process left in `Provisioning` or `Configuring` are
    /// marked failed here, before any track is touched.
    pub fn new(
        provisioner: P,
        configurator: C,
        db: Arc<DeploymentDb>,
        concurrency: usize,
        target: DeployTarget,
    ) -> Result<Self> {
        db.recover_interrupted()?;
        Ok(Self {
            provisioner: Arc::new(provisioner),
            configurator: Arc::new(configurator),
            db,
            locks: TrackLocks::new(),
            concurrency: concurrency.max(1),
            target,
        })
    }

    pub fn db(&self) -> &DeploymentDb {
        &self.db
    }

    pub fn locks(&self) -> &TrackLocks {
        &self.locks
    }

    /// Apply `op` to every track of `selection`.
    ///
    /// Selection failures are reported as failed outcomes. Once `shutdown`
    /// flips to true, tracks that have not started yet are reported as
    /// cancelled; tracks already running finish and record their state.
    pub async fn run(
        &self,
        op: Operation,
        selection: TrackListing,
        shutdown: watch::Receiver<bool>,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, %op);
        self.run_inner(run_id, op, selection, shutdown)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        op: Operation,
        selection: TrackListing,
        shutdown: watch::Receiver<bool>,
    ) -> RunReport {
        let TrackListing { tracks, failures } = selection;
        tracing::info!(tracks = tracks.len(), "starting {op}");

        let mut outcomes: Vec<TrackOutcome> = failures
            .into_iter()
            .map(|f| self.outcome(&f.track, Err(f.error)))
            .collect();

        let mut bindings: BTreeMap<String, Result<FlagBindings>> = match op {
            Operation::Deploy | Operation::Redeploy => flags::resolve_run(&tracks),
            Operation::Destroy => BTreeMap::new(),
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for track in tracks {
            let this = self.clone();
            let sem = Arc::clone(&semaphore);
            let mut shutdown = shutdown.clone();
            let track_bindings = bindings
                .remove(&track.id)
                .unwrap_or_else(|| Ok(FlagBindings::empty(&track.id)));
            let id = track.id.clone();
            let span = tracing::info_span!("track", track = %track.id);

            let handle = tokio::spawn(
                async move {
                    let permit = tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => None,
                        permit = sem.acquire_owned() => permit.ok(),
                    };
                    if permit.is_none() || *shutdown.borrow() {
                        return this.outcome(&track.id, Err(CtfError::Cancelled));
                    }
                    let result = match op {
                        Operation::Deploy => {
                            this.deploy_track(&track, track_bindings, false).await
                        }
                        Operation::Redeploy => {
                            this.deploy_track(&track, track_bindings, true).await
                        }
                        Operation::Destroy => this.destroy_track(&track).await,
                    };
                    drop(permit);
                    this.outcome(&track.id, result)
                }
                .instrument(span),
            );
            handles.push((id, handle));
        }

        for (track, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(track = %track, "track task aborted: {e}");
                    outcomes.push(TrackOutcome {
                        state: self.recorded_state(&track),
                        track,
                        outcome: Outcome::Failed,
                        error: Some(format!("track task aborted: {e}")),
                    });
                }
            }
        }

        outcomes.sort_by(|a, b| a.track.cmp(&b.track));
        let report = RunReport {
            run_id,
            operation: op,
            outcomes,
        };
        let failed = report.failures().count();
        if failed == 0 {
            tracing::info!("{op} finished for all tracks");
        } else {
            tracing::warn!(failed, "{op} finished with failures");
        }
        report
    }

    // -----------------------------------------------------------------------
    // Per-track state machine
    // -----------------------------------------------------------------------

    /// Deploy (or, with `redeploy`, re-check and redeploy) one track.
    pub async fn deploy_track(
        &self,
        track: &Track,
        bindings: Result<FlagBindings>,
        redeploy: bool,
    ) -> Result<DeploymentRecord> {
        let _section = self.locks.acquire(&track.id).await;
        let mut record = self.db.get(&track.id)?;

        if record.state == DeploymentState::Destroying || record.state.is_in_flight() {
            return Err(CtfError::InvalidTransition {
                from: record.state.to_string(),
                to: DeploymentState::Deployed.to_string(),
                reason: format!("finish the pending operation on '{}' first", track.id),
            });
        }
        track.ensure_deployable()?;
        let bindings = bindings?;
        let hash = fingerprint::definition_hash(track)?;

        if self.needs_provisioning(track, &record, &hash, redeploy).await {
            record.transition(DeploymentState::Provisioning)?;
            self.db.put(&record)?;
            tracing::info!("provisioning");

            match self.provisioner.apply(track, &self.target).await {
                Ok(outputs) => {
                    record.infra_outputs = outputs;
                    record.definition_hash = Some(hash);
                }
                Err(e) => {
                    record.fail(Phase::Provisioning, e.to_string())?;
                    self.db.put(&record)?;
                    return Err(e);
                }
            }
        } else {
            tracing::info!("infrastructure unchanged, skipping provisioning");
        }

        record.transition(DeploymentState::Configuring)?;
        self.db.put(&record)?;
        tracing::info!(hosts = record.infra_outputs.len(), "configuring");

        if let Err(e) = self
            .configurator
            .run(track, &record.infra_outputs, &bindings, &self.target)
            .await
        {
            record.fail(Phase::Configuring, e.to_string())?;
            self.db.put(&record)?;
            return Err(e);
        }

        record.transition(DeploymentState::Deployed)?;
        self.db.put(&record)?;
        tracing::info!("deployed");
        Ok(record)
    }

    /// Destroy one track. A track with nothing recorded is a no-op.
    pub async fn destroy_track(&self, track: &Track) -> Result<DeploymentRecord> {
        let _section = self.locks.acquire(&track.id).await;
        let mut record = self.db.get(&track.id)?;

        if record.state == DeploymentState::NotDeployed {
            tracing::info!("not deployed, nothing to destroy");
            return Ok(record);
        }

        record.transition(DeploymentState::Destroying)?;
        self.db.put(&record)?;
        tracing::info!("destroying");

        match self.provisioner.destroy(track, &self.target).await {
            Ok(()) => {
                record.reset()?;
                self.db.put(&record)?;
                tracing::info!("destroyed");
                Ok(record)
            }
            Err(e) => {
                record.destroy_failed(e.to_string());
                self.db.put(&record)?;
                Err(e)
            }
        }
    }

    /// Whether the deploy must go through `apply`.
    ///
    /// A plain deploy trusts the fingerprint. A redeploy of a `Deployed`
    /// track also reads the provisioner's live outputs (`Provisioner::outputs`,
    /// the only provisioner call an undrifted redeploy makes; it never applies
    /// or destroys) and re-provisions when they drifted from the recorded
    /// ones, or when they cannot be read.
    ///
    /// A recorded hash only exists after a successful apply (`reset` clears
    /// it), so an empty output map is not a reason to provision again.
    async fn needs_provisioning(
        &self,
        track: &Track,
        record: &DeploymentRecord,
        hash: &str,
        redeploy: bool,
    ) -> bool {
        if record.definition_hash.as_deref() != Some(hash) {
            return true;
        }

        match record.state {
            DeploymentState::Deployed if redeploy => {
                match self.provisioner.outputs(track, &self.target).await {
                    Ok(live) if live == record.infra_outputs => false,
                    Ok(_) => {
                        tracing::info!("live outputs drifted from the recorded ones");
                        true
                    }
                    Err(e) => {
                        tracing::warn!("cannot read live outputs, re-provisioning: {e}");
                        true
                    }
                }
            }
            DeploymentState::Deployed
            | DeploymentState::Failed {
                phase: Phase::Configuring,
            } => redeploy,
            _ => true,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn recorded_state(&self, track: &str) -> DeploymentState {
        self.db.get(track).map(|r| r.state).unwrap_or_default()
    }

    fn outcome(&self, track: &str, result: Result<DeploymentRecord>) -> TrackOutcome {
        match result {
            Ok(record) => TrackOutcome {
                track: track.to_string(),
                outcome: Outcome::Succeeded,
                state: record.state,
                error: None,
            },
            Err(CtfError::Cancelled) => {
                tracing::info!(track = %track, "cancelled before starting");
                TrackOutcome {
                    track: track.to_string(),
                    outcome: Outcome::Cancelled,
                    state: self.recorded_state(track),
                    error: Some(CtfError::Cancelled.to_string()),
                }
            }
            Err(e) => {
                tracing::warn!(track = %track, "{e}");
                TrackOutcome {
                    track: track.to_string(),
                    outcome: Outcome::Failed,
                    state: self.recorded_state(track),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        // Sender gone without a shutdown: never fire.
        std::future::pending::<()>().await;
    }
}
