//! Durable deployment records backed by redb.
//!
//! One `deployments` table maps the track id to its JSON-encoded
//! [`DeploymentRecord`]. Every `put` runs in its own write transaction and
//! is committed before returning, so a restarted process always observes
//! the last state the orchestrator wrote.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{CtfError, Result};

use super::record::{DeploymentRecord, DeploymentState, Phase};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: track id. Value: JSON-encoded DeploymentRecord.
const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

fn db_err(e: impl std::fmt::Display) -> CtfError {
    CtfError::StateDb(e.to_string())
}

// ---------------------------------------------------------------------------
// DeploymentDb
// ---------------------------------------------------------------------------

pub struct DeploymentDb {
    db: Database,
}

impl DeploymentDb {
    /// Open or create the database at `path`, creating parent directories
    /// and the table as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(DEPLOYMENTS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// The stored record, or a fresh `NotDeployed` marker when none exists.
    pub fn get(&self, track: &str) -> Result<DeploymentRecord> {
        Ok(self
            .find(track)?
            .unwrap_or_else(|| DeploymentRecord::new(track)))
    }

    pub fn find(&self, track: &str) -> Result<Option<DeploymentRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(DEPLOYMENTS).map_err(db_err)?;
        let record = match table.get(track).map_err(db_err)? {
            Some(v) => Some(serde_json::from_slice(v.value()).map_err(db_err)?),
            None => None,
        };
        Ok(record)
    }

    /// Write `record` under its track id and commit.
    pub fn put(&self, record: &DeploymentRecord) -> Result<()> {
        record.check_invariants()?;
        let value = serde_json::to_vec(record).map_err(db_err)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(DEPLOYMENTS).map_err(db_err)?;
            table
                .insert(record.track.as_str(), value.as_slice())
                .map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Every stored record, ordered by track id.
    pub fn list(&self) -> Result<Vec<DeploymentRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(DEPLOYMENTS).map_err(db_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let record: DeploymentRecord = serde_json::from_slice(v.value()).map_err(db_err)?;
            result.push(record);
        }
        Ok(result)
    }

    /// Mark records left mid-operation by a dead process as failed in the
    /// phase they were in. `Destroying` is left alone: it is retried as is.
    ///
    /// Returns the ids of the recovered tracks.
    pub fn recover_interrupted(&self) -> Result<Vec<String>> {
        let mut recovered = Vec::new();
        for mut record in self.list()? {
            let phase = match record.state {
                DeploymentState::Provisioning => Phase::Provisioning,
                DeploymentState::Configuring => Phase::Configuring,
                _ => continue,
            };
            record.fail(phase, "interrupted")?;
            self.put(&record)?;
            tracing::warn!(track = %record.track, %phase, "recovered interrupted deployment");
            recovered.push(record.track);
        }
        Ok(recovered)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
