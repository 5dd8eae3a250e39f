//! Infrastructure provisioning contract.

use crate::config::DeployTarget;
use crate::error::Result;
use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

/// Output map of a successful apply: output name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InfraOutputs(BTreeMap<String, String>);

impl InfraOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InfraOutputs {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Drives the external provisioning tool for one track at a time.
///
/// Each call scopes to the track's own namespace; implementations must be
/// safe to call concurrently for different tracks.
pub trait Provisioner: Send + Sync + 'static {
    /// Create or update the track's infrastructure and return its outputs.
    fn apply(
        &self,
        track: &Track,
        target: &DeployTarget,
    ) -> impl Future<Output = Result<InfraOutputs>> + Send;

    /// Tear down everything the track's definition created.
    fn destroy(
        &self,
        track: &Track,
        target: &DeployTarget,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read the outputs the tool currently holds for the track without
    /// changing anything.
    fn outputs(
        &self,
        track: &Track,
        target: &DeployTarget,
    ) -> impl Future<Output = Result<InfraOutputs>> + Send;
}
