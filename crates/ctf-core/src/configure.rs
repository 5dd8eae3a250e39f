//! Configuration-run contract and the inventory it is built from.
//!
//! The inventory is derived only from [`InfraOutputs`]: an output named
//! `<host>_address` declares a host, and a bare `address` output declares a
//! single host named after the track. Every other output is exposed as a
//! group variable.

use crate::config::DeployTarget;
use crate::error::Result;
use crate::flags::FlagBindings;
use crate::infra::InfraOutputs;
use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

const ADDRESS_SUFFIX: &str = "_address";
const BARE_ADDRESS: &str = "address";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryHost {
    pub ansible_host: String,
}

/// Ansible-shaped inventory: `all.hosts` plus `all.vars`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub hosts: BTreeMap<String, InventoryHost>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct InventoryFile<'a> {
    all: &'a Inventory,
}

impl Inventory {
    pub fn from_outputs(track_id: &str, outputs: &InfraOutputs) -> Self {
        let mut inv = Inventory::default();
        for (name, value) in outputs.iter() {
            let host = if name == BARE_ADDRESS {
                Some(track_id)
            } else {
                name.strip_suffix(ADDRESS_SUFFIX).filter(|h| !h.is_empty())
            };
            match host {
                Some(host) => {
                    inv.hosts.insert(
                        host.to_string(),
                        InventoryHost {
                            ansible_host: value.to_string(),
                        },
                    );
                }
                None => {
                    inv.vars.insert(name.to_string(), value.to_string());
                }
            }
        }
        inv
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Render as an inventory YAML document rooted at the `all` group.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&InventoryFile { all: self })?)
    }
}

/// Drives the external configuration runner for one track.
pub trait Configurator: Send + Sync + 'static {
    /// Configure every host of the track. A failure on any host fails the
    /// whole call and names that host.
    fn run(
        &self,
        track: &Track,
        outputs: &InfraOutputs,
        bindings: &FlagBindings,
        target: &DeployTarget,
    ) -> impl Future<Output = Result<()>> + Send;
}
