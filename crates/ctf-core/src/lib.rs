pub mod config;
pub mod configure;
pub mod deployment;
pub mod error;
pub mod fingerprint;
pub mod flags;
pub mod infra;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod track;

pub use config::{Config, DeployMode, DeployTarget};
pub use configure::{Configurator, Inventory};
pub use deployment::{DeploymentDb, DeploymentRecord, DeploymentState, Phase};
pub use error::{CtfError, Result};
pub use flags::{FlagBinding, FlagBindings, FlagKey};
pub use infra::{InfraOutputs, Provisioner};
pub use orchestrator::{Operation, Orchestrator, Outcome, RunReport, TrackOutcome};
pub use track::{Track, TrackListing, TrackRegistry};
