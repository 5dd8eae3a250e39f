//! Deployment State Store: lifecycle records and their redb persistence.

pub mod db;
pub mod record;

pub use db::DeploymentDb;
pub use record::{DeploymentRecord, DeploymentState, Phase, TransitionEntry};
