//! Drivers for the external tools a deployment sequences.
//!
//! ```text
//! Orchestrator
//!     │
//!     ├─► TofuProvisioner      ← `tofu|terraform init/apply/destroy/output`
//!     │        │                  in challenges/<track>/terraform
//!     │        ▼ InfraOutputs
//!     └─► AnsibleConfigurator  ← `ansible-playbook -i inventory.yaml -e @extra-vars.json`
//!                                 in challenges/<track>/ansible
//! ```
//!
//! Both go through [`process::run`], which owns timeouts and output capture.

pub mod ansible;
pub mod process;
pub mod recap;
pub mod tofu;


pub use ansible::AnsibleConfigurator;
pub use process::{ToolCommand, ToolOutput};
pub use tofu::TofuProvisioner;
