//! Proxmox VE VM provisioning host integration
//!
//! `qm`/`pvesh` command line adapter, dry-run wrapper and resource discovery

pub mod discovery;
pub mod dry_run;
pub mod qm;

#[cfg(test)]
mod tests;

pub use discovery::ResourceDiscovery;
pub use dry_run::DryRunClient;
pub use qm::{CommandOutput, QmClient};
