//! Proxmox VE VM provisioning orchestrator
//!
//! Runs the fixed sequence of hypervisor calls that turns a validated
//! [`pve_vm_types::VmRequest`] into a configured VM, journaling each step and
//! destroying the half-built VM when a later step fails.

pub mod journal;
pub mod provision;
pub mod step;

#[cfg(test)]
mod tests;

pub use journal::Journal;
pub use provision::{
    parse_imported_disk, ProvisionReport, ProvisionRun, ProvisionSettings, ProvisionState,
    Provisioner,
};
pub use step::ProvisionStep;
