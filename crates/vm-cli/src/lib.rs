//! Proxmox VE VM provisioning CLI
//!
//! Collects the parameters of a new cloud-init VM from flags and interactive
//! prompts, validates them against the host and drives the provisioning
//! sequence.

pub mod commands;
pub mod config;
pub mod prompt;
