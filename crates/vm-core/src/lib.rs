//! Proxmox VE VM provisioning core
//!
//! Error types and the capability interfaces the rest of the workspace is
//! written against.

pub mod error;
#[cfg(any(test, feature = "test-helpers"))]
pub mod fake;
pub mod hypervisor;
pub mod keystore;

pub use error::{ProvisionError, ValidationError};
pub use hypervisor::{CreateVmSpec, HypervisorCall, HypervisorClient, NodeStatus, VmOption};
pub use keystore::KeyStore;

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;
