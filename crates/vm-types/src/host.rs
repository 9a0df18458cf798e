//! Host capability snapshot

use serde::{Deserialize, Serialize};

use crate::{MAX_VM_ID, MIN_VM_ID};

/// VM already present on the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSummary {
    pub vmid: u32,
    pub name: Option<String>,
}

/// Limits and inventory of the host, fetched once per run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// Node the VM is created on
    pub node: String,
    /// Total host memory in whole GB (floored)
    pub max_ram_gb: u64,
    /// Total logical CPUs of the host
    pub max_cores: u32,
    /// Configured storage ids
    pub storages: Vec<String>,
    /// VMs known at discovery time
    pub vms: Vec<VmSummary>,
}

impl HostCapabilities {
    pub fn has_storage(&self, storage: &str) -> bool {
        self.storages.iter().any(|s| s == storage)
    }

    /// Lowest id in the provisioning range that no VM uses yet
    pub fn next_free_vmid(&self) -> Option<u32> {
        (MIN_VM_ID..=MAX_VM_ID).find(|id| !self.vms.iter().any(|vm| vm.vmid == *id))
    }
}
