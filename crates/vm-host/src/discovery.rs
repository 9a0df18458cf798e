//! Host resource discovery

use std::sync::Arc;

use log::{debug, info};

use pve_vm_core::{HypervisorClient, ProvisionError, Result};
use pve_vm_types::HostCapabilities;

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Queries the host for the bounds used during validation
pub struct ResourceDiscovery {
    client: Arc<dyn HypervisorClient>,
}

impl ResourceDiscovery {
    pub fn new(client: Arc<dyn HypervisorClient>) -> Self {
        Self { client }
    }

    /// Take a fresh snapshot of the host; any failed query is fatal
    pub async fn discover(&self) -> Result<HostCapabilities> {
        let node = self.client.node_name().await?;
        debug!("Discovering resources of node {}", node);

        let status = self.client.node_status(&node).await?;
        let max_ram_gb = status.memory_total_bytes / BYTES_PER_GB;
        if max_ram_gb == 0 {
            return Err(ProvisionError::host_query(
                "node status",
                format!(
                    "host reports less than 1 GB of memory ({} bytes)",
                    status.memory_total_bytes
                ),
            ));
        }

        let storages = self.client.list_storages(&node).await?;
        if storages.is_empty() {
            return Err(ProvisionError::host_query(
                "storage list",
                format!("no storages configured on node {}", node),
            ));
        }

        let vms = self.client.list_vms().await?;

        info!(
            "Node {}: {} GB RAM, {} cores, {} storages, {} existing VMs",
            node,
            max_ram_gb,
            status.cpus,
            storages.len(),
            vms.len()
        );

        Ok(HostCapabilities {
            node,
            max_ram_gb,
            max_cores: status.cpus,
            storages,
            vms,
        })
    }
}
