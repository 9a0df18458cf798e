//! Dry-run hypervisor client
//!
//! Host queries go to the wrapped client; mutations are printed and recorded
//! instead of executed.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::info;

use pve_vm_core::{CreateVmSpec, HypervisorCall, HypervisorClient, NodeStatus, Result, VmOption};
use pve_vm_types::VmSummary;

pub struct DryRunClient {
    inner: Arc<dyn HypervisorClient>,
    planned: Mutex<Vec<HypervisorCall>>,
}

impl DryRunClient {
    pub fn new(inner: Arc<dyn HypervisorClient>) -> Self {
        Self {
            inner,
            planned: Mutex::new(Vec::new()),
        }
    }

    /// Calls that would have been issued, in order
    pub fn planned_calls(&self) -> Vec<HypervisorCall> {
        self.planned
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn plan(&self, call: HypervisorCall) {
        info!("[dry-run] {}", call);
        println!("[dry-run] {}", call);
        if let Ok(mut planned) = self.planned.lock() {
            planned.push(call);
        }
    }
}

#[async_trait]
impl HypervisorClient for DryRunClient {
    async fn node_name(&self) -> Result<String> {
        self.inner.node_name().await
    }

    async fn node_status(&self, node: &str) -> Result<NodeStatus> {
        self.inner.node_status(node).await
    }

    async fn list_storages(&self, node: &str) -> Result<Vec<String>> {
        self.inner.list_storages(node).await
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        self.inner.list_vms().await
    }

    async fn create_vm(&self, spec: &CreateVmSpec) -> Result<()> {
        self.plan(HypervisorCall::CreateVm(spec.clone()));
        Ok(())
    }

    async fn import_disk(&self, vmid: u32, image: &Path, storage: &str) -> Result<String> {
        self.plan(HypervisorCall::ImportDisk {
            vmid,
            image: image.to_path_buf(),
            storage: storage.to_string(),
        });
        Ok(format!(
            "Successfully imported disk as 'unused0:{}:vm-{}-disk-0'",
            storage, vmid
        ))
    }

    async fn set_options(&self, vmid: u32, options: &[VmOption]) -> Result<()> {
        self.plan(HypervisorCall::SetOptions {
            vmid,
            options: options.to_vec(),
        });
        Ok(())
    }

    async fn resize_disk(&self, vmid: u32, disk: &str, size: &str) -> Result<()> {
        self.plan(HypervisorCall::ResizeDisk {
            vmid,
            disk: disk.to_string(),
            size: size.to_string(),
        });
        Ok(())
    }

    async fn destroy_vm(&self, vmid: u32) -> Result<()> {
        self.plan(HypervisorCall::DestroyVm { vmid });
        Ok(())
    }
}
