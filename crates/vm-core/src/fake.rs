//! In-memory hypervisor
//!
//! Serves host queries from a fixed snapshot and records every mutating call.
//! Used by tests across the workspace.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

use pve_vm_types::{HostCapabilities, VmSummary};

use crate::hypervisor::{CreateVmSpec, HypervisorCall, HypervisorClient, NodeStatus, VmOption};
use crate::{ProvisionError, Result};

const GIB: u64 = 1024 * 1024 * 1024;

/// Which recorded call should fail
#[derive(Debug, Clone, PartialEq)]
pub enum FailOn {
    /// The n-th `set_options` call (0 based)
    SetOptions(usize),
    Resize,
    Destroy,
}

pub struct FakeHypervisor {
    host: Mutex<HostCapabilities>,
    import_output: Mutex<Option<String>>,
    fail_on: Mutex<Option<FailOn>>,
    calls: Mutex<Vec<HypervisorCall>>,
    vm_list_queries: Mutex<usize>,
}

impl FakeHypervisor {
    pub fn new(host: HostCapabilities) -> Self {
        Self {
            host: Mutex::new(host),
            import_output: Mutex::new(None),
            fail_on: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            vm_list_queries: Mutex::new(0),
        }
    }

    /// Host with 16 GB memory, 8 cores and the usual default storages
    pub fn standard() -> Self {
        Self::new(HostCapabilities {
            node: "pve".to_string(),
            max_ram_gb: 16,
            max_cores: 8,
            storages: vec!["local".to_string(), "local-lvm".to_string()],
            vms: Vec::new(),
        })
    }

    /// Override what `import_disk` prints
    pub fn with_import_output(self, output: impl Into<String>) -> Self {
        *self.import_output.lock().unwrap() = Some(output.into());
        self
    }

    pub fn failing_on(self, fail_on: FailOn) -> Self {
        *self.fail_on.lock().unwrap() = Some(fail_on);
        self
    }

    /// Register a VM as if someone else created it
    pub fn add_vm(&self, vmid: u32, name: &str) {
        self.host.lock().unwrap().vms.push(VmSummary {
            vmid,
            name: Some(name.to_string()),
        });
    }

    /// Mutating calls in the order they were issued
    pub fn calls(&self) -> Vec<HypervisorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn vm_list_queries(&self) -> usize {
        *self.vm_list_queries.lock().unwrap()
    }

    fn record(&self, call: HypervisorCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn should_fail(&self, candidate: &FailOn) -> bool {
        self.fail_on.lock().unwrap().as_ref() == Some(candidate)
    }

    fn failure(command: &str) -> ProvisionError {
        ProvisionError::Command {
            command: command.to_string(),
            exit_code: Some(255),
            stderr: "simulated failure".to_string(),
        }
    }
}

#[async_trait]
impl HypervisorClient for FakeHypervisor {
    async fn node_name(&self) -> Result<String> {
        Ok(self.host.lock().unwrap().node.clone())
    }

    async fn node_status(&self, _node: &str) -> Result<NodeStatus> {
        let host = self.host.lock().unwrap();
        Ok(NodeStatus {
            memory_total_bytes: host.max_ram_gb * GIB,
            cpus: host.max_cores,
        })
    }

    async fn list_storages(&self, _node: &str) -> Result<Vec<String>> {
        Ok(self.host.lock().unwrap().storages.clone())
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        *self.vm_list_queries.lock().unwrap() += 1;
        Ok(self.host.lock().unwrap().vms.clone())
    }

    async fn create_vm(&self, spec: &CreateVmSpec) -> Result<()> {
        self.record(HypervisorCall::CreateVm(spec.clone()));
        self.add_vm(spec.vmid, &spec.name);
        Ok(())
    }

    async fn import_disk(&self, vmid: u32, image: &Path, storage: &str) -> Result<String> {
        self.record(HypervisorCall::ImportDisk {
            vmid,
            image: image.to_path_buf(),
            storage: storage.to_string(),
        });
        let output = self.import_output.lock().unwrap().clone();
        Ok(output.unwrap_or_else(|| {
            format!(
                "importing disk '{}' to VM {} ...\nSuccessfully imported disk as 'unused0:{}:vm-{}-disk-0'",
                image.display(),
                vmid,
                storage,
                vmid
            )
        }))
    }

    async fn set_options(&self, vmid: u32, options: &[VmOption]) -> Result<()> {
        let index = self
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, HypervisorCall::SetOptions { .. }))
            .count();
        self.record(HypervisorCall::SetOptions {
            vmid,
            options: options.to_vec(),
        });
        if self.should_fail(&FailOn::SetOptions(index)) {
            return Err(Self::failure("qm set"));
        }
        Ok(())
    }

    async fn resize_disk(&self, vmid: u32, disk: &str, size: &str) -> Result<()> {
        self.record(HypervisorCall::ResizeDisk {
            vmid,
            disk: disk.to_string(),
            size: size.to_string(),
        });
        if self.should_fail(&FailOn::Resize) {
            return Err(Self::failure("qm resize"));
        }
        Ok(())
    }

    async fn destroy_vm(&self, vmid: u32) -> Result<()> {
        self.record(HypervisorCall::DestroyVm { vmid });
        if self.should_fail(&FailOn::Destroy) {
            return Err(Self::failure("qm destroy"));
        }
        self.host.lock().unwrap().vms.retain(|vm| vm.vmid != vmid);
        Ok(())
    }
}
