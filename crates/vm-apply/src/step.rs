//! Provisioning steps

use serde::{Deserialize, Serialize};
use std::fmt;

use pve_vm_types::VmRequest;

/// One hypervisor call of the creation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionStep {
    /// `qm create`
    CreateVm,
    /// `qm importdisk`
    ImportDisk,
    /// SCSI controller and `scsi0`
    AttachDisk,
    SetBootOrder,
    /// `ide2` cloud-init drive
    AttachCloudInit,
    /// Boot order again, after the cloud-init drive was added
    ReassertBootOrder,
    ResizeDisk,
    /// User, password and SSH key
    ConfigureCloudInit,
    EnableUpgrade,
    /// `ipconfig0`
    ConfigureNetwork,
    /// `nameserver`
    ConfigureDns,
}

impl ProvisionStep {
    /// Steps to run for `request`, in order
    pub fn sequence(request: &VmRequest) -> Vec<ProvisionStep> {
        let mut steps = vec![
            ProvisionStep::CreateVm,
            ProvisionStep::ImportDisk,
            ProvisionStep::AttachDisk,
            ProvisionStep::SetBootOrder,
            ProvisionStep::AttachCloudInit,
            ProvisionStep::ReassertBootOrder,
            ProvisionStep::ResizeDisk,
            ProvisionStep::ConfigureCloudInit,
        ];
        if request.upgrade_packages {
            steps.push(ProvisionStep::EnableUpgrade);
        }
        steps.push(ProvisionStep::ConfigureNetwork);
        steps.push(ProvisionStep::ConfigureDns);
        steps
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProvisionStep::CreateVm => "create-vm",
            ProvisionStep::ImportDisk => "import-disk",
            ProvisionStep::AttachDisk => "attach-disk",
            ProvisionStep::SetBootOrder => "set-boot-order",
            ProvisionStep::AttachCloudInit => "attach-cloud-init",
            ProvisionStep::ReassertBootOrder => "reassert-boot-order",
            ProvisionStep::ResizeDisk => "resize-disk",
            ProvisionStep::ConfigureCloudInit => "configure-cloud-init",
            ProvisionStep::EnableUpgrade => "enable-upgrade",
            ProvisionStep::ConfigureNetwork => "configure-network",
            ProvisionStep::ConfigureDns => "configure-dns",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
