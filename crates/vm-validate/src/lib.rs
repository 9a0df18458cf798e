//! Proxmox VE VM provisioning validation
//!
//! Field validators, host-aware checks and whole-request validation

pub mod host;
pub mod syntax;


pub use host::HostValidator;
pub use syntax::FieldValidator;

use pve_vm_core::{KeyStore, ValidationError};
use pve_vm_types::{HostCapabilities, NetworkMode, VmRequest};

/// Whole-request validator, applied before any hypervisor mutation
pub struct RequestValidator {
    fields: FieldValidator,
}

impl RequestValidator {
    pub fn new() -> Self {
        Self {
            fields: FieldValidator::new(),
        }
    }

    /// Re-check every field of an assembled request against a host snapshot,
    /// reporting all violations at once
    pub fn validate_request(
        &self,
        request: &VmRequest,
        host: &HostCapabilities,
        key_store: &dyn KeyStore,
    ) -> Result<(), ValidationError> {
        let f = &self.fields;
        let mut errors = Vec::new();

        let mut push = |result: Result<(), ValidationError>| {
            if let Err(e) = result {
                errors.push(e.to_string());
            }
        };

        push(f.validate_id(&request.id.to_string(), &host.vms).map(drop));
        push(f.validate_name(&request.name, &host.vms).map(drop));
        push(f.validate_ram(&request.ram_gb.to_string(), host.max_ram_gb).map(drop));
        push(f.validate_cores(&request.cores.to_string(), host.max_cores).map(drop));
        push(f.validate_disk_size(&request.disk_size_gb.to_string()).map(drop));
        push(f.validate_storage(&request.storage, &host.storages).map(drop));
        push(f.validate_user(&request.user).map(drop));
        push(f.validate_os_codename(&request.os_codename).map(drop));

        if key_store.find_key(&request.ssh_key_name).is_none() {
            push(Err(ValidationError::MissingSshKey {
                name: request.ssh_key_name.clone(),
            }));
        }

        if let NetworkMode::Static { ip, gateway_ip } = &request.network.mode {
            push(f.validate_ip(ip).map(drop));
            push(f.validate_ip(gateway_ip).map(drop));
        }
        push(
            f.validate_dns_servers(&request.network.dns_servers.join(" "))
                .map(drop),
        );

        if !errors.is_empty() {
            return Err(ValidationError::Request(errors));
        }

        log::info!("Request for VM {} passed validation", request.id);
        Ok(())
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new()
    }
}
