//! Validation against live host state
//!
//! VM id and name uniqueness are checked against a fresh VM list on every
//! call. Storage, RAM and core limits come from the per-run discovery
//! snapshot.

use std::sync::Arc;

use log::debug;

use pve_vm_core::{HypervisorClient, KeyStore, Result, ValidationError};
use pve_vm_types::{HostCapabilities, SshKeyRecord, SupportedOsImage};

use crate::syntax::FieldValidator;

/// Field validation bound to one host and key store
pub struct HostValidator {
    client: Arc<dyn HypervisorClient>,
    key_store: Arc<dyn KeyStore>,
    capabilities: HostCapabilities,
    fields: FieldValidator,
}

impl HostValidator {
    pub fn new(
        client: Arc<dyn HypervisorClient>,
        key_store: Arc<dyn KeyStore>,
        capabilities: HostCapabilities,
    ) -> Self {
        Self {
            client,
            key_store,
            capabilities,
            fields: FieldValidator::new(),
        }
    }

    pub fn capabilities(&self) -> &HostCapabilities {
        &self.capabilities
    }

    pub fn fields(&self) -> &FieldValidator {
        &self.fields
    }

    pub async fn check_id(&self, raw: &str) -> Result<u32> {
        let vms = self.client.list_vms().await?;
        debug!("Checking VM id '{}' against {} existing VMs", raw, vms.len());
        Ok(self.fields.validate_id(raw, &vms)?)
    }

    pub async fn check_name(&self, raw: &str) -> Result<String> {
        let vms = self.client.list_vms().await?;
        debug!("Checking VM name '{}' against {} existing VMs", raw, vms.len());
        Ok(self.fields.validate_name(raw, &vms)?)
    }

    pub fn check_ram(&self, raw: &str) -> Result<f64> {
        Ok(self.fields.validate_ram(raw, self.capabilities.max_ram_gb)?)
    }

    pub fn check_cores(&self, raw: &str) -> Result<u32> {
        Ok(self
            .fields
            .validate_cores(raw, self.capabilities.max_cores)?)
    }

    pub fn check_storage(&self, raw: &str) -> Result<String> {
        Ok(self
            .fields
            .validate_storage(raw, &self.capabilities.storages)?)
    }

    pub fn check_os_codename(&self, raw: &str) -> Result<&'static SupportedOsImage> {
        Ok(self.fields.validate_os_codename(raw)?)
    }

    /// Name of a complete key pair in the key store
    pub fn check_existing_key(&self, raw: &str) -> Result<SshKeyRecord> {
        let name = self.fields.validate_ssh_key_name(raw)?;
        self.key_store
            .find_key(&name)
            .ok_or_else(|| ValidationError::MissingSshKey { name }.into())
    }

    /// Name not yet occupied in the key store
    pub fn check_new_key(&self, raw: &str) -> Result<String> {
        let name = self.fields.validate_ssh_key_name(raw)?;
        if self.key_store.entry_exists(&name) {
            return Err(ValidationError::SshKeyExists { name }.into());
        }
        Ok(name)
    }
}
