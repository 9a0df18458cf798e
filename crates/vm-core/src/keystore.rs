//! SSH key store interface

use async_trait::async_trait;

use pve_vm_types::SshKeyRecord;

use crate::Result;

/// Named SSH key pairs on local disk
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Keys whose private and public halves are both present, sorted by name
    fn list_available_keys(&self) -> Result<Vec<SshKeyRecord>>;

    /// Complete key pair stored under `name`
    fn find_key(&self, name: &str) -> Option<SshKeyRecord>;

    /// Whether anything (even a partial key) occupies `name`
    fn entry_exists(&self, name: &str) -> bool;

    /// Generate a new passphrase-less key pair under `name`
    async fn generate_key(&self, name: &str) -> Result<SshKeyRecord>;
}
