//! Proxmox VE VM provisioning SSH key store
//!
//! Key pairs live under `<root>/<name>/id_<name>` and `id_<name>.pub`. A name
//! only counts as available when both halves are present.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::process::Command;

use pve_vm_core::{KeyStore, ProvisionError, Result};
use pve_vm_types::SshKeyRecord;

#[cfg(test)]
mod tests;

/// Key store on the local filesystem
pub struct FsKeyStore {
    root: PathBuf,
    ssh_keygen_path: PathBuf,
}

impl FsKeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_keygen(root, "ssh-keygen")
    }

    pub fn with_keygen(root: impl Into<PathBuf>, ssh_keygen_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ssh_keygen_path: ssh_keygen_path.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record(&self, name: &str) -> SshKeyRecord {
        SshKeyRecord::new(name, self.root.join(name))
    }

    fn is_complete(record: &SshKeyRecord) -> bool {
        record.private_key_path().is_file() && record.public_key_path().is_file()
    }

    /// Public key file of a complete key pair
    pub fn public_key_path(&self, name: &str) -> Option<PathBuf> {
        self.find_key(name).map(|record| record.public_key_path())
    }

    fn check_name(name: &str) -> Result<()> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\');
        if invalid {
            return Err(ProvisionError::KeyGeneration {
                name: name.to_string(),
                reason: "key name must be a single path component".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for FsKeyStore {
    fn list_available_keys(&self) -> Result<Vec<SshKeyRecord>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Key store {} does not exist yet", self.root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let record = self.record(&name);
            if Self::is_complete(&record) {
                keys.push(record);
            } else {
                debug!("Skipping incomplete key directory {}", record.dir.display());
            }
        }

        keys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(keys)
    }

    fn find_key(&self, name: &str) -> Option<SshKeyRecord> {
        if Self::check_name(name).is_err() {
            return None;
        }
        let record = self.record(name);
        Self::is_complete(&record).then_some(record)
    }

    fn entry_exists(&self, name: &str) -> bool {
        Self::check_name(name).is_ok() && self.root.join(name).exists()
    }

    async fn generate_key(&self, name: &str) -> Result<SshKeyRecord> {
        Self::check_name(name)?;
        let record = self.record(name);
        let keygen_error = |reason: String| ProvisionError::KeyGeneration {
            name: name.to_string(),
            reason,
        };

        if record.dir.exists() {
            return Err(keygen_error(format!(
                "{} already exists",
                record.dir.display()
            )));
        }

        tokio::fs::create_dir_all(&record.dir)
            .await
            .map_err(|e| keygen_error(format!("cannot create {}: {}", record.dir.display(), e)))?;

        info!("Generating SSH key '{}' in {}", name, record.dir.display());

        let output = Command::new(&self.ssh_keygen_path)
            .arg("-t")
            .arg("rsa")
            .arg("-b")
            .arg("4096")
            .arg("-N")
            .arg("")
            .arg("-f")
            .arg(record.private_key_path())
            .arg("-q")
            .arg("-C")
            .arg(name)
            .stdin(Stdio::null())
            .output()
            .await;

        let failure = match output {
            Ok(output) if output.status.success() => None,
            Ok(output) => Some(format!(
                "{} exited with {}: {}",
                self.ssh_keygen_path.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )),
            Err(e) => Some(format!(
                "failed to run {}: {}",
                self.ssh_keygen_path.display(),
                e
            )),
        };

        if let Some(reason) = failure {
            if let Err(e) = tokio::fs::remove_dir_all(&record.dir).await {
                warn!(
                    "Failed to clean up key directory {}: {}",
                    record.dir.display(),
                    e
                );
            }
            return Err(keygen_error(reason));
        }

        if !Self::is_complete(&record) {
            return Err(keygen_error(format!(
                "key files missing in {} after generation",
                record.dir.display()
            )));
        }

        Ok(record)
    }
}
