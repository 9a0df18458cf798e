//! SSH key listing

use std::sync::Arc;

use anyhow::{Context, Result};

use pve_vm_core::KeyStore;

pub struct ListKeysCommand {
    key_store: Arc<dyn KeyStore>,
}

impl ListKeysCommand {
    pub fn new(key_store: Arc<dyn KeyStore>) -> Self {
        Self { key_store }
    }

    /// Names of the available key pairs, one per line
    pub fn render(&self) -> Result<String> {
        let keys = self
            .key_store
            .list_available_keys()
            .context("Failed to read SSH key store")?;

        if keys.is_empty() {
            return Ok("No SSH keys available.\n".to_string());
        }

        let mut out = format!("{:<24} {}\n", "Name", "Public key");
        out.push_str(&format!("{}\n", "-".repeat(60)));
        for key in keys {
            out.push_str(&format!(
                "{:<24} {}\n",
                key.name,
                key.public_key_path().display()
            ));
        }
        Ok(out)
    }

    pub fn execute(&self) -> Result<()> {
        print!("{}", self.render()?);
        Ok(())
    }
}
