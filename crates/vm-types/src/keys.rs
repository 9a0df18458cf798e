use serde::Serialize;
use std::path::PathBuf;

/// SSH key pair stored as `<keystore>/<name>/id_<name>{,.pub}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKeyRecord {
    pub name: String,
    pub dir: PathBuf,
}

impl SshKeyRecord {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
        }
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(format!("id_{}", self.name))
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(format!("id_{}.pub", self.name))
    }
}
