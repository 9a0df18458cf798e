//! JSON lines journal of a provisioning run

use std::path::{Path, PathBuf};

use chrono::Utc;
use log::warn;
use serde_json::json;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::provision::ProvisionRun;
use crate::step::ProvisionStep;

/// Append-only journal file, one JSON object per line
///
/// Write failures are logged and otherwise ignored so a full disk never
/// interrupts a half-finished VM creation.
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Journal for `run` under `dir`, named `<vmid>-<timestamp>.log`
    pub async fn create(dir: &Path, run: &ProvisionRun) -> Option<Self> {
        if let Err(e) = fs::create_dir_all(dir).await {
            warn!("Cannot create journal directory {}: {}", dir.display(), e);
            return None;
        }
        let path = dir.join(format!(
            "{}-{}.log",
            run.vmid,
            run.started_at.format("%Y%m%dT%H%M%S")
        ));
        Some(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record(&self, run: &ProvisionRun, step: Option<ProvisionStep>, message: &str) {
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "run_id": run.id,
            "vmid": run.vmid,
            "state": run.state,
            "step": step,
            "message": message,
        });

        if let Err(e) = self.append(&format!("{}\n", entry)).await {
            warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
