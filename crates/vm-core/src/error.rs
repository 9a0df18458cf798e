//! Error types for VM provisioning

use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unsupported OS codename '{codename}' (supported: {supported})")]
    UnsupportedOs { codename: String, supported: String },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Disk import for VM {vmid} did not report a disk identifier: {output}")]
    DiskImport { vmid: u32, output: String },

    #[error("Host query '{query}' failed: {reason}")]
    HostQuery { query: String, reason: String },

    #[error("Command '{command}' failed with exit code {exit_code:?}: {stderr}")]
    Command {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("SSH key generation for '{name}' failed: {reason}")]
    KeyGeneration { name: String, reason: String },

    #[error("Provisioning aborted at step '{step}' (rolled back: {rolled_back}): {source}")]
    Aborted {
        step: String,
        completed: Vec<String>,
        rolled_back: bool,
        #[source]
        source: Box<ProvisionError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProvisionError {
    /// Innermost error, looking through `Aborted` wrappers
    pub fn root(&self) -> &ProvisionError {
        match self {
            ProvisionError::Aborted { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn host_query(query: impl Into<String>, reason: impl ToString) -> Self {
        ProvisionError::HostQuery {
            query: query.into(),
            reason: reason.to_string(),
        }
    }
}

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be {expected}, got '{value}'")]
    NotANumber {
        field: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{field} {value} is out of range ({range})")]
    OutOfRange {
        field: &'static str,
        value: String,
        range: String,
    },

    #[error("{field} '{value}' is already used by an existing VM")]
    InUse { field: &'static str, value: String },

    #[error("Storage '{storage}' does not exist on this host (available: {available})")]
    UnknownStorage { storage: String, available: String },

    #[error("'{value}' is not an IPv4 address (expected four dot-separated numbers)")]
    InvalidIp { value: String },

    #[error("Expected one of y, Y, n, N, got '{value}'")]
    InvalidYesNo { value: String },

    #[error("OS codename '{value}' is not supported (supported: {supported})")]
    UnsupportedOs { value: String, supported: String },

    #[error("SSH key '{name}' not found in key store")]
    MissingSshKey { name: String },

    #[error("SSH key '{name}' already exists in key store")]
    SshKeyExists { name: String },

    #[error("SSH key name '{name}' must be a single path component")]
    InvalidSshKeyName { name: String },

    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("Request validation failed: {}", .0.join("; "))]
    Request(Vec<String>),
}
