//! Field validators
//!
//! Pure checks of a single raw input value against explicit bounds. Each
//! validator returns the parsed value on success.

use regex::Regex;

use pve_vm_core::ValidationError;
use pve_vm_types::{SupportedOsImage, VmSummary, MAX_VM_ID, MIN_VM_ID};

/// Validator for individual request fields
pub struct FieldValidator {
    integer_regex: Regex,
    decimal_regex: Regex,
    ipv4_regex: Regex,
}

impl FieldValidator {
    pub fn new() -> Self {
        Self {
            integer_regex: Regex::new(r"^[0-9]+$").unwrap(),
            decimal_regex: Regex::new(r"^[0-9]+(\.[0-9]+)?$").unwrap(),
            ipv4_regex: Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+\.[0-9]+$").unwrap(),
        }
    }

    /// VM id: integer in 100..=999 not used by any existing VM
    pub fn validate_id(&self, raw: &str, existing: &[VmSummary]) -> Result<u32, ValidationError> {
        let id = self.parse_integer("VM id", raw)?;
        if !(MIN_VM_ID..=MAX_VM_ID).contains(&id) {
            return Err(ValidationError::OutOfRange {
                field: "VM id",
                value: id.to_string(),
                range: format!("{}..={}", MIN_VM_ID, MAX_VM_ID),
            });
        }
        if existing.iter().any(|vm| vm.vmid == id) {
            return Err(ValidationError::InUse {
                field: "VM id",
                value: id.to_string(),
            });
        }
        Ok(id)
    }

    /// VM name: non-empty and not exactly equal to an existing name
    pub fn validate_name(
        &self,
        raw: &str,
        existing: &[VmSummary],
    ) -> Result<String, ValidationError> {
        let name = non_empty("VM name", raw)?;
        if existing.iter().any(|vm| vm.name.as_deref() == Some(name)) {
            return Err(ValidationError::InUse {
                field: "VM name",
                value: name.to_string(),
            });
        }
        Ok(name.to_string())
    }

    /// RAM in GB: at least 1 MB once converted, at most the host maximum
    pub fn validate_ram(&self, raw: &str, max_ram_gb: u64) -> Result<f64, ValidationError> {
        let ram = self.parse_decimal("RAM", raw)?;
        let whole_mb = (ram * 1024.0).floor();
        if whole_mb < 1.0 || ram > max_ram_gb as f64 {
            return Err(ValidationError::OutOfRange {
                field: "RAM",
                value: raw.trim().to_string(),
                range: format!("1 MB <= RAM <= {} GB", max_ram_gb),
            });
        }
        Ok(ram)
    }

    /// Core count: integer with 1 <= cores <= host maximum
    pub fn validate_cores(&self, raw: &str, max_cores: u32) -> Result<u32, ValidationError> {
        let cores = self.parse_integer("Cores", raw)?;
        if cores < 1 || cores > max_cores {
            return Err(ValidationError::OutOfRange {
                field: "Cores",
                value: cores.to_string(),
                range: format!("1..={}", max_cores),
            });
        }
        Ok(cores)
    }

    /// Disk size in GB: number greater than zero
    pub fn validate_disk_size(&self, raw: &str) -> Result<f64, ValidationError> {
        let size = self.parse_decimal("Disk size", raw)?;
        if size <= 0.0 {
            return Err(ValidationError::OutOfRange {
                field: "Disk size",
                value: raw.trim().to_string(),
                range: "> 0 GB".to_string(),
            });
        }
        Ok(size)
    }

    pub fn validate_storage(
        &self,
        raw: &str,
        storages: &[String],
    ) -> Result<String, ValidationError> {
        let storage = non_empty("Storage", raw)?;
        if !storages.iter().any(|s| s == storage) {
            return Err(ValidationError::UnknownStorage {
                storage: storage.to_string(),
                available: storages.join(", "),
            });
        }
        Ok(storage.to_string())
    }

    pub fn validate_user(&self, raw: &str) -> Result<String, ValidationError> {
        non_empty("User", raw).map(str::to_string)
    }

    /// Accepts exactly y, Y, n or N
    pub fn validate_yes_no(&self, raw: &str) -> Result<bool, ValidationError> {
        match raw.trim() {
            "y" | "Y" => Ok(true),
            "n" | "N" => Ok(false),
            other => Err(ValidationError::InvalidYesNo {
                value: other.to_string(),
            }),
        }
    }

    pub fn validate_os_codename(
        &self,
        raw: &str,
    ) -> Result<&'static SupportedOsImage, ValidationError> {
        SupportedOsImage::lookup(raw.trim()).ok_or_else(|| ValidationError::UnsupportedOs {
            value: raw.trim().to_string(),
            supported: SupportedOsImage::codenames().join(", "),
        })
    }

    /// SSH key name: one non-empty path component below the key store root
    pub fn validate_ssh_key_name(&self, raw: &str) -> Result<String, ValidationError> {
        let name = non_empty("SSH key name", raw)?;
        if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
            return Err(ValidationError::InvalidSshKeyName {
                name: name.to_string(),
            });
        }
        Ok(name.to_string())
    }

    /// IPv4 address, format only: four dot-separated numbers
    pub fn validate_ip(&self, raw: &str) -> Result<String, ValidationError> {
        let ip = raw.trim();
        if !self.ipv4_regex.is_match(ip) {
            return Err(ValidationError::InvalidIp {
                value: ip.to_string(),
            });
        }
        Ok(ip.to_string())
    }

    /// Whitespace separated list of at least one IPv4 address
    pub fn validate_dns_servers(&self, raw: &str) -> Result<Vec<String>, ValidationError> {
        let servers: Vec<&str> = raw.split_whitespace().collect();
        if servers.is_empty() {
            return Err(ValidationError::Empty {
                field: "DNS servers",
            });
        }
        servers.into_iter().map(|s| self.validate_ip(s)).collect()
    }

    fn parse_integer(&self, field: &'static str, raw: &str) -> Result<u32, ValidationError> {
        let value = raw.trim();
        if !self.integer_regex.is_match(value) {
            return Err(ValidationError::NotANumber {
                field,
                expected: "an integer",
                value: value.to_string(),
            });
        }
        // Digits only, so the parse can only fail on overflow
        value.parse::<u32>().map_err(|_| ValidationError::OutOfRange {
            field,
            value: value.to_string(),
            range: format!("<= {}", u32::MAX),
        })
    }

    fn parse_decimal(&self, field: &'static str, raw: &str) -> Result<f64, ValidationError> {
        let value = raw.trim();
        if !self.decimal_regex.is_match(value) {
            return Err(ValidationError::NotANumber {
                field,
                expected: "a number",
                value: value.to_string(),
            });
        }
        value.parse::<f64>().map_err(|_| ValidationError::NotANumber {
            field,
            expected: "a number",
            value: value.to_string(),
        })
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty<'a>(field: &'static str, raw: &'a str) -> Result<&'a str, ValidationError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(value)
}
