//! Operator input
//!
//! Every field is resolved the same way: a flag value is used when it
//! validates, otherwise the operator is asked until a valid value is entered.
//! Without a terminal nothing is asked and the first missing or invalid field
//! ends the run.

use std::future::Future;

use anyhow::{bail, Result};
use dialoguer::{Input, Password, Select};
use log::warn;

use pve_vm_core::ProvisionError;

/// Source of operator answers
pub trait Prompter: Send + Sync {
    /// Whether questions can be asked at all
    fn interactive(&self) -> bool;

    fn ask(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Hidden input, entered twice
    fn ask_secret(&self, prompt: &str) -> Result<String>;

    /// Index of the chosen item
    fn choose(&self, prompt: &str, items: &[String]) -> Result<usize>;
}

/// Terminal prompts
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn interactive(&self) -> bool {
        true
    }

    fn ask(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn ask_secret(&self, prompt: &str) -> Result<String> {
        Ok(Password::new()
            .with_prompt(prompt)
            .with_confirmation("Repeat password", "Passwords do not match")
            .allow_empty_password(true)
            .interact()?)
    }

    fn choose(&self, prompt: &str, items: &[String]) -> Result<usize> {
        Ok(Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(0)
            .interact()?)
    }
}

/// Used when stdin is not a terminal or `--non-interactive` is given
pub struct NonInteractivePrompter;

impl Prompter for NonInteractivePrompter {
    fn interactive(&self) -> bool {
        false
    }

    fn ask(&self, prompt: &str, _default: Option<&str>) -> Result<String> {
        bail!("cannot ask '{}' in non-interactive mode", prompt)
    }

    fn ask_secret(&self, prompt: &str) -> Result<String> {
        bail!("cannot ask '{}' in non-interactive mode", prompt)
    }

    fn choose(&self, prompt: &str, _items: &[String]) -> Result<usize> {
        bail!("cannot ask '{}' in non-interactive mode", prompt)
    }
}

/// One input field
#[derive(Debug, Clone)]
pub struct Field<'a> {
    /// Flag name without dashes
    pub flag: &'static str,
    /// Question shown to the operator
    pub label: &'a str,
    /// Value given on the command line
    pub value: Option<&'a str>,
    /// Suggested answer, only offered interactively
    pub default: Option<String>,
    /// Read with hidden input
    pub secret: bool,
}

impl<'a> Field<'a> {
    pub fn new(flag: &'static str, label: &'a str, value: Option<&'a str>) -> Self {
        Self {
            flag,
            label,
            value,
            default: None,
            secret: false,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// Resolve `field` through `check`
///
/// Only [`ProvisionError::Validation`] leads to another question; any other
/// error (a failed host query, for instance) is returned immediately.
pub async fn resolve<T, F, Fut>(prompter: &dyn Prompter, field: Field<'_>, check: F) -> Result<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = pve_vm_core::Result<T>>,
{
    if let Some(raw) = field.value {
        match check(raw.to_string()).await {
            Ok(value) => return Ok(value),
            Err(ProvisionError::Validation(e)) => {
                if !prompter.interactive() {
                    bail!("Invalid value for --{}: {}", field.flag, e);
                }
                warn!("Ignoring invalid --{} value: {}", field.flag, e);
                eprintln!("Invalid value for --{}: {}", field.flag, e);
            }
            Err(e) => return Err(e.into()),
        }
    } else if !prompter.interactive() {
        bail!("--{} is required in non-interactive mode", field.flag);
    }

    loop {
        let raw = if field.secret {
            prompter.ask_secret(field.label)?
        } else {
            prompter.ask(field.label, field.default.as_deref())?
        };
        match check(raw).await {
            Ok(value) => return Ok(value),
            Err(ProvisionError::Validation(e)) => eprintln!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }
}
