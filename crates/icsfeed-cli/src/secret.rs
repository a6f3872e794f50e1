//! Secret references in configuration values.
//!
//! A credential may name where the secret lives instead of holding it:
//!
//! - `env::VAR` reads `$VAR`
//! - `pass::entry` takes the first line of `pass show entry`
//! - anything else is the secret itself

use std::process::Command;

use crate::error::{CliError, CliResult};

/// Resolves `value`, following a reference prefix if there is one.
pub fn resolve(value: &str) -> CliResult<String> {
    if let Some(var) = value.strip_prefix("env::") {
        return std::env::var(var)
            .map_err(|_| CliError::Secret(format!("environment variable `{}` is not set", var)));
    }
    if let Some(entry) = value.strip_prefix("pass::") {
        return from_pass(entry);
    }
    Ok(value.to_string())
}

fn from_pass(entry: &str) -> CliResult<String> {
    let output = Command::new("pass")
        .args(["show", entry])
        .output()
        .map_err(|e| CliError::Secret(format!("cannot run `pass show {}`: {}", entry, e)))?;

    if !output.status.success() {
        return Err(CliError::Secret(format!(
            "`pass show {}` exited with {}: {}",
            entry,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| CliError::Secret(format!("`pass show {}` printed nothing", entry)))
}
