//! Environment variable parsing with type safety.
//!
//! Typed getters over `FAULTLINE_`-prefixed variables. Parse failures are
//! collected rather than returned one at a time so an operator sees every
//! misconfigured variable at once.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Invalid duration format.
    #[error("invalid duration for {var}: '{value}' (use seconds or e.g. '90s', '2m')")]
    InvalidDuration { var: String, value: String },

    /// A required variable is missing.
    #[error("missing required variable {var}")]
    Missing { var: String },
}

/// Type-safe environment variable parser.
///
/// Collects errors during parsing so all issues can be reported at once.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the FAULTLINE_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "FAULTLINE_",
            errors: Vec::new(),
        }
    }

    /// Check if any errors occurred.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Take ownership of errors.
    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    /// Get the full variable name with prefix.
    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> String {
        env::var(self.var_name(name)).unwrap_or_else(|_| default.to_string())
    }

    /// Get an optional string value; empty counts as unset.
    pub fn get_opt_string(&mut self, name: &str) -> Option<String> {
        match env::var(self.var_name(name)) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => None,
        }
    }

    /// Get a required string value; records an error when absent or empty.
    pub fn get_required(&mut self, name: &str) -> String {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => {
                self.errors.push(EnvError::Missing { var: var_name });
                String::new()
            }
        }
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> bool {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: "boolean (true/false/1/0/yes/no)".to_string(),
                        value,
                    });
                    default
                }
            },
            Err(_) => default,
        }
    }

    /// Get a duration with default. Accepts a bare integer (seconds) or a
    /// humantime string such as `90s` or `2m`.
    pub fn get_duration(&mut self, name: &str, default: Duration) -> Duration {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                if let Ok(secs) = value.trim().parse::<u64>() {
                    return Duration::from_secs(secs);
                }
                match humantime::parse_duration(value.trim()) {
                    Ok(duration) => duration,
                    Err(_) => {
                        self.errors.push(EnvError::InvalidDuration {
                            var: var_name,
                            value,
                        });
                        default
                    }
                }
            }
            Err(_) => default,
        }
    }

    /// Get a value parsed through `FromStr` with default.
    pub fn get_parsed<T>(&mut self, name: &str, default: T, expected: &str) -> T
    where
        T: std::str::FromStr,
    {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name,
                        expected: expected.to_string(),
                        value,
                    });
                    default
                }
            },
            Err(_) => default,
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}
