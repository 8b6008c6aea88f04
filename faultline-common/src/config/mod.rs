//! Configuration for experiment runs.
//!
//! All knobs arrive through `FAULTLINE_`-prefixed environment variables
//! (the runner is designed to execute inside a job pod/unit with an injected
//! environment), with CLI flags able to override the experiment window.
//! Validation happens once, up front, so a bad window is a precondition
//! failure and never a mid-run surprise.

pub mod env;

pub use env::{EnvError, EnvParser};

use crate::types::{ExperimentWindow, SequenceMode};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading/validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment parsing failed: {}", format_env_errors(.0))]
    Env(Vec<EnvError>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn format_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Transport used to issue the host reboot action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootTransport {
    /// Shell out to the `govc` CLI.
    Govc,
    /// POST against the vCenter REST endpoint.
    Rest,
}

impl FromStr for RebootTransport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "govc" | "cli" => Ok(Self::Govc),
            "rest" | "http" => Ok(Self::Rest),
            other => Err(format!("unsupported reboot transport: {other}")),
        }
    }
}

/// vCenter connection settings.
#[derive(Debug, Clone)]
pub struct VcenterConfig {
    pub server: String,
    pub user: String,
    pub password: String,
    /// Skip TLS certificate verification (vCenter appliances commonly run
    /// self-signed certificates).
    pub insecure: bool,
}

/// The experiment window plus target input, resolved from the environment.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Wall-clock bound for the whole injection phase. The cycle loop
    /// re-checks elapsed time at cycle boundaries only.
    pub total_duration: Duration,
    /// How long targets stay disrupted within each cycle.
    pub cycle_interval: Duration,
    /// Spacing between convergence poll attempts.
    pub poll_interval: Duration,
    /// Attempt budget for one convergence poll: floor(poll_timeout / poll_interval).
    pub poll_timeout: Duration,
    /// Quiet period before the first disruptive call.
    pub ramp_time_before: Duration,
    /// Quiet period after the last restore.
    pub ramp_time_after: Duration,
    pub sequence: SequenceMode,

    /// Comma-separated disk ids (disk-loss experiment input).
    pub disk_ids: String,
    /// Comma-separated VM moids, parallel to `disk_ids`.
    pub vm_moids: String,

    /// Host name (host-reboot experiment input).
    pub host_name: String,
    pub host_datacenter: String,
    pub reboot_transport: RebootTransport,

    /// Operator-defined probe command, run at the during-chaos checkpoint.
    pub probe_command: Option<String>,

    pub vcenter: VcenterConfig,
}

impl ExperimentConfig {
    /// Load from the process environment and validate the window.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut parser = EnvParser::new();

        let config = Self {
            total_duration: parser.get_duration("CHAOS_DURATION", Duration::from_secs(30)),
            cycle_interval: parser.get_duration("CHAOS_INTERVAL", Duration::from_secs(10)),
            poll_interval: parser.get_duration("POLL_INTERVAL", Duration::from_secs(2)),
            poll_timeout: parser.get_duration("POLL_TIMEOUT", Duration::from_secs(180)),
            ramp_time_before: parser.get_duration("RAMP_TIME_BEFORE", Duration::ZERO),
            ramp_time_after: parser.get_duration("RAMP_TIME_AFTER", Duration::ZERO),
            sequence: parser.get_parsed(
                "SEQUENCE",
                SequenceMode::Parallel,
                "sequence mode (serial/parallel)",
            ),
            disk_ids: parser.get_string("DISK_IDS", ""),
            vm_moids: parser.get_string("VM_MOIDS", ""),
            host_name: parser.get_string("HOST_NAME", ""),
            host_datacenter: parser.get_string("HOST_DATACENTER", ""),
            reboot_transport: parser.get_parsed(
                "REBOOT_TRANSPORT",
                RebootTransport::Govc,
                "reboot transport (govc/rest)",
            ),
            probe_command: parser.get_opt_string("PROBE_CMD"),
            vcenter: VcenterConfig {
                server: parser.get_required("VCENTER_SERVER"),
                user: parser.get_required("VCENTER_USER"),
                password: parser.get_required("VCENTER_PASS"),
                insecure: parser.get_bool("VCENTER_INSECURE", true),
            },
        };

        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }

        config.validate()?;
        Ok(config)
    }

    /// Window invariants, checked before any disruption.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_duration.is_zero() {
            return Err(ConfigError::Invalid(
                "chaos duration must be non-zero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.poll_interval > self.poll_timeout {
            return Err(ConfigError::Invalid(format!(
                "poll interval ({}) exceeds poll timeout ({}); the convergence attempt budget would be zero",
                humantime::format_duration(self.poll_interval),
                humantime::format_duration(self.poll_timeout),
            )));
        }
        Ok(())
    }

    /// Convergence attempt budget implied by the window.
    pub fn poll_attempts(&self) -> u32 {
        (self.poll_timeout.as_secs_f64() / self.poll_interval.as_secs_f64()).floor() as u32
    }

    /// The time bounds the executor runs under.
    pub fn window(&self) -> ExperimentWindow {
        ExperimentWindow {
            total_duration: self.total_duration,
            cycle_interval: self.cycle_interval,
            poll_interval: self.poll_interval,
            poll_timeout: self.poll_timeout,
            sequence: self.sequence,
        }
    }
}
