//! Health-probe checkpoints.
//!
//! The executor runs the probe at most once per cycle, at the during-chaos
//! checkpoint (after the first target is confirmed disrupted in serial mode,
//! after all targets are confirmed disrupted in parallel mode). The pre- and
//! post-chaos checkpoints bracket the whole run.

use faultline_common::ChaosError;
use std::future::Future;
use tokio::process::Command;
use tracing::{debug, info};

/// Which checkpoint a probe invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    PreChaos,
    DuringChaos,
    PostChaos,
}

impl std::fmt::Display for ProbePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreChaos => write!(f, "pre-chaos"),
            Self::DuringChaos => write!(f, "during-chaos"),
            Self::PostChaos => write!(f, "post-chaos"),
        }
    }
}

/// Steady-state check run at lifecycle checkpoints. A probe failure fails the
/// run the same way an action failure does.
pub trait ProbeRunner: Send + Sync {
    fn run(&self, phase: ProbePhase) -> impl Future<Output = Result<(), ChaosError>> + Send;
}

/// Probe used when the operator configured no probe command.
pub struct NoopProbe;

impl ProbeRunner for NoopProbe {
    async fn run(&self, phase: ProbePhase) -> Result<(), ChaosError> {
        debug!(%phase, "no probe configured, checkpoint passes trivially");
        Ok(())
    }
}

/// Runs an operator-supplied shell command; a non-zero exit fails the
/// checkpoint.
pub struct CommandProbe {
    command: String,
}

impl CommandProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ProbeRunner for CommandProbe {
    async fn run(&self, phase: ProbePhase) -> Result<(), ChaosError> {
        info!(%phase, command = %self.command, "running probe checkpoint");
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|err| {
                ChaosError::action("probe", format!("{phase} checkpoint"), err)
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ChaosError::action(
                "probe",
                format!("{phase} checkpoint"),
                format!(
                    "exit status {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ))
        }
    }
}

/// Probe selected from configuration, dispatched statically.
pub enum ConfiguredProbe {
    Noop(NoopProbe),
    Command(CommandProbe),
}

impl ConfiguredProbe {
    pub fn from_command(command: Option<&str>) -> Self {
        match command {
            Some(command) => Self::Command(CommandProbe::new(command)),
            None => Self::Noop(NoopProbe),
        }
    }
}

impl ProbeRunner for ConfiguredProbe {
    async fn run(&self, phase: ProbePhase) -> Result<(), ChaosError> {
        match self {
            Self::Noop(probe) => probe.run(phase).await,
            Self::Command(probe) => probe.run(phase).await,
        }
    }
}
