//! Core domain types for chaos experiments.
//!
//! State values that the original infrastructure reports as strings
//! ("attached", "CONNECTED", "POWERED_ON") are closed enumerations here so an
//! invalid state is unrepresentable and string-comparison drift cannot creep
//! into the lifecycle logic.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ── Identifiers ──────────────────────────────────────────────────────────

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

id_newtype!(
    /// Managed object id of a virtual machine (e.g. `vm-42`).
    VmId
);
id_newtype!(
    /// Identifier of a virtual disk attached to a VM (e.g. `2001`).
    DiskId
);
id_newtype!(
    /// Managed object id of an ESX host (e.g. `host-15`).
    HostId
);

// ── Target lifecycle state ───────────────────────────────────────────────

/// Per-target lifecycle state within one disrupt cycle.
///
/// Transitions flow forward only: `Unknown → Disrupted → Restored`. `Error`
/// is reachable from any state and is terminal for that target within the
/// current cycle, but does not block sibling targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Unknown,
    Disrupted,
    Restored,
    Error,
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Disrupted => write!(f, "disrupted"),
            Self::Restored => write!(f, "restored"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ── Remote state enumerations ────────────────────────────────────────────

/// Attachment state of a virtual disk as reported by vCenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskAttachment {
    Attached,
    Detached,
}

impl std::fmt::Display for DiskAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attached => write!(f, "attached"),
            Self::Detached => write!(f, "detached"),
        }
    }
}

/// Connection state of an ESX host. Wire values follow the vCenter REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostConnectionState {
    Connected,
    Disconnected,
    NotResponding,
}

impl std::fmt::Display for HostConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "CONNECTED"),
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::NotResponding => write!(f, "NOT_RESPONDING"),
        }
    }
}

/// Power state of a VM. Wire values follow the vCenter REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmPowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl std::fmt::Display for VmPowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PoweredOn => write!(f, "POWERED_ON"),
            Self::PoweredOff => write!(f, "POWERED_OFF"),
            Self::Suspended => write!(f, "SUSPENDED"),
        }
    }
}

// ── Execution strategy ───────────────────────────────────────────────────

/// How the executor walks the target list within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceMode {
    /// One target at a time, full disrupt→restore per target.
    Serial,
    /// Disrupt every target first, then restore every target.
    Parallel,
}

impl std::fmt::Display for SequenceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}

impl FromStr for SequenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "serial" | "sequential" => Ok(Self::Serial),
            "parallel" | "concurrent" => Ok(Self::Parallel),
            other => Err(format!("unsupported sequence mode: {other}")),
        }
    }
}

// ── Experiment window ────────────────────────────────────────────────────

/// Time bounds of one injection run.
///
/// `total_duration` bounds wall-clock elapsed time, not a cycle count: the
/// cycle loop re-checks elapsed time at cycle boundaries and may execute a
/// variable number of cycles.
#[derive(Debug, Clone, Copy)]
pub struct ExperimentWindow {
    pub total_duration: std::time::Duration,
    pub cycle_interval: std::time::Duration,
    pub poll_interval: std::time::Duration,
    pub poll_timeout: std::time::Duration,
    pub sequence: SequenceMode,
}

// ── Target descriptors ───────────────────────────────────────────────────

/// One disruptable disk together with everything needed to reverse the
/// disruption.
///
/// `backing_path` is the restore descriptor: it must be captured before the
/// first detach, because the attach call needs the VMDK file path and nothing
/// else re-derives it reliably once the disk is gone from the VM's hardware
/// list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskTarget {
    pub disk_id: DiskId,
    pub vm_id: VmId,
    pub backing_path: String,
}

impl DiskTarget {
    /// Human-readable subject for logs and errors, e.g. `disk 2001 of vm-42`.
    pub fn subject(&self) -> String {
        format!("disk {} of {}", self.disk_id, self.vm_id)
    }
}

/// Everything captured before a host reboot that restoration depends on.
///
/// The powered-on classification and the disk inventory are snapshotted once,
/// pre-disruption, and are immutable for the rest of the run: after the reboot
/// the pre-reboot power set is not re-derivable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRestorePlan {
    pub host_id: HostId,
    pub host_name: String,
    /// VMs that were powered on before the reboot and must be restarted.
    pub powered_on_vms: Vec<VmId>,
    /// VMs that were powered off or suspended; left alone on restore.
    pub other_vms: Vec<VmId>,
    /// Full disk inventory of every VM on the host, verified attached after
    /// the host reconnects.
    pub vm_disks: Vec<(VmId, Vec<DiskId>)>,
}

// ── Run outcome ──────────────────────────────────────────────────────────

/// Terminal result of one experiment run, returned to the caller.
///
/// The caller decides process exit codes; the engine never calls
/// `process::exit` itself.
#[derive(Debug)]
pub enum RunOutcome {
    /// The experiment ran its full duration and every target was restored.
    Completed,
    /// The operator aborted mid-flight; the revert pass has finished
    /// (possibly with logged per-target failures).
    CancelledAndReverted,
    /// The run failed; targets acted on before the failure may remain
    /// disrupted.
    Failed(crate::errors::ChaosError),
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CancelledAndReverted => "cancelled_and_reverted",
            Self::Failed(_) => "failed",
        }
    }
}
