//! Shared types, errors, and configuration for Faultline.
//!
//! Everything the experiment runner and the vCenter client wrappers agree on
//! lives here: the closed state enumerations, the target descriptors captured
//! before injection, the error taxonomy, and the environment-driven
//! configuration layer.

pub mod config;
pub mod errors;
pub mod types;

pub use config::{ConfigError, ExperimentConfig, RebootTransport, VcenterConfig};
pub use errors::ChaosError;
pub use types::{
    DiskAttachment, DiskId, DiskTarget, ExperimentWindow, HostConnectionState, HostId,
    HostRestorePlan, RunOutcome, SequenceMode, TargetState, VmId, VmPowerState,
};
