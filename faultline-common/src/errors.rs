//! Error taxonomy for the injection/verification/revert lifecycle.
//!
//! Four failure classes, none of which retries beyond the bounded convergence
//! poll: a precondition failure surfaces before any disruption happens, an
//! observation failure is fatal because acting on unknowable state is unsafe,
//! a convergence timeout fails the current cycle, and an action failure
//! fails fast and abandons the remaining targets of the cycle.

use std::time::Duration;
use thiserror::Error;

/// Typed failure surface of the chaos engine.
#[derive(Debug, Error)]
pub enum ChaosError {
    /// Malformed or mismatched target input, or an unresolvable owner.
    /// Raised before any disruptive call is issued.
    #[error("precondition failed: {reason}")]
    Precondition { reason: String },

    /// A state query against the remote system failed. Fatal for the current
    /// action: the engine never keeps acting on a target whose state it
    /// cannot observe.
    #[error("failed to observe {subject}: {reason}")]
    ObservationFailed { subject: String, reason: String },

    /// The attempt budget of a convergence poll ran out before the target
    /// reached the expected state.
    #[error(
        "{subject} did not reach {expected} within {attempts} attempts ({})",
        humantime::format_duration(*timeout)
    )]
    ConvergenceTimeout {
        subject: String,
        expected: String,
        attempts: u32,
        timeout: Duration,
    },

    /// A disrupt or restore call itself errored.
    #[error("{action} failed for {subject}: {reason}")]
    ActionFailed {
        action: String,
        subject: String,
        reason: String,
    },
}

impl ChaosError {
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition {
            reason: reason.into(),
        }
    }

    pub fn observation(subject: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ObservationFailed {
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }

    pub fn action(
        action: impl Into<String>,
        subject: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::ActionFailed {
            action: action.into(),
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable class name for event payloads and verdict reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition { .. } => "precondition",
            Self::ObservationFailed { .. } => "observation_failed",
            Self::ConvergenceTimeout { .. } => "convergence_timeout",
            Self::ActionFailed { .. } => "action_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_subject_and_budget() {
        let err = ChaosError::ConvergenceTimeout {
            subject: "disk 2001 of vm-42".to_string(),
            expected: "detached".to_string(),
            attempts: 90,
            timeout: Duration::from_secs(180),
        };
        let msg = err.to_string();
        assert!(msg.contains("disk 2001 of vm-42"));
        assert!(msg.contains("detached"));
        assert!(msg.contains("90 attempts"));
        assert!(msg.contains("3m"));
    }

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(ChaosError::precondition("x").kind(), "precondition");
        assert_eq!(
            ChaosError::observation("disk", "http 503").kind(),
            "observation_failed"
        );
        assert_eq!(
            ChaosError::action("detach", "disk", "http 500").kind(),
            "action_failed"
        );
    }

    #[test]
    fn action_failed_display_names_the_action() {
        let err = ChaosError::action("start-vm", "vm-7", "insufficient resources");
        assert_eq!(
            err.to_string(),
            "start-vm failed for vm-7: insufficient resources"
        );
    }
}
