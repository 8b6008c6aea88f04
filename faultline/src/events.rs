//! Structured progress events, one JSON line per lifecycle transition.
//!
//! Everything the engine does is emitted here as well as logged, so an
//! external harness can follow a run without scraping logs. The vocabulary is
//! closed: emitters pick an [`EventKind`], never a free-form string, so the
//! wire names cannot drift between call sites.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

// A cycle emits a burst of per-target events; a channel smaller than this
// would let a slow subscriber lag right past the verdict.
const MIN_BUFFER: usize = 256;

/// The closed set of events a run can report. The wire name (the JSON
/// `event` field) is dot-namespaced by phase: `experiment.*` for the run
/// envelope, `chaos.*` for injection cycles, `abort.*` for the revert sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ExperimentStarted,
    ExperimentFinished,
    ExperimentFailed,
    CycleStarted,
    Injected,
    Reverted,
    RestoreSkipped,
    ProbePassed,
    RevertStarted,
    TargetReverted,
    RevertFinished,
}

impl EventKind {
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::ExperimentStarted => "experiment.started",
            EventKind::ExperimentFinished => "experiment.finished",
            EventKind::ExperimentFailed => "experiment.failed",
            EventKind::CycleStarted => "chaos.cycle_started",
            EventKind::Injected => "chaos.injected",
            EventKind::Reverted => "chaos.reverted",
            EventKind::RestoreSkipped => "chaos.restore_skipped",
            EventKind::ProbePassed => "chaos.probe_passed",
            EventKind::RevertStarted => "abort.revert_started",
            EventKind::TargetReverted => "abort.target_reverted",
            EventKind::RevertFinished => "abort.revert_finished",
        }
    }
}

/// Broadcast channel for experiment events, stamped with the run id.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
    run_id: Uuid,
}

impl EventBus {
    pub fn new(buffer: usize, run_id: Uuid) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(MIN_BUFFER));
        Self { sender, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit one event with its payload. Send failures (no subscribers) are
    /// normal; serialization failures can only come from the caller's payload
    /// type and drop the event with a warning.
    pub fn emit<T: Serialize>(&self, kind: EventKind, data: &T) {
        let payload = json!({
            "event": kind.wire_name(),
            "run_id": self.run_id,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(line) => {
                let _ = self.sender.send(line);
            }
            Err(err) => {
                warn!(event = kind.wire_name(), error = %err, "dropping unserializable event")
            }
        }
    }
}
