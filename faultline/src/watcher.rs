//! Revert-on-abort watcher.
//!
//! Spawned alongside the executor, it sleeps until the abort token fires and
//! then sweeps every resolved target back to health. The sweep is
//! best-effort: a per-target failure is logged and the sweep continues,
//! because leaving target B disrupted to report an error about target A
//! would make an abort worse than the chaos itself.

use crate::abort::AbortToken;
use crate::events::{EventBus, EventKind};
use crate::poller;
use crate::resolver::TargetSet;
use crate::vcenter::DiskClient;
use faultline_common::{
    ChaosError, DiskAttachment, DiskTarget, ExperimentWindow, RunOutcome, TargetState,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AbortWatcher<C> {
    client: Arc<C>,
    targets: Arc<TargetSet>,
    window: ExperimentWindow,
    token: AbortToken,
    events: EventBus,
}

impl<C> AbortWatcher<C>
where
    C: DiskClient,
{
    pub fn new(
        client: Arc<C>,
        targets: Arc<TargetSet>,
        window: ExperimentWindow,
        token: AbortToken,
        events: EventBus,
    ) -> Self {
        Self {
            client,
            targets,
            window,
            token,
            events,
        }
    }

    /// Wait for the abort, then revert every target. Always resolves to
    /// [`RunOutcome::CancelledAndReverted`]; per-target failures are logged
    /// and counted, never returned.
    pub async fn run(self) -> RunOutcome {
        self.token.fired().await;

        warn!(targets = self.targets.len(), "abort fired; starting revert sweep");
        self.events.emit(
            EventKind::RevertStarted,
            &json!({ "targets": self.targets.len() }),
        );

        let mut failures = 0usize;
        for (index, target) in self.targets.targets().iter().enumerate() {
            if let Err(err) = self.revert_target(index, target).await {
                failures += 1;
                error!(
                    subject = %target.subject(),
                    error = %err,
                    "revert failed for target, continuing with the rest"
                );
                self.targets.mark(index, TargetState::Error).await;
            }
        }

        info!(failures, "revert sweep finished");
        self.events
            .emit(EventKind::RevertFinished, &json!({ "failures": failures }));
        RunOutcome::CancelledAndReverted
    }

    async fn revert_target(&self, index: usize, target: &DiskTarget) -> Result<(), ChaosError> {
        let subject = target.subject();

        // If we cannot observe, assume the worst and attempt the revert
        // anyway; the sweep exists to maximize restoration, not certainty.
        let state = match self.client.disk_state(&target.vm_id, &target.disk_id).await {
            Ok(state) => state,
            Err(err) => {
                warn!(subject = %subject, error = %err, "cannot observe target, attempting revert regardless");
                DiskAttachment::Detached
            }
        };

        if state == DiskAttachment::Attached {
            info!(subject = %subject, "already attached, nothing to revert");
            return Ok(());
        }

        // A detach may still be mid-flight; let it settle before attaching.
        if let Err(err) = poller::converge(
            &subject,
            DiskAttachment::Detached,
            self.window.poll_interval,
            self.window.poll_timeout,
            || self.client.disk_state(&target.vm_id, &target.disk_id),
        )
        .await
        {
            warn!(subject = %subject, error = %err, "detach never settled, attaching anyway");
        }

        self.client
            .attach_disk(&target.vm_id, &target.backing_path)
            .await?;

        poller::converge(
            &subject,
            DiskAttachment::Attached,
            self.window.poll_interval,
            self.window.poll_timeout,
            || self.client.disk_state(&target.vm_id, &target.disk_id),
        )
        .await?;

        self.targets.mark(index, TargetState::Restored).await;
        self.events
            .emit(EventKind::TargetReverted, &json!({ "target": subject }));
        Ok(())
    }
}
