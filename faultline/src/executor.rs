//! The injection executor: drives disrupt cycles until the window closes.
//!
//! The total duration bounds wall-clock time, not a cycle count; elapsed time
//! and the abort token are re-checked at cycle boundaries only, so a cycle
//! that has started always runs to completion (or failure). Failures fail
//! fast without cleanup: restoring after a failed action would mask the
//! degraded state the experiment exists to expose.

use crate::abort::AbortToken;
use crate::events::{EventBus, EventKind};
use crate::poller;
use crate::probe::{ProbePhase, ProbeRunner};
use crate::resolver::TargetSet;
use crate::vcenter::DiskClient;
use faultline_common::{
    ChaosError, DiskAttachment, DiskTarget, ExperimentWindow, SequenceMode, TargetState,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

pub struct InjectionExecutor<C, P> {
    client: Arc<C>,
    probe: Arc<P>,
    targets: Arc<TargetSet>,
    window: ExperimentWindow,
    token: AbortToken,
    events: EventBus,
}

impl<C, P> InjectionExecutor<C, P>
where
    C: DiskClient,
    P: ProbeRunner,
{
    pub fn new(
        client: Arc<C>,
        probe: Arc<P>,
        targets: Arc<TargetSet>,
        window: ExperimentWindow,
        token: AbortToken,
        events: EventBus,
    ) -> Self {
        Self {
            client,
            probe,
            targets,
            window,
            token,
            events,
        }
    }

    /// Run disrupt cycles until the window elapses or the abort fires.
    ///
    /// Returning `Ok` means injection stopped cleanly; whether that was
    /// completion or cancellation is the caller's to distinguish via the
    /// token.
    pub async fn run(&self) -> Result<(), ChaosError> {
        let started = Instant::now();
        let mut cycle = 0u32;

        while started.elapsed() < self.window.total_duration {
            if self.token.is_fired() {
                info!(cycle, "cancellation observed at cycle boundary; stopping injection");
                return Ok(());
            }
            cycle += 1;
            info!(cycle, mode = %self.window.sequence, "starting disrupt cycle");
            self.events.emit(
                EventKind::CycleStarted,
                &json!({ "cycle": cycle, "mode": self.window.sequence }),
            );

            match self.window.sequence {
                SequenceMode::Serial => self.serial_cycle().await?,
                SequenceMode::Parallel => self.parallel_cycle().await?,
            }
        }

        info!(cycles = cycle, "injection window elapsed");
        Ok(())
    }

    /// One target at a time: disrupt, hold, restore, then the next target.
    /// The probe runs once, after the first target is confirmed disrupted.
    async fn serial_cycle(&self) -> Result<(), ChaosError> {
        for (index, target) in self.targets.targets().iter().enumerate() {
            self.disrupt(index, target).await?;
            if index == 0 {
                self.probe_checkpoint().await?;
            }
            self.hold().await;
            self.restore(index, target).await?;
        }
        Ok(())
    }

    /// Disrupt every target, hold once, then restore every target. Every
    /// detach is issued before any convergence wait, so the disruptions land
    /// as one concurrent batch and one slow disk cannot delay another's
    /// outage. The probe runs once, after all targets are confirmed
    /// disrupted.
    async fn parallel_cycle(&self) -> Result<(), ChaosError> {
        for (index, target) in self.targets.targets().iter().enumerate() {
            self.issue_detach(index, target).await?;
        }
        for (index, target) in self.targets.targets().iter().enumerate() {
            self.confirm_detached(index, target).await?;
        }
        self.probe_checkpoint().await?;
        self.hold().await;
        for (index, target) in self.targets.targets().iter().enumerate() {
            self.restore(index, target).await?;
        }
        Ok(())
    }

    async fn hold(&self) {
        info!(
            interval = %humantime::format_duration(self.window.cycle_interval),
            "holding disruption for the chaos interval"
        );
        tokio::time::sleep(self.window.cycle_interval).await;
    }

    /// Serial disruption: detach and wait for the disk to actually go, as one
    /// step.
    async fn disrupt(&self, index: usize, target: &DiskTarget) -> Result<(), ChaosError> {
        self.issue_detach(index, target).await?;
        self.confirm_detached(index, target).await
    }

    async fn issue_detach(&self, index: usize, target: &DiskTarget) -> Result<(), ChaosError> {
        info!(subject = %target.subject(), "detaching disk");
        if let Err(err) = self
            .client
            .detach_disk(&target.vm_id, &target.disk_id)
            .await
        {
            return Err(self.fail_target(index, err).await);
        }
        self.targets.mark(index, TargetState::Disrupted).await;
        Ok(())
    }

    async fn confirm_detached(&self, index: usize, target: &DiskTarget) -> Result<(), ChaosError> {
        let subject = target.subject();
        let confirmed = poller::converge(
            &subject,
            DiskAttachment::Detached,
            self.window.poll_interval,
            self.window.poll_timeout,
            || self.client.disk_state(&target.vm_id, &target.disk_id),
        )
        .await;
        if let Err(err) = confirmed {
            return Err(self.fail_target(index, err).await);
        }
        self.events
            .emit(EventKind::Injected, &json!({ "target": subject }));
        Ok(())
    }

    async fn restore(&self, index: usize, target: &DiskTarget) -> Result<(), ChaosError> {
        let subject = target.subject();

        let state = match self.client.disk_state(&target.vm_id, &target.disk_id).await {
            Ok(state) => state,
            Err(err) => return Err(self.fail_target(index, err).await),
        };

        if state == DiskAttachment::Attached {
            // Something else put the disk back (the revert watcher, or an
            // operator); issuing another attach would double-apply.
            info!(subject = %subject, "disk already attached, skipping restore");
            self.events
                .emit(EventKind::RestoreSkipped, &json!({ "target": subject }));
        } else {
            info!(subject = %subject, "attaching disk back");
            if let Err(err) = self
                .client
                .attach_disk(&target.vm_id, &target.backing_path)
                .await
            {
                return Err(self.fail_target(index, err).await);
            }
            let confirmed = poller::converge(
                &subject,
                DiskAttachment::Attached,
                self.window.poll_interval,
                self.window.poll_timeout,
                || self.client.disk_state(&target.vm_id, &target.disk_id),
            )
            .await;
            if let Err(err) = confirmed {
                return Err(self.fail_target(index, err).await);
            }
            self.events
                .emit(EventKind::Reverted, &json!({ "target": subject }));
        }

        self.targets.mark(index, TargetState::Restored).await;
        Ok(())
    }

    async fn probe_checkpoint(&self) -> Result<(), ChaosError> {
        self.probe.run(ProbePhase::DuringChaos).await?;
        self.events
            .emit(EventKind::ProbePassed, &json!({ "phase": "during-chaos" }));
        Ok(())
    }

    async fn fail_target(&self, index: usize, err: ChaosError) -> ChaosError {
        self.targets.mark(index, TargetState::Error).await;
        err
    }
}
