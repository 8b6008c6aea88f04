//! The disk-loss experiment lifecycle.
//!
//! Orchestration order: ramp in, resolve targets (capturing restore
//! descriptors), spawn the revert watcher, run the injection executor, then
//! reconcile the two. Cancellation outranks everything else: once the abort
//! token has fired the run can finish only as cancelled-and-reverted, and the
//! watcher's sweep is awaited before the outcome is reported.

use crate::abort::AbortToken;
use crate::events::{EventBus, EventKind};
use crate::executor::InjectionExecutor;
use crate::probe::{ProbePhase, ProbeRunner};
use crate::resolver;
use crate::vcenter::DiskClient;
use crate::watcher::AbortWatcher;
use faultline_common::{ExperimentConfig, RunOutcome};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Run one disk-loss experiment to completion, cancellation, or failure.
pub async fn run<C, P>(
    client: Arc<C>,
    probe: Arc<P>,
    config: &ExperimentConfig,
    token: AbortToken,
    events: EventBus,
) -> RunOutcome
where
    C: DiskClient + 'static,
    P: ProbeRunner + 'static,
{
    if let Err(err) = probe.run(ProbePhase::PreChaos).await {
        return RunOutcome::Failed(err);
    }

    if !config.ramp_time_before.is_zero() {
        info!(
            ramp = %humantime::format_duration(config.ramp_time_before),
            "waiting for the ramp time before injection"
        );
        tokio::time::sleep(config.ramp_time_before).await;
    }

    let targets = match resolver::resolve_disk_targets(
        client.as_ref(),
        &config.disk_ids,
        &config.vm_moids,
    )
    .await
    {
        Ok(targets) => Arc::new(targets),
        Err(err) => return RunOutcome::Failed(err),
    };

    events.emit(
        EventKind::ExperimentStarted,
        &json!({ "kind": "disk-loss", "targets": targets.len(), "mode": config.sequence }),
    );

    let window = config.window();
    let watcher = AbortWatcher::new(
        client.clone(),
        targets.clone(),
        window,
        token.clone(),
        events.clone(),
    );
    let mut watcher_task = tokio::spawn(watcher.run());

    let executor = InjectionExecutor::new(
        client.clone(),
        probe.clone(),
        targets.clone(),
        window,
        token.clone(),
        events.clone(),
    );

    let executor_result = tokio::select! {
        // The watcher only finishes after the abort fired and the sweep ran;
        // the executor is dropped mid-cycle here, which is safe because the
        // sweep has already restored whatever the cycle had disrupted.
        joined = &mut watcher_task => {
            warn!("revert sweep finished while injection was mid-cycle");
            return joined.unwrap_or(RunOutcome::CancelledAndReverted);
        }
        result = executor.run() => result,
    };

    match executor_result {
        Ok(()) if token.is_fired() => {
            // Injection stopped at a cycle boundary because of the abort;
            // let the sweep finish before reporting.
            watcher_task.await.unwrap_or(RunOutcome::CancelledAndReverted)
        }
        Ok(()) => {
            watcher_task.abort();
            if let Err(err) = probe.run(ProbePhase::PostChaos).await {
                return RunOutcome::Failed(err);
            }
            if !config.ramp_time_after.is_zero() {
                info!(
                    ramp = %humantime::format_duration(config.ramp_time_after),
                    "waiting for the ramp time after injection"
                );
                tokio::time::sleep(config.ramp_time_after).await;
            }
            events.emit(EventKind::ExperimentFinished, &json!({ "kind": "disk-loss" }));
            RunOutcome::Completed
        }
        Err(err) if token.is_fired() => {
            // The failure raced the abort; cancellation wins, but only after
            // the sweep has done what it can.
            warn!(error = %err, "injection failed while an abort was pending");
            watcher_task.await.unwrap_or(RunOutcome::CancelledAndReverted)
        }
        Err(err) => {
            watcher_task.abort();
            events.emit(
                EventKind::ExperimentFailed,
                &json!({ "kind": "disk-loss", "error": err.to_string(), "class": err.kind() }),
            );
            RunOutcome::Failed(err)
        }
    }
}
