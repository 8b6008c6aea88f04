//! The host-reboot experiment lifecycle.
//!
//! Single-shot: snapshot the host (pre-reboot power classification and disk
//! inventory), reboot it, wait for the disconnect/reconnect round trip, then
//! restart every VM that was running and hard-verify that no disk went
//! missing. The disconnect wait is load-bearing: a host that never leaves
//! `CONNECTED` means the reboot silently did not happen, and skipping
//! straight to the reconnect wait would report a vacuous success.

use crate::events::{EventBus, EventKind};
use crate::poller;
use crate::probe::{ProbePhase, ProbeRunner};
use crate::resolver;
use crate::vcenter::{DiskClient, HostClient, HostRebooter};
use faultline_common::{
    ChaosError, DiskAttachment, ExperimentConfig, HostConnectionState, HostRestorePlan,
    RunOutcome, VmPowerState,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Run one host-reboot experiment. There is no mid-flight abort path here:
/// once the reboot is issued the only way out is through the reconnect wait.
pub async fn run<C, R, P>(
    client: Arc<C>,
    rebooter: &R,
    probe: Arc<P>,
    config: &ExperimentConfig,
    events: EventBus,
) -> RunOutcome
where
    C: HostClient + DiskClient,
    R: HostRebooter,
    P: ProbeRunner,
{
    match lifecycle(client, rebooter, probe, config, &events).await {
        Ok(()) => RunOutcome::Completed,
        Err(err) => {
            events.emit(
                EventKind::ExperimentFailed,
                &json!({ "kind": "host-reboot", "error": err.to_string(), "class": err.kind() }),
            );
            RunOutcome::Failed(err)
        }
    }
}

async fn lifecycle<C, R, P>(
    client: Arc<C>,
    rebooter: &R,
    probe: Arc<P>,
    config: &ExperimentConfig,
    events: &EventBus,
) -> Result<(), ChaosError>
where
    C: HostClient + DiskClient,
    R: HostRebooter,
    P: ProbeRunner,
{
    probe.run(ProbePhase::PreChaos).await?;

    if !config.ramp_time_before.is_zero() {
        info!(
            ramp = %humantime::format_duration(config.ramp_time_before),
            "waiting for the ramp time before injection"
        );
        tokio::time::sleep(config.ramp_time_before).await;
    }

    let plan = resolver::resolve_host_plan(client.as_ref(), &config.host_name).await?;
    events.emit(
        EventKind::ExperimentStarted,
        &json!({
            "kind": "host-reboot",
            "host": plan.host_name,
            "powered_on_vms": plan.powered_on_vms.len(),
        }),
    );

    info!(host = %plan.host_name, "rebooting host");
    rebooter
        .reboot_host(&config.host_name, &config.host_datacenter)
        .await?;
    events.emit(EventKind::Injected, &json!({ "target": plan.host_name }));

    let host_subject = format!("host {}", plan.host_name);
    poller::converge(
        &host_subject,
        HostConnectionState::NotResponding,
        config.poll_interval,
        config.poll_timeout,
        || client.host_connection_state(&config.host_name),
    )
    .await?;
    info!(host = %plan.host_name, "host went down, waiting for it to come back");

    poller::converge(
        &host_subject,
        HostConnectionState::Connected,
        config.poll_interval,
        config.poll_timeout,
        || client.host_connection_state(&config.host_name),
    )
    .await?;
    info!(host = %plan.host_name, "host reconnected");
    events.emit(EventKind::Reverted, &json!({ "target": plan.host_name }));

    restart_vms(client.as_ref(), &plan, config).await?;
    verify_disk_inventory(client.as_ref(), &plan).await?;

    probe.run(ProbePhase::PostChaos).await?;

    if !config.ramp_time_after.is_zero() {
        info!(
            ramp = %humantime::format_duration(config.ramp_time_after),
            "waiting for the ramp time after injection"
        );
        tokio::time::sleep(config.ramp_time_after).await;
    }

    events.emit(EventKind::ExperimentFinished, &json!({ "kind": "host-reboot" }));
    Ok(())
}

/// Restart every VM that was powered on before the reboot. A VM that cannot
/// be started (or never reaches `POWERED_ON`) fails the run, naming that VM.
async fn restart_vms<C>(
    client: &C,
    plan: &HostRestorePlan,
    config: &ExperimentConfig,
) -> Result<(), ChaosError>
where
    C: HostClient,
{
    for vm in &plan.powered_on_vms {
        let current = client.vm_power_state(vm).await?;
        if current == VmPowerState::PoweredOn {
            info!(vm = %vm, "vm came back on its own");
            continue;
        }
        info!(vm = %vm, "starting vm");
        client.start_vm(vm).await?;
        poller::converge(
            &format!("vm {vm}"),
            VmPowerState::PoweredOn,
            config.poll_interval,
            config.poll_timeout,
            || client.vm_power_state(vm),
        )
        .await?;
    }
    Ok(())
}

/// Hard verification: every disk recorded pre-reboot must be attached again.
/// A missing disk fails the run even though the host itself is healthy.
async fn verify_disk_inventory<C>(client: &C, plan: &HostRestorePlan) -> Result<(), ChaosError>
where
    C: DiskClient,
{
    for (vm, disks) in &plan.vm_disks {
        for disk in disks {
            let state = client.disk_state(vm, disk).await?;
            if state != DiskAttachment::Attached {
                return Err(ChaosError::action(
                    "verify-disk-inventory",
                    format!("disk {disk} of {vm}"),
                    "disk recorded before the reboot is no longer attached",
                ));
            }
        }
    }
    info!(vms = plan.vm_disks.len(), "disk inventory verified");
    Ok(())
}
