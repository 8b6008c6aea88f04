//! Target resolution: operator input to restorable target descriptors.
//!
//! Everything here runs before the first disruptive call, so every failure is
//! a precondition failure. Resolution also captures the restore descriptors
//! (VMDK backing paths, pre-reboot power classification) because they are not
//! re-derivable once the disruption has happened.

use crate::vcenter::{DiskClient, HostClient};
use faultline_common::{
    ChaosError, DiskAttachment, DiskId, DiskTarget, HostConnectionState, HostRestorePlan,
    TargetState, VmId, VmPowerState,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

// ── Target set ───────────────────────────────────────────────────────────

/// The resolved targets of one run plus their observed lifecycle states.
///
/// Targets are immutable after resolution; only the per-target states change.
/// The state vector is shared between the executor and the revert watcher,
/// which run concurrently after an abort fires.
#[derive(Debug)]
pub struct TargetSet {
    targets: Vec<DiskTarget>,
    states: RwLock<Vec<TargetState>>,
}

impl TargetSet {
    pub fn new(targets: Vec<DiskTarget>) -> Self {
        let states = RwLock::new(vec![TargetState::Unknown; targets.len()]);
        Self { targets, states }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn targets(&self) -> &[DiskTarget] {
        &self.targets
    }

    pub async fn mark(&self, index: usize, state: TargetState) {
        let mut states = self.states.write().await;
        if let Some(slot) = states.get_mut(index) {
            debug!(subject = %self.targets[index].subject(), from = %slot, to = %state, "target state change");
            *slot = state;
        }
    }

    pub async fn state(&self, index: usize) -> TargetState {
        self.states.read().await[index]
    }

    pub async fn states(&self) -> Vec<TargetState> {
        self.states.read().await.clone()
    }
}

// ── Disk target resolution ───────────────────────────────────────────────

fn split_ids(input: &str) -> Vec<&str> {
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Parse the parallel disk-id/VM-moid lists, verify every disk actually hangs
/// off its claimed VM, and capture the VMDK backing paths needed for restore.
pub async fn resolve_disk_targets<C: DiskClient>(
    client: &C,
    disk_ids: &str,
    vm_moids: &str,
) -> Result<TargetSet, ChaosError> {
    let disks = split_ids(disk_ids);
    let vms = split_ids(vm_moids);

    if disks.is_empty() {
        return Err(ChaosError::precondition("no disk ids provided to detach"));
    }
    if vms.is_empty() {
        return Err(ChaosError::precondition("no VM moids provided"));
    }
    if disks.len() != vms.len() {
        return Err(ChaosError::precondition(format!(
            "disk id and VM moid lists differ in length ({} disks, {} VMs); \
             the lists pair element-wise",
            disks.len(),
            vms.len()
        )));
    }

    let mut targets = Vec::with_capacity(disks.len());
    for (disk, vm) in disks.iter().zip(vms.iter()) {
        let disk_id = DiskId::new(*disk);
        let vm_id = VmId::new(*vm);
        let subject = format!("disk {disk_id} of {vm_id}");

        let state = client.disk_state(&vm_id, &disk_id).await?;
        if state != DiskAttachment::Attached {
            return Err(ChaosError::precondition(format!(
                "{subject} is not attached; cannot target a disk that is already gone"
            )));
        }

        let backing_path = client.disk_backing_path(&vm_id, &disk_id).await?;
        debug!(subject = %subject, backing = %backing_path, "captured restore descriptor");
        targets.push(DiskTarget {
            disk_id,
            vm_id,
            backing_path,
        });
    }

    info!(count = targets.len(), "resolved disk targets");
    Ok(TargetSet::new(targets))
}

// ── Host restore plan ────────────────────────────────────────────────────

/// Snapshot everything a host reboot needs for restoration: the host id, the
/// pre-reboot power classification of its VMs, and their full disk inventory.
pub async fn resolve_host_plan<C>(client: &C, host_name: &str) -> Result<HostRestorePlan, ChaosError>
where
    C: HostClient + DiskClient,
{
    if host_name.trim().is_empty() {
        return Err(ChaosError::precondition("no host name provided"));
    }

    let details = client.host_details(host_name).await?;
    if details.connection_state != HostConnectionState::Connected {
        return Err(ChaosError::precondition(format!(
            "host {host_name} is {} before injection; refusing to reboot a host \
             that is not healthy",
            details.connection_state
        )));
    }

    let powered_on_vms = client
        .vms_on_host(&details.host_id, Some(VmPowerState::PoweredOn))
        .await?;
    let all_vms = client.vms_on_host(&details.host_id, None).await?;
    let other_vms: Vec<VmId> = all_vms
        .iter()
        .filter(|vm| !powered_on_vms.contains(vm))
        .cloned()
        .collect();

    let mut vm_disks = Vec::with_capacity(all_vms.len());
    for vm in &all_vms {
        let disks = client.vm_disks(vm).await?;
        vm_disks.push((vm.clone(), disks));
    }

    info!(
        host = %host_name,
        host_id = %details.host_id,
        powered_on = powered_on_vms.len(),
        others = other_vms.len(),
        "captured host restore plan"
    );

    Ok(HostRestorePlan {
        host_id: details.host_id,
        host_name: host_name.to_string(),
        powered_on_vms,
        other_vms,
        vm_disks,
    })
}
