//! vCenter access traits and their implementations.
//!
//! The experiment lifecycles are generic over these traits so tests can run
//! against a scripted in-memory vCenter. Methods return `impl Future + Send`
//! rather than being plain `async fn` so callers can spawn work (the revert
//! watcher runs in its own task) without extra bounds.

pub mod govc;
pub mod rest;

pub use govc::GovcRebooter;
pub use rest::VcenterRest;

use faultline_common::{
    ChaosError, DiskAttachment, DiskId, HostConnectionState, HostId, VmId, VmPowerState,
};
use std::future::Future;

/// Identity and connection state of an ESX host, looked up by name.
#[derive(Debug, Clone)]
pub struct HostDetails {
    pub host_id: HostId,
    pub connection_state: HostConnectionState,
}

/// Virtual disk observation and attach/detach actions, per VM.
pub trait DiskClient: Send + Sync {
    /// Whether the disk currently appears in the VM's hardware list.
    fn disk_state(
        &self,
        vm: &VmId,
        disk: &DiskId,
    ) -> impl Future<Output = Result<DiskAttachment, ChaosError>> + Send;

    /// VMDK backing path of an attached disk. Must be captured before detach;
    /// it is the only restore descriptor.
    fn disk_backing_path(
        &self,
        vm: &VmId,
        disk: &DiskId,
    ) -> impl Future<Output = Result<String, ChaosError>> + Send;

    /// Detach the disk from the VM (the disruption).
    fn detach_disk(
        &self,
        vm: &VmId,
        disk: &DiskId,
    ) -> impl Future<Output = Result<(), ChaosError>> + Send;

    /// Re-attach a disk from its VMDK backing path (the restore). The disk
    /// id after re-attach may differ; convergence is judged by the hardware
    /// list, not the id.
    fn attach_disk(
        &self,
        vm: &VmId,
        backing_path: &str,
    ) -> impl Future<Output = Result<(), ChaosError>> + Send;

    /// All disk ids currently attached to the VM.
    fn vm_disks(&self, vm: &VmId) -> impl Future<Output = Result<Vec<DiskId>, ChaosError>> + Send;
}

/// Host and VM observation plus VM power actions, for the host-reboot
/// experiment.
pub trait HostClient: Send + Sync {
    /// Resolve a host by name.
    fn host_details(
        &self,
        host_name: &str,
    ) -> impl Future<Output = Result<HostDetails, ChaosError>> + Send;

    /// Current connection state of a host, by name.
    fn host_connection_state(
        &self,
        host_name: &str,
    ) -> impl Future<Output = Result<HostConnectionState, ChaosError>> + Send;

    /// VMs placed on the host, optionally filtered by power state.
    fn vms_on_host(
        &self,
        host: &HostId,
        power: Option<VmPowerState>,
    ) -> impl Future<Output = Result<Vec<VmId>, ChaosError>> + Send;

    /// Current power state of a VM.
    fn vm_power_state(
        &self,
        vm: &VmId,
    ) -> impl Future<Output = Result<VmPowerState, ChaosError>> + Send;

    /// Power a VM on.
    fn start_vm(&self, vm: &VmId) -> impl Future<Output = Result<(), ChaosError>> + Send;
}

/// The reboot action itself, separated from observation so the transport can
/// vary (`govc` CLI or the REST API) without touching the lifecycle.
pub trait HostRebooter: Send + Sync {
    fn reboot_host(
        &self,
        host_name: &str,
        datacenter: &str,
    ) -> impl Future<Output = Result<(), ChaosError>> + Send;
}
