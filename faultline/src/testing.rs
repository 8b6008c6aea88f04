//! Scripted in-memory vCenter for lifecycle tests.
//!
//! The mock keeps live attachment/power state that mutates the way the real
//! endpoint does (detach removes the disk from the hardware list, attach puts
//! it back, start powers a VM on), plus per-resource scripts that override
//! the next N observations when a test needs the world to change out from
//! under the engine.

use crate::vcenter::{DiskClient, HostClient, HostDetails, HostRebooter};
use faultline_common::{
    ChaosError, DiskAttachment, DiskId, HostConnectionState, HostId, VmId, VmPowerState,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    // (vm, disk) -> (attachment, backing path)
    disks: HashMap<(String, String), (DiskAttachment, String)>,
    // consulted before live state, one entry per observation
    disk_scripts: HashMap<(String, String), VecDeque<DiskAttachment>>,
    fail_detach: HashSet<(String, String)>,
    fail_attach: HashSet<String>,
    fail_observe: HashSet<(String, String)>,

    // host name -> id
    hosts: HashMap<String, HostId>,
    host_scripts: HashMap<String, VecDeque<HostConnectionState>>,

    vms: HashMap<String, VmPowerState>,
    vm_scripts: HashMap<String, VecDeque<VmPowerState>>,
    placement: HashMap<String, Vec<VmId>>, // host id -> vms
    fail_start: HashSet<String>,

    calls: Vec<String>,
}

/// In-memory vCenter double.
#[derive(Default)]
pub struct MockVcenter {
    state: Mutex<MockState>,
}

impl MockVcenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disk(self, vm: &str, disk: &str, backing: &str) -> Self {
        self.state.lock().unwrap().disks.insert(
            (vm.to_string(), disk.to_string()),
            (DiskAttachment::Attached, backing.to_string()),
        );
        self
    }

    pub fn with_host(self, name: &str, id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .hosts
            .insert(name.to_string(), HostId::new(id));
        self
    }

    pub fn with_vm(self, vm: &str, host_id: &str, power: VmPowerState) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.vms.insert(vm.to_string(), power);
            state
                .placement
                .entry(host_id.to_string())
                .or_default()
                .push(VmId::new(vm));
        }
        self
    }

    /// Queue observations that `disk_state` returns before falling back to
    /// live state.
    pub fn script_disk_states(&self, vm: &str, disk: &str, states: &[DiskAttachment]) {
        self.state
            .lock()
            .unwrap()
            .disk_scripts
            .entry((vm.to_string(), disk.to_string()))
            .or_default()
            .extend(states.iter().copied());
    }

    /// Queue observations that `host_connection_state` returns; when the
    /// script is exhausted the host reads as connected.
    pub fn script_host_states(&self, name: &str, states: &[HostConnectionState]) {
        self.state
            .lock()
            .unwrap()
            .host_scripts
            .entry(name.to_string())
            .or_default()
            .extend(states.iter().copied());
    }

    pub fn fail_detach(&self, vm: &str, disk: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_detach
            .insert((vm.to_string(), disk.to_string()));
    }

    pub fn fail_attach(&self, vm: &str) {
        self.state.lock().unwrap().fail_attach.insert(vm.to_string());
    }

    pub fn fail_observe(&self, vm: &str, disk: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_observe
            .insert((vm.to_string(), disk.to_string()));
    }

    pub fn fail_start(&self, vm: &str) {
        self.state.lock().unwrap().fail_start.insert(vm.to_string());
    }

    /// Queue observations that `vm_power_state` returns before falling back
    /// to live state.
    pub fn script_vm_power(&self, vm: &str, states: &[VmPowerState]) {
        self.state
            .lock()
            .unwrap()
            .vm_scripts
            .entry(vm.to_string())
            .or_default()
            .extend(states.iter().copied());
    }

    /// Externally detach a disk (simulates state changing outside the engine).
    pub fn force_detach(&self, vm: &str, disk: &str) {
        if let Some(record) = self
            .state
            .lock()
            .unwrap()
            .disks
            .get_mut(&(vm.to_string(), disk.to_string()))
        {
            record.0 = DiskAttachment::Detached;
        }
    }

    /// Mutation calls recorded in issue order, e.g. `detach vm-1/2001`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn disk_attachment(&self, vm: &str, disk: &str) -> Option<DiskAttachment> {
        self.state
            .lock()
            .unwrap()
            .disks
            .get(&(vm.to_string(), disk.to_string()))
            .map(|record| record.0)
    }

    pub fn vm_power(&self, vm: &str) -> Option<VmPowerState> {
        self.state.lock().unwrap().vms.get(vm).copied()
    }
}

impl DiskClient for MockVcenter {
    async fn disk_state(&self, vm: &VmId, disk: &DiskId) -> Result<DiskAttachment, ChaosError> {
        let mut state = self.state.lock().unwrap();
        let key = (vm.as_str().to_string(), disk.as_str().to_string());
        if state.fail_observe.contains(&key) {
            return Err(ChaosError::observation(
                format!("disk {disk} of {vm}"),
                "scripted observation failure",
            ));
        }
        if let Some(script) = state.disk_scripts.get_mut(&key)
            && let Some(next) = script.pop_front()
        {
            return Ok(next);
        }
        match state.disks.get(&key) {
            Some((attachment, _)) => Ok(*attachment),
            None => Ok(DiskAttachment::Detached),
        }
    }

    async fn disk_backing_path(&self, vm: &VmId, disk: &DiskId) -> Result<String, ChaosError> {
        let state = self.state.lock().unwrap();
        let key = (vm.as_str().to_string(), disk.as_str().to_string());
        state
            .disks
            .get(&key)
            .map(|(_, backing)| backing.clone())
            .ok_or_else(|| {
                ChaosError::observation(format!("disk {disk} of {vm}"), "no such disk")
            })
    }

    async fn detach_disk(&self, vm: &VmId, disk: &DiskId) -> Result<(), ChaosError> {
        let mut state = self.state.lock().unwrap();
        let key = (vm.as_str().to_string(), disk.as_str().to_string());
        state.calls.push(format!("detach {vm}/{disk}"));
        if state.fail_detach.contains(&key) {
            return Err(ChaosError::action(
                "detach-disk",
                format!("disk {disk} of {vm}"),
                "scripted action failure",
            ));
        }
        match state.disks.get_mut(&key) {
            Some(record) => {
                record.0 = DiskAttachment::Detached;
                Ok(())
            }
            None => Err(ChaosError::action(
                "detach-disk",
                format!("disk {disk} of {vm}"),
                "no such disk",
            )),
        }
    }

    async fn attach_disk(&self, vm: &VmId, backing_path: &str) -> Result<(), ChaosError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("attach {vm}/{backing_path}"));
        if state.fail_attach.contains(vm.as_str()) {
            return Err(ChaosError::action(
                "attach-disk",
                format!("vm {vm}"),
                "scripted action failure",
            ));
        }
        let record = state
            .disks
            .iter_mut()
            .find(|(key, record)| key.0 == vm.as_str() && record.1 == backing_path);
        match record {
            Some((_, record)) => {
                record.0 = DiskAttachment::Attached;
                Ok(())
            }
            None => Err(ChaosError::action(
                "attach-disk",
                format!("vm {vm}"),
                format!("no disk with backing {backing_path}"),
            )),
        }
    }

    async fn vm_disks(&self, vm: &VmId) -> Result<Vec<DiskId>, ChaosError> {
        let state = self.state.lock().unwrap();
        let mut disks: Vec<DiskId> = state
            .disks
            .iter()
            .filter(|((owner, _), (attachment, _))| {
                owner == vm.as_str() && *attachment == DiskAttachment::Attached
            })
            .map(|((_, disk), _)| DiskId::new(disk.clone()))
            .collect();
        disks.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(disks)
    }
}

impl HostClient for MockVcenter {
    async fn host_details(&self, host_name: &str) -> Result<HostDetails, ChaosError> {
        let state = self.state.lock().unwrap();
        let host_id = state.hosts.get(host_name).cloned().ok_or_else(|| {
            ChaosError::observation(format!("host {host_name}"), "no such host")
        })?;
        Ok(HostDetails {
            host_id,
            connection_state: state
                .host_scripts
                .get(host_name)
                .and_then(|script| script.front().copied())
                .unwrap_or(HostConnectionState::Connected),
        })
    }

    async fn host_connection_state(
        &self,
        host_name: &str,
    ) -> Result<HostConnectionState, ChaosError> {
        let mut state = self.state.lock().unwrap();
        if !state.hosts.contains_key(host_name) {
            return Err(ChaosError::observation(
                format!("host {host_name}"),
                "no such host",
            ));
        }
        Ok(state
            .host_scripts
            .get_mut(host_name)
            .and_then(|script| script.pop_front())
            .unwrap_or(HostConnectionState::Connected))
    }

    async fn vms_on_host(
        &self,
        host: &HostId,
        power: Option<VmPowerState>,
    ) -> Result<Vec<VmId>, ChaosError> {
        let state = self.state.lock().unwrap();
        let placed = state
            .placement
            .get(host.as_str())
            .cloned()
            .unwrap_or_default();
        Ok(placed
            .into_iter()
            .filter(|vm| match power {
                Some(wanted) => state.vms.get(vm.as_str()) == Some(&wanted),
                None => true,
            })
            .collect())
    }

    async fn vm_power_state(&self, vm: &VmId) -> Result<VmPowerState, ChaosError> {
        let mut state = self.state.lock().unwrap();
        if let Some(script) = state.vm_scripts.get_mut(vm.as_str())
            && let Some(next) = script.pop_front()
        {
            return Ok(next);
        }
        state
            .vms
            .get(vm.as_str())
            .copied()
            .ok_or_else(|| ChaosError::observation(format!("vm {vm}"), "no such vm"))
    }

    async fn start_vm(&self, vm: &VmId) -> Result<(), ChaosError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("start {vm}"));
        if state.fail_start.contains(vm.as_str()) {
            return Err(ChaosError::action(
                "start-vm",
                format!("vm {vm}"),
                "scripted action failure",
            ));
        }
        match state.vms.get_mut(vm.as_str()) {
            Some(power) => {
                *power = VmPowerState::PoweredOn;
                Ok(())
            }
            None => Err(ChaosError::action(
                "start-vm",
                format!("vm {vm}"),
                "no such vm",
            )),
        }
    }
}

impl HostRebooter for MockVcenter {
    async fn reboot_host(&self, host_name: &str, datacenter: &str) -> Result<(), ChaosError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("reboot {host_name}@{datacenter}"));
        if !state.hosts.contains_key(host_name) {
            return Err(ChaosError::action(
                "reboot-host",
                format!("host {host_name}"),
                "no such host",
            ));
        }
        Ok(())
    }
}
