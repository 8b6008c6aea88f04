//! vCenter REST API client.
//!
//! Authenticates once with a session POST and replays the session id header
//! on every call. Observation endpoints map failures to
//! [`ChaosError::ObservationFailed`], mutation endpoints to
//! [`ChaosError::ActionFailed`]; the poller and the lifecycles rely on that
//! split to decide what is retryable.

use crate::vcenter::{DiskClient, HostClient, HostDetails, HostRebooter};
use faultline_common::{
    ChaosError, DiskAttachment, DiskId, HostConnectionState, HostId, VcenterConfig, VmId,
    VmPowerState,
};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

const SESSION_HEADER: &str = "vmware-api-session-id";

/// Authenticated client for one vCenter server.
pub struct VcenterRest {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

// ── Wire shapes ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Valued<T> {
    value: T,
}

#[derive(Deserialize)]
struct DiskListEntry {
    disk: String,
}

#[derive(Deserialize)]
struct DiskInfo {
    backing: DiskBacking,
}

#[derive(Deserialize)]
struct DiskBacking {
    vmdk_file: String,
}

#[derive(Deserialize)]
struct HostSummary {
    host: String,
    connection_state: HostConnectionState,
}

#[derive(Deserialize)]
struct VmSummary {
    vm: String,
}

#[derive(Deserialize)]
struct PowerInfo {
    state: VmPowerState,
}

#[derive(Deserialize)]
struct ApiError {
    value: ApiErrorValue,
}

#[derive(Deserialize)]
struct ApiErrorValue {
    #[serde(default)]
    messages: Vec<ApiMessage>,
}

#[derive(Deserialize)]
struct ApiMessage {
    default_message: String,
}

/// Best-effort extraction of the server-side message from an error body.
fn api_error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiError>(body) {
        Ok(err) if !err.value.messages.is_empty() => format!(
            "http {}: {}",
            status.as_u16(),
            err.value.messages[0].default_message
        ),
        _ => format!("http {}", status.as_u16()),
    }
}

// ── Client ───────────────────────────────────────────────────────────────

impl VcenterRest {
    /// Open a session against the configured vCenter.
    pub async fn connect(config: &VcenterConfig) -> Result<Self, ChaosError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(|err| ChaosError::action("connect", "vcenter", err))?;

        let base_url = format!("https://{}", config.server);
        let response = http
            .post(format!("{base_url}/rest/com/vmware/cis/session"))
            .basic_auth(&config.user, Some(&config.password))
            .send()
            .await
            .map_err(|err| ChaosError::action("login", "vcenter", err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChaosError::action(
                "login",
                "vcenter",
                api_error_message(status, &body),
            ));
        }

        let session: Valued<String> = response
            .json()
            .await
            .map_err(|err| ChaosError::action("login", "vcenter", err))?;
        debug!(server = %config.server, "vcenter session established");

        Ok(Self {
            http,
            base_url,
            session_id: session.value,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut builder = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .header(SESSION_HEADER, &self.session_id)
            .query(query);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        builder.send().await
    }

    /// GET that deserializes the `value` envelope; failures become
    /// observation errors for `subject`.
    async fn observe<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        subject: &str,
    ) -> Result<T, ChaosError> {
        let response = self
            .request(Method::GET, path, query, None)
            .await
            .map_err(|err| ChaosError::observation(subject, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChaosError::observation(
                subject,
                api_error_message(status, &body),
            ));
        }

        let value: Valued<T> = response
            .json()
            .await
            .map_err(|err| ChaosError::observation(subject, err))?;
        Ok(value.value)
    }

    /// Mutating call; failures become action errors.
    async fn act(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        action: &str,
        subject: &str,
    ) -> Result<(), ChaosError> {
        let response = self
            .request(method, path, &[], body)
            .await
            .map_err(|err| ChaosError::action(action, subject, err))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChaosError::action(
                action,
                subject,
                api_error_message(status, &text),
            ));
        }
        Ok(())
    }

    async fn host_summary(&self, host_name: &str) -> Result<HostSummary, ChaosError> {
        let subject = format!("host {host_name}");
        let hosts: Vec<HostSummary> = self
            .observe(
                "/rest/vcenter/host",
                &[("filter.names.1", host_name)],
                &subject,
            )
            .await?;
        hosts
            .into_iter()
            .next()
            .ok_or_else(|| ChaosError::observation(subject, "no host with that name"))
    }
}

impl DiskClient for VcenterRest {
    async fn disk_state(&self, vm: &VmId, disk: &DiskId) -> Result<DiskAttachment, ChaosError> {
        let subject = format!("disk {disk} of {vm}");
        let disks: Vec<DiskListEntry> = self
            .observe(
                &format!("/rest/vcenter/vm/{vm}/hardware/disk"),
                &[],
                &subject,
            )
            .await?;
        let attached = disks.iter().any(|entry| entry.disk == disk.as_str());
        Ok(if attached {
            DiskAttachment::Attached
        } else {
            DiskAttachment::Detached
        })
    }

    async fn disk_backing_path(&self, vm: &VmId, disk: &DiskId) -> Result<String, ChaosError> {
        let subject = format!("disk {disk} of {vm}");
        let info: DiskInfo = self
            .observe(
                &format!("/rest/vcenter/vm/{vm}/hardware/disk/{disk}"),
                &[],
                &subject,
            )
            .await?;
        Ok(info.backing.vmdk_file)
    }

    async fn detach_disk(&self, vm: &VmId, disk: &DiskId) -> Result<(), ChaosError> {
        self.act(
            Method::DELETE,
            &format!("/rest/vcenter/vm/{vm}/hardware/disk/{disk}"),
            None,
            "detach-disk",
            &format!("disk {disk} of {vm}"),
        )
        .await
    }

    async fn attach_disk(&self, vm: &VmId, backing_path: &str) -> Result<(), ChaosError> {
        self.act(
            Method::POST,
            &format!("/rest/vcenter/vm/{vm}/hardware/disk"),
            Some(attach_payload(backing_path)),
            "attach-disk",
            &format!("vm {vm}"),
        )
        .await
    }

    async fn vm_disks(&self, vm: &VmId) -> Result<Vec<DiskId>, ChaosError> {
        let subject = format!("vm {vm} disks");
        let disks: Vec<DiskListEntry> = self
            .observe(
                &format!("/rest/vcenter/vm/{vm}/hardware/disk"),
                &[],
                &subject,
            )
            .await?;
        Ok(disks.into_iter().map(|entry| DiskId::new(entry.disk)).collect())
    }
}

fn attach_payload(backing_path: &str) -> serde_json::Value {
    json!({
        "spec": {
            "backing": {
                "type": "VMDK_FILE",
                "vmdk_file": backing_path,
            }
        }
    })
}

impl HostClient for VcenterRest {
    async fn host_details(&self, host_name: &str) -> Result<HostDetails, ChaosError> {
        let summary = self.host_summary(host_name).await?;
        Ok(HostDetails {
            host_id: HostId::new(summary.host),
            connection_state: summary.connection_state,
        })
    }

    async fn host_connection_state(
        &self,
        host_name: &str,
    ) -> Result<HostConnectionState, ChaosError> {
        Ok(self.host_summary(host_name).await?.connection_state)
    }

    async fn vms_on_host(
        &self,
        host: &HostId,
        power: Option<VmPowerState>,
    ) -> Result<Vec<VmId>, ChaosError> {
        let subject = format!("vms on host {host}");
        let power_filter = power.map(|p| p.to_string());
        let mut query: Vec<(&str, &str)> = vec![("filter.hosts.1", host.as_str())];
        if let Some(filter) = power_filter.as_deref() {
            query.push(("filter.power_states.1", filter));
        }
        let vms: Vec<VmSummary> = self.observe("/rest/vcenter/vm", &query, &subject).await?;
        Ok(vms.into_iter().map(|entry| VmId::new(entry.vm)).collect())
    }

    async fn vm_power_state(&self, vm: &VmId) -> Result<VmPowerState, ChaosError> {
        let subject = format!("vm {vm}");
        let power: PowerInfo = self
            .observe(&format!("/rest/vcenter/vm/{vm}/power"), &[], &subject)
            .await?;
        Ok(power.state)
    }

    async fn start_vm(&self, vm: &VmId) -> Result<(), ChaosError> {
        self.act(
            Method::POST,
            &format!("/rest/vcenter/vm/{vm}/power/start"),
            None,
            "start-vm",
            &format!("vm {vm}"),
        )
        .await
    }
}

impl HostRebooter for VcenterRest {
    async fn reboot_host(&self, host_name: &str, _datacenter: &str) -> Result<(), ChaosError> {
        // The REST transport addresses hosts by id, not by inventory path,
        // so the datacenter qualifier is unused here.
        let summary = self.host_summary(host_name).await?;
        self.act(
            Method::POST,
            &format!("/rest/vcenter/host/{}/reboot", summary.host),
            None,
            "reboot-host",
            &format!("host {host_name}"),
        )
        .await
    }
}
