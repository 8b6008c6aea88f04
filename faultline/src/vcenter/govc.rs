//! Host reboot via the `govc` CLI.
//!
//! The default reboot transport: `govc host.shutdown -r` goes through the
//! same code path an operator would use by hand, which matters when the REST
//! endpoint is disabled or the appliance version predates it. Connection
//! settings are passed per-invocation through `GOVC_*` environment variables
//! so nothing leaks into the parent process environment.

use crate::vcenter::HostRebooter;
use faultline_common::{ChaosError, VcenterConfig};
use tokio::process::Command;
use tracing::info;

pub struct GovcRebooter {
    binary: String,
    url: String,
    username: String,
    password: String,
    insecure: bool,
}

impl GovcRebooter {
    pub fn new(config: &VcenterConfig) -> Self {
        Self {
            binary: "govc".to_string(),
            url: format!("https://{}/sdk", config.server),
            username: config.user.clone(),
            password: config.password.clone(),
            insecure: config.insecure,
        }
    }

    #[cfg(test)]
    fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl HostRebooter for GovcRebooter {
    async fn reboot_host(&self, host_name: &str, datacenter: &str) -> Result<(), ChaosError> {
        let subject = format!("host {host_name}");
        info!(host = %host_name, datacenter = %datacenter, "issuing govc host.shutdown -r");

        let output = Command::new(&self.binary)
            .arg("host.shutdown")
            .arg("-r=true")
            .arg("-f=true")
            .arg(format!("-dc={datacenter}"))
            .arg(host_name)
            .env("GOVC_URL", &self.url)
            .env("GOVC_USERNAME", &self.username)
            .env("GOVC_PASSWORD", &self.password)
            .env("GOVC_INSECURE", if self.insecure { "true" } else { "false" })
            .output()
            .await
            .map_err(|err| ChaosError::action("reboot-host", &subject, err))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ChaosError::action(
                "reboot-host",
                &subject,
                format!(
                    "govc exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ))
        }
    }
}
