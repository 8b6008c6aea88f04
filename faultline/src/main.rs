//! Faultline: fault-injection orchestration for VMware infrastructure.
//!
//! The binary wires configuration, signal handling, and the vCenter client
//! together, then hands everything to one of the experiment lifecycles. The
//! exit code is the run verdict: 0 completed, 1 failed, 2 cancelled (with
//! the revert sweep finished).

mod abort;
mod diskloss;
mod events;
mod executor;
mod poller;
mod probe;
mod reboot;
mod resolver;
#[cfg(test)]
mod testing;
mod vcenter;
mod watcher;

use crate::events::EventBus;
use crate::probe::ConfiguredProbe;
use crate::vcenter::{GovcRebooter, VcenterRest};
use clap::{Parser, Subcommand};
use faultline_common::{ExperimentConfig, RebootTransport, RunOutcome, SequenceMode};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const EXIT_COMPLETED: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_CANCELLED: u8 = 2;

#[derive(Parser)]
#[command(
    name = "faultline",
    version,
    about = "Fault-injection orchestration engine for VMware chaos experiments"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print lifecycle events as JSON lines on stdout
    #[arg(long, global = true)]
    emit_events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detach virtual disks for the chaos window, then restore them
    DiskLoss {
        /// Override FAULTLINE_SEQUENCE (serial or parallel)
        #[arg(long)]
        sequence: Option<String>,

        /// Override FAULTLINE_CHAOS_DURATION (e.g. "90s", "5m")
        #[arg(long)]
        duration: Option<humantime::Duration>,
    },
    /// Reboot an ESX host, then restart its VMs and verify disk inventory
    HostReboot {
        /// Override FAULTLINE_REBOOT_TRANSPORT (govc or rest)
        #[arg(long)]
        transport: Option<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {},
                _ = term.recv() => {},
            }
        }
        Err(err) => {
            warn!(error = %err, "cannot listen for SIGTERM, falling back to ctrl-c only");
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match ExperimentConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration is invalid");
            return ExitCode::from(EXIT_FAILED);
        }
    };
    if let Err(err) = apply_overrides(&mut config, &cli.command) {
        error!(error = %err, "invalid command-line override");
        return ExitCode::from(EXIT_FAILED);
    }

    let run_id = Uuid::new_v4();
    info!(%run_id, "starting faultline run");
    let events = EventBus::new(256, run_id);

    if cli.emit_events {
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            while let Ok(line) = rx.recv().await {
                println!("{line}");
            }
        });
    }

    let (handle, token) = abort::abort_pair();
    tokio::spawn(async move {
        shutdown_signal().await;
        handle.fire();
    });

    let client = match VcenterRest::connect(&config.vcenter).await {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(error = %err, "cannot reach vcenter");
            return ExitCode::from(EXIT_FAILED);
        }
    };
    let probe = Arc::new(ConfiguredProbe::from_command(config.probe_command.as_deref()));

    let outcome = match &cli.command {
        Command::DiskLoss { .. } => {
            diskloss::run(client, probe, &config, token, events.clone()).await
        }
        Command::HostReboot { .. } => match config.reboot_transport {
            RebootTransport::Govc => {
                let rebooter = GovcRebooter::new(&config.vcenter);
                reboot::run(client, &rebooter, probe, &config, events.clone()).await
            }
            RebootTransport::Rest => {
                reboot::run(client.clone(), client.as_ref(), probe, &config, events.clone()).await
            }
        },
    };

    let code = match outcome {
        RunOutcome::Completed => {
            info!(%run_id, "experiment completed");
            EXIT_COMPLETED
        }
        RunOutcome::Failed(err) => {
            error!(%run_id, error = %err, class = err.kind(), "experiment failed");
            EXIT_FAILED
        }
        RunOutcome::CancelledAndReverted => {
            warn!(%run_id, "experiment cancelled; revert sweep finished");
            EXIT_CANCELLED
        }
    };
    ExitCode::from(code)
}

/// Command-line flags win over the environment; re-validate afterwards so an
/// override cannot smuggle in a window the environment path would reject.
fn apply_overrides(config: &mut ExperimentConfig, command: &Command) -> Result<(), String> {
    match command {
        Command::DiskLoss { sequence, duration } => {
            if let Some(sequence) = sequence {
                config.sequence = sequence.parse::<SequenceMode>()?;
            }
            if let Some(duration) = duration {
                config.total_duration = **duration;
            }
        }
        Command::HostReboot { transport } => {
            if let Some(transport) = transport {
                config.reboot_transport = transport.parse::<RebootTransport>()?;
            }
        }
    }
    config.validate().map_err(|err| err.to_string())
}
