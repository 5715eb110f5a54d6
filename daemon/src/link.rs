use std::path::PathBuf;

use clockface::{ConnectivityStatus, NetworkLink};
use log::{debug, error, info, warn};

use crate::config::NetworkConfig;

const SYSFS_NET: &str = "/sys/class/net";

/// Watches a network interface through sysfs and pokes the system's
/// connection manager when it is down.
pub struct SysfsLink {
    interface: Option<String>,
    ssid: Option<String>,
    connect_command: Vec<String>,
    sysfs_root: PathBuf,
}

impl SysfsLink {
    pub fn new(config: &NetworkConfig) -> Self {
        SysfsLink {
            interface: config.interface.clone(),
            ssid: config.ssid.clone(),
            connect_command: config.connect_command.clone(),
            sysfs_root: PathBuf::from(SYSFS_NET),
        }
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    fn has_credentials(&self) -> bool {
        self.ssid.as_deref().is_some_and(|ssid| !ssid.is_empty())
    }

    fn spawn_connect_command(&self) -> bool {
        let Some((program, args)) = self.connect_command.split_first() else {
            debug!("no connect command configured, waiting for the link");
            return true;
        };
        match tokio::process::Command::new(program).args(args).spawn() {
            Ok(mut child) => {
                let program = program.clone();
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if status.success() => debug!("{program} finished"),
                        Ok(status) => warn!("{program} exited with {status}"),
                        Err(e) => error!("failed waiting for {program}: {e}"),
                    }
                });
                true
            }
            Err(e) => {
                error!("failed to run connect command {program}: {e}");
                false
            }
        }
    }
}

impl NetworkLink for SysfsLink {
    fn connect(&mut self) -> ConnectivityStatus {
        let Some(interface) = &self.interface else {
            return ConnectivityStatus::Connected;
        };
        if !self.has_credentials() {
            warn!("no wifi network configured for {interface}");
            return ConnectivityStatus::NoCredentials;
        }
        if !self.sysfs_root.join(interface).exists() {
            error!("network interface {interface} does not exist");
            return ConnectivityStatus::Unreachable;
        }
        info!("connecting {interface}");
        if self.spawn_connect_command() {
            ConnectivityStatus::Connecting
        } else {
            ConnectivityStatus::Unreachable
        }
    }

    fn is_connected(&self) -> bool {
        let Some(interface) = &self.interface else {
            return true;
        };
        std::fs::read_to_string(self.sysfs_root.join(interface).join("operstate"))
            .map(|state| state.trim() == "up")
            .unwrap_or(false)
    }
}
