use std::fmt;
use std::time::{Duration, Instant};

use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectivityStatus {
    Unknown,
    NoCredentials,
    Connecting,
    Connected,
    Unreachable,
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectivityStatus::Unknown => "unknown",
            ConnectivityStatus::NoCredentials => "no credentials",
            ConnectivityStatus::Connecting => "connecting",
            ConnectivityStatus::Connected => "connected",
            ConnectivityStatus::Unreachable => "unreachable",
        };
        f.write_str(label)
    }
}

/// The device's network link. Neither call may block: `connect` only
/// kicks off an attempt and reports how that went so far.
pub trait NetworkLink: Send {
    fn connect(&mut self) -> ConnectivityStatus;

    fn is_connected(&self) -> bool;
}

/// Makes sure a usable network path exists before anything is fetched.
pub struct ConnectivityGate {
    link: Box<dyn NetworkLink>,
    status: ConnectivityStatus,
    connect_timeout: Duration,
    connect_started: Option<Instant>,
}

impl ConnectivityGate {
    pub fn new(link: Box<dyn NetworkLink>, connect_timeout: Duration) -> Self {
        ConnectivityGate {
            link,
            status: ConnectivityStatus::Unknown,
            connect_timeout,
            connect_started: None,
        }
    }

    pub fn status(&self) -> ConnectivityStatus {
        self.status
    }

    pub fn check(&mut self, now: Instant) -> ConnectivityStatus {
        let current = self.status;
        let next = match current {
            // configuration-level stops, only a reset gets us out
            ConnectivityStatus::NoCredentials | ConnectivityStatus::Unreachable => current,
            _ if self.link.is_connected() => ConnectivityStatus::Connected,
            ConnectivityStatus::Connecting => {
                let started = *self.connect_started.get_or_insert(now);
                if now.saturating_duration_since(started) >= self.connect_timeout {
                    warn!(
                        "network link still down after {:?}, giving up",
                        self.connect_timeout
                    );
                    ConnectivityStatus::Unreachable
                } else {
                    ConnectivityStatus::Connecting
                }
            }
            ConnectivityStatus::Unknown | ConnectivityStatus::Connected => {
                info!("network link down, starting connect attempt");
                self.connect_started = Some(now);
                match self.link.connect() {
                    ConnectivityStatus::Unknown => ConnectivityStatus::Connecting,
                    status => status,
                }
            }
        };
        if next != current {
            info!("connectivity: {current} -> {next}");
            self.status = next;
        }
        self.status
    }

    pub fn reset(&mut self) {
        self.status = ConnectivityStatus::Unknown;
        self.connect_started = None;
    }
}
