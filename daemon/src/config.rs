use std::time::Duration;

use clockface::{RetryPolicy, SyncConfig};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ClockfaceError;

/// The structure of a valid clockface configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint answering with the device's public IP as plain text
    pub identity_url: String,
    /// Endpoint answering with the local time for `{identity}`
    pub time_url: String,
    /// Upper bound for a single HTTP request
    pub fetch_timeout_secs: u64,
    /// How long to wait for the network link to come up
    pub connect_timeout_secs: u64,
    /// Automatic retries for a failed identity fetch
    pub identity_retries: u32,
    /// Automatic retries for a failed time fetch
    pub time_retries: u32,
    /// Gap between identity requests while the answer is empty
    pub identity_poll_secs: u64,
    /// Re-fetch the time this often once synced
    pub resync_interval_secs: Option<u64>,
    /// Polling loop period
    pub tick_interval_ms: u64,
    /// Key input mode, 0 disables the retry button
    pub key_input_mode: u8,
    /// Input device the retry button is read from
    pub key_input_device: String,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network interface to watch. Without one the link counts as always up.
    pub interface: Option<String>,
    /// Wifi network the device is provisioned for
    pub ssid: Option<String>,
    /// Command that asks the system to (re)connect the interface
    pub connect_command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            identity_url: "https://api.ipify.org".to_string(),
            time_url: "https://timeapi.io/api/time/current/ip?ipAddress={identity}".to_string(),
            fetch_timeout_secs: 10,
            connect_timeout_secs: 30,
            identity_retries: 1,
            time_retries: 0,
            identity_poll_secs: 1,
            resync_interval_secs: None,
            tick_interval_ms: 1000,
            key_input_mode: 0,
            key_input_device: "/dev/input/event0".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            retry_policy: RetryPolicy {
                identity_retries: self.identity_retries,
                time_retries: self.time_retries,
            },
            identity_poll_interval: Duration::from_secs(self.identity_poll_secs),
            resync_interval: self.resync_interval_secs.map(Duration::from_secs),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

pub async fn parse_config<P>(path: P) -> Result<Config, ClockfaceError>
where
    P: AsRef<std::path::Path>,
{
    if let Ok(config_file) = tokio::fs::read_to_string(&path).await {
        Ok(toml::from_str(&config_file).map_err(ClockfaceError::ConfigFileParsingError)?)
    } else {
        warn!("unable to read config file, using default config");
        Ok(Config::default())
    }
}

pub struct Args {
    pub config_path: String,
}

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} /path/to/config/file", args[0]);
        std::process::exit(1);
    }
    Args {
        config_path: args[1].clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config(dir.path().join("nope.toml")).await.unwrap();
        assert_eq!(config.identity_url, "https://api.ipify.org");
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(config.network.interface.is_none());
    }

    #[tokio::test]
    async fn test_partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            time_retries = 2
            resync_interval_secs = 3600

            [network]
            interface = "wlan0"
            ssid = "emfcamp"
            connect_command = ["wpa_cli", "-i", "wlan0", "reconnect"]
            "#,
        );
        let config = parse_config(file.path()).await.unwrap();
        assert_eq!(config.time_retries, 2);
        assert_eq!(config.identity_retries, 1);
        assert_eq!(config.fetch_timeout_secs, 10);
        assert_eq!(config.network.interface.as_deref(), Some("wlan0"));
        assert_eq!(config.network.connect_command.len(), 4);

        let sync = config.sync_config();
        assert_eq!(sync.retry_policy.time_retries, 2);
        assert_eq!(sync.resync_interval, Some(Duration::from_secs(3600)));
        assert_eq!(sync.connect_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let file = write_config("tick_interval_ms = \"fast\"");
        assert!(matches!(
            parse_config(file.path()).await,
            Err(ClockfaceError::ConfigFileParsingError(_))
        ));
    }
}
