//! Server configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Base directory for room snapshots. Files land in `<data_dir>/collaboration/`.
    pub data_dir: PathBuf,
    /// Outbound queue depth per connection.
    pub client_channel_capacity: usize,
    /// Periodic snapshot interval. `None` disables the background task.
    pub snapshot_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
            snapshot_interval: None,
        }
    }
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Optional:
    /// - `HOST`: default `0.0.0.0`
    /// - `PORT`: default 3000
    /// - `DATA_DIR`: default `./data`
    /// - `CLIENT_CHANNEL_CAPACITY`: default 256
    /// - `SNAPSHOT_INTERVAL_SECS`: default 0 (disabled)
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is present but does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. `from_env` delegates here.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable is present but does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = parse_var(&lookup, "PORT")?.unwrap_or(defaults.port);
        let data_dir = lookup("DATA_DIR").map_or(defaults.data_dir, PathBuf::from);
        let client_channel_capacity =
            parse_var(&lookup, "CLIENT_CHANNEL_CAPACITY")?.unwrap_or(defaults.client_channel_capacity);
        if client_channel_capacity == 0 {
            return Err(ConfigError::Invalid { var: "CLIENT_CHANNEL_CAPACITY", value: "0".into() });
        }
        let snapshot_interval = parse_var::<u64>(&lookup, "SNAPSHOT_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self { host, port, data_dir, client_channel_capacity, snapshot_interval })
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
