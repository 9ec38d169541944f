use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::retry::RetryPolicy;

/// Address of the object store server when none is configured.
pub const DEFAULT_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 19876));

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub connect_timeout_ms: u64,
    /// Read and write timeout on the socket. Zero disables it.
    pub io_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_ADDR,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_addr(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> ClientResult<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ClientResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ClientConfig::default();
        assert_eq!(c.server_addr, "127.0.0.1:19876".parse::<SocketAddr>().unwrap());
        assert_eq!(c.connect_timeout(), Duration::from_secs(5));
        assert_eq!(c.io_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_io_timeout_disables_it() {
        let c = ClientConfig { io_timeout_ms: 0, ..ClientConfig::default() };
        assert_eq!(c.io_timeout(), None);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ClientConfig::from_toml_str(
            r#"
            server_addr = "10.0.0.2:4000"

            [retry]
            max_attempts = 7
            "#,
        )
        .unwrap();
        assert_eq!(c.server_addr, "10.0.0.2:4000".parse::<SocketAddr>().unwrap());
        assert_eq!(c.retry.max_attempts, 7);
        assert_eq!(c.retry.initial_backoff_ms, RetryPolicy::default().initial_backoff_ms);
        assert_eq!(c.io_timeout_ms, 30_000);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = ClientConfig::from_toml_str("server_addr = 12").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "io_timeout_ms = 250").unwrap();
        let c = ClientConfig::load(file.path()).unwrap();
        assert_eq!(c.io_timeout(), Some(Duration::from_millis(250)));
    }
}
