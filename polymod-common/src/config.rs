use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

/// Default UDP port used by the control panel in both directions.
pub const DEFAULT_OSC_PORT: u16 = 9001;

/// OSC endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OscConfig {
    /// Destination of outbound messages ("ip:port").
    #[serde(default = "default_client")]
    pub client: String,

    /// Local address the inbound listener binds to ("ip:port").
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_client() -> String {
    format!("127.0.0.1:{}", DEFAULT_OSC_PORT)
}

fn default_listen() -> String {
    format!("0.0.0.0:{}", DEFAULT_OSC_PORT)
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            client: default_client(),
            listen: default_listen(),
        }
    }
}

impl OscConfig {
    /// Parsed destination address.
    pub fn client_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr("client", &self.client)
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr("listen", &self.listen)
    }

    /// Replace the destination IP, keeping the configured port.
    pub fn with_client_ip(mut self, ip: IpAddr) -> Result<Self> {
        let port = self.client_addr()?.port();
        self.client = SocketAddr::new(ip, port).to_string();
        Ok(self)
    }
}

fn parse_socket_addr(field: &str, value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("Invalid osc.{} address '{}': {}", field, value, e)))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Load a configuration from a JSON5 string.
pub fn parse_config<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    json5::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
}
