//! # Configuration Management
//!
//! Centralized configuration for servers and clients of the hybrid protocol.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()` (prefix `HYBRID_PROTOCOL_`)
//! - Direct instantiation with defaults
//!
//! ## Security Considerations
//! - The 64 KiB frame limit bounds per-connection allocation from untrusted peers
//! - The outbound queue limit bounds memory when a peer stops reading
//! - Key material is pre-shared; there is no negotiation or rotation

use crate::core::codec::MAX_BODY_SIZE;
use crate::error::{ProtocolError, Result};
use crate::transport::connection::ConnectionLimits;
use crate::utils::crypto::{Cipher, IV_SIZE, KEY_SIZE};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default number of packets a connection may have waiting to be written
pub const DEFAULT_MAX_PENDING_PACKETS: usize = 1024;

/// Default outbound depth at which a warning is logged
pub const DEFAULT_PENDING_HIGH_WATER: usize = 256;

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Framing and outbound queue limits
    #[serde(default)]
    pub transport: TransportConfig,

    /// Pre-shared key material; absent until provisioned
    #[serde(default)]
    pub crypto: Option<CryptoConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HYBRID_PROTOCOL_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("HYBRID_PROTOCOL_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(limit) = std::env::var("HYBRID_PROTOCOL_MAX_PENDING_PACKETS") {
            config.transport.max_pending_packets = limit.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid HYBRID_PROTOCOL_MAX_PENDING_PACKETS: {e}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("HYBRID_PROTOCOL_CONNECTION_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connection_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(max) = std::env::var("HYBRID_PROTOCOL_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_connections = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Cipher built from the configured key material
    pub fn cipher(&self) -> Result<Cipher> {
        self.crypto
            .as_ref()
            .map(CryptoConfig::cipher)
            .ok_or_else(|| ProtocolError::ConfigError("No [crypto] section configured".to_string()))
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        if let Some(crypto) = &self.crypto {
            errors.extend(crypto.validate());
        }
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server listen address (e.g., "0.0.0.0:7777")
    pub address: String,

    /// Maximum number of concurrent sessions; extra sockets are dropped on accept
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:7777"),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:7777')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Target server address
    pub address: String,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:7777"),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid client address format: '{}' (expected format: '127.0.0.1:7777')",
                self.address
            ));
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        } else if self.connection_timeout.as_secs() > 300 {
            errors.push("Connection timeout too long (maximum: 300s)".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Largest encrypted body accepted from or sent to a peer
    pub max_body_size: usize,

    /// Packets a connection may queue before `send_packet` is refused
    pub max_pending_packets: usize,

    /// Queue depth that triggers a backpressure warning
    pub pending_high_water: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_body_size: MAX_BODY_SIZE,
            max_pending_packets: DEFAULT_MAX_PENDING_PACKETS,
            pending_high_water: DEFAULT_PENDING_HIGH_WATER,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_body_size < Cipher::ciphertext_len(0) {
            errors.push(format!(
                "Max body size too small: {} bytes (minimum: one cipher block)",
                self.max_body_size
            ));
        } else if self.max_body_size > MAX_BODY_SIZE {
            errors.push(format!(
                "Max body size too large: {} bytes (maximum: {} bytes)",
                self.max_body_size, MAX_BODY_SIZE
            ));
        }

        if self.max_pending_packets == 0 {
            errors.push("Max pending packets must be greater than 0".to_string());
        } else if self.max_pending_packets > 1_000_000 {
            errors.push(format!(
                "Max pending packets too large: {} (max recommended: 1,000,000)",
                self.max_pending_packets
            ));
        }

        if self.pending_high_water == 0 || self.pending_high_water > self.max_pending_packets {
            errors.push(
                "Pending high-water mark must be between 1 and max pending packets".to_string(),
            );
        }

        errors
    }

    /// Per-connection limits derived from this configuration
    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_body_size: self.max_body_size,
            max_pending_packets: self.max_pending_packets,
            pending_high_water: self.pending_high_water,
        }
    }
}

/// Pre-shared AES-256-CBC key material
#[derive(Clone, Deserialize, Serialize)]
pub struct CryptoConfig {
    pub key: [u8; KEY_SIZE],
    pub iv: [u8; IV_SIZE],
}

impl CryptoConfig {
    pub fn cipher(&self) -> Cipher {
        Cipher::new(self.key, self.iv)
    }

    /// Validate key material
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.key.iter().all(|&b| b == 0) {
            errors.push("Crypto key is all zeros".to_string());
        }
        if self.iv.iter().all(|&b| b == 0) {
            errors.push("WARNING: Crypto IV is all zeros".to_string());
        }
        errors
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoConfig { .. }")
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("hybrid-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
