//! Server configuration, loaded from TOML.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xpn_logging::LogConfig;
use xpn_proto::MAX_BUFFER_SIZE;

pub const DEFAULT_CONTROL_PORT: u16 = 3456;
pub const DEFAULT_COMM_PORT: u16 = 3457;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How accepted connections are mapped onto tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMode {
    /// One connection at a time, on the accept task.
    Sequential,
    /// A fresh task per connection.
    #[default]
    OnDemand,
    /// At most `workers` connections served concurrently.
    Pool,
}

/// Backing store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FsMode {
    #[default]
    Disk,
    Memory,
}

/// The `[mq]` section: pub/sub bridge sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqConfig {
    pub enabled: bool,
    pub qos: u8,
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Default for MqConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            qos: 0,
            queue_capacity: 1_000_000,
            workers: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub control_port: u16,
    /// Data port; `0` picks an ephemeral port.
    pub comm_port: u16,
    pub thread_mode: ThreadMode,
    pub workers: usize,
    pub fs_mode: FsMode,
    /// Every request path is resolved below this directory.
    pub root_dir: PathBuf,
    /// Streaming window for reads and writes.
    pub max_buffer_size: usize,
    pub mq: MqConfig,
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            control_port: DEFAULT_CONTROL_PORT,
            comm_port: DEFAULT_COMM_PORT,
            thread_mode: ThreadMode::default(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(8),
            fs_mode: FsMode::default(),
            root_dir: PathBuf::from("/tmp/xpn"),
            max_buffer_size: MAX_BUFFER_SIZE,
            mq: MqConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.max_buffer_size == 0 {
            return Err(ConfigError::Invalid("max_buffer_size must be non-zero".into()));
        }
        if self.max_buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_buffer_size {} exceeds {}",
                self.max_buffer_size, MAX_BUFFER_SIZE
            )));
        }
        if self.control_port != 0 && self.control_port == self.comm_port {
            return Err(ConfigError::Invalid(format!(
                "control and comm ports are both {}",
                self.control_port
            )));
        }
        if self.mq.enabled && (self.mq.workers == 0 || self.mq.queue_capacity == 0) {
            return Err(ConfigError::Invalid(
                "mq workers and queue_capacity must be non-zero".into(),
            ));
        }
        if self.mq.qos > 2 {
            return Err(ConfigError::Invalid(format!("mq qos {} not in 0..=2", self.mq.qos)));
        }
        Ok(())
    }

    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.control_port)
    }

    pub fn comm_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.comm_port)
    }
}
