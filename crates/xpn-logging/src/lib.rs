//! Process-wide `tracing` setup for the server binaries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

pub use tracing::{debug, error, info, instrument, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("invalid log filter {0:?}: {1}")]
    Filter(String, String),
    #[error("cannot open log directory {0}: {1}")]
    Appender(PathBuf, String),
    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// The `[log]` section of the server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `xpn_server=debug`. `RUST_LOG` wins
    /// when set.
    pub level: String,
    /// Write rolling log files here in addition to (or instead of) stdout.
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
    /// `hourly`, `daily` or `never`.
    pub rotation: String,
    pub json_format: bool,
    pub console_output: bool,
    /// Tag every line with the emitting thread id.
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            log_dir: None,
            file_prefix: "xpn_server".into(),
            rotation: "daily".into(),
            json_format: false,
            console_output: true,
            thread_ids: true,
        }
    }
}

impl LogConfig {
    fn rotation(&self) -> Rotation {
        match self.rotation.as_str() {
            "hourly" => Rotation::HOURLY,
            "never" => Rotation::NEVER,
            _ => Rotation::DAILY,
        }
    }

    fn filter(&self) -> Result<EnvFilter, LogError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| LogError::Filter(self.level.clone(), e.to_string()))
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn layer_for<W>(config: &LogConfig, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_thread_ids(config.thread_ids);
    if config.json_format {
        base.json().boxed()
    } else {
        base.boxed()
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and has to live as long
/// as logging is wanted.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, LogError> {
    let filter = config.filter()?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.console_output {
        layers.push(layer_for(config, std::io::stdout));
    }

    let mut guard = None;
    if let Some(dir) = &config.log_dir {
        let appender = RollingFileAppender::builder()
            .rotation(config.rotation())
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(dir)
            .map_err(|e| LogError::Appender(dir.clone(), e.to_string()))?;
        let (writer, g) = tracing_appender::non_blocking(appender);
        layers.push(layer_for(config, writer));
        guard = Some(g);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|_| LogError::AlreadyInitialized)?;
    Ok(guard)
}
