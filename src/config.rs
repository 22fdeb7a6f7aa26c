//! Configuration module for the stream-bench server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// How every inbound stream is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Discard the request body and reply with a fixed payload.
    #[default]
    Drain,
    /// Stream the request body back as the response body.
    Echo,
}

/// Command-line arguments for the benchmark server
#[derive(Parser, Debug)]
#[command(name = "stream-bench")]
#[command(author = "stream-bench authors")]
#[command(version = "0.1.0")]
#[command(about = "An HTTP/2 echo / drain benchmark server", long_about = None)]
pub struct CliArgs {
    /// Response mode (drain when omitted)
    #[arg(value_enum)]
    pub mode: Option<ResponseMode>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8888)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub http2: Http2Config,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Response mode
    #[serde(default)]
    pub mode: ResponseMode,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Disable Nagle on accepted sockets
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            mode: ResponseMode::default(),
            backlog: default_backlog(),
            nodelay: default_nodelay(),
        }
    }
}

/// Buffer pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Capacity of each pooled buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Maximum number of idle buffers kept for reuse
    #[serde(default = "default_max_retained")]
    pub max_retained: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_retained: default_max_retained(),
        }
    }
}

/// HTTP/2 settings advertised to peers. Unset values keep the transport defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Http2Config {
    pub max_concurrent_streams: Option<u32>,
    pub initial_window_size: Option<u32>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8888".to_string()
}

fn default_backlog() -> i32 {
    1024
}

fn default_nodelay() -> bool {
    true
}

fn default_buffer_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_retained() -> usize {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub mode: ResponseMode,
    pub workers: Option<usize>,
    pub backlog: i32,
    pub nodelay: bool,
    pub buffers: BufferConfig,
    pub http2: Http2Config,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        let cli = CliArgs {
            mode: None,
            config: None,
            listen: None,
            workers: None,
            log_level: default_log_level(),
        };
        Self::merge(cli, TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            mode: cli.mode.unwrap_or(toml_config.server.mode),
            workers: cli.workers.or(toml_config.server.workers),
            backlog: toml_config.server.backlog,
            nodelay: toml_config.server.nodelay,
            buffers: toml_config.buffers,
            http2: toml_config.http2,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }

    /// Worker thread count, falling back to the number of CPUs.
    pub fn worker_threads(&self) -> usize {
        match self.workers {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
