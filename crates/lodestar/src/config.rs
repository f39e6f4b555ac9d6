//! YAML configuration.
//!
//! ```yaml
//! lsp:
//!   server: pyright
//!   request_timeout_ms: 30000
//! store:
//!   path: .lodestar/index.db
//!   batch_size: 1000
//! logging:
//!   level: info
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::lsp::{AnyProvider, ClientOptions, ServerKind, ShutdownTimeouts};
use crate::store::StoreOptions;

/// Default location of the symbol database.
pub const DEFAULT_STORE_PATH: &str = ".lodestar/index.db";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LodestarConfig {
    /// Language server settings
    pub lsp: LspConfig,
    /// Symbol store settings
    pub store: StoreConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Language server section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LspConfig {
    /// Which backend to launch
    pub server: ServerKind,
    /// Talk to the server over a loopback socket instead of stdio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_port: Option<u16>,
    /// Deadline for ordinary requests
    pub request_timeout_ms: u64,
    /// Deadline for `initialize`
    pub initialize_timeout_ms: u64,
    /// Deadline for `shutdown`
    pub shutdown_timeout_ms: u64,
    /// Wait for the process to exit after `exit`
    pub process_grace_ms: u64,
    /// Wait after SIGTERM before killing
    pub process_terminate_ms: u64,
}

impl Default for LspConfig {
    fn default() -> Self {
        let client = ClientOptions::default();
        Self {
            server: ServerKind::default(),
            tcp_port: None,
            request_timeout_ms: millis(client.request_timeout),
            initialize_timeout_ms: millis(client.initialize_timeout),
            shutdown_timeout_ms: millis(client.shutdown_timeout),
            process_grace_ms: millis(client.process.graceful),
            process_terminate_ms: millis(client.process.terminate),
        }
    }
}

/// Symbol store section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file
    pub path: PathBuf,
    /// Rows per transaction in bulk inserts
    pub batch_size: usize,
    /// Attempts per write, including the first
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            batch_size: store.batch_size,
            max_retries: store.max_retries,
            retry_backoff_ms: millis(store.retry_backoff),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `lodestar=debug`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

// Durations in this crate are far below u64::MAX milliseconds.
#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl LodestarConfig {
    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read and [`Error::Config`]
    /// if it is not valid YAML or fails [`LodestarConfig::validate`].
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check values that deserialize fine but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("lsp.request_timeout_ms", self.lsp.request_timeout_ms),
            ("lsp.initialize_timeout_ms", self.lsp.initialize_timeout_ms),
            ("lsp.shutdown_timeout_ms", self.lsp.shutdown_timeout_ms),
            ("lsp.process_grace_ms", self.lsp.process_grace_ms),
            ("lsp.process_terminate_ms", self.lsp.process_terminate_ms),
        ];
        if let Some((key, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(Error::Config(format!("{key} must be greater than zero")));
        }

        if self.lsp.tcp_port == Some(0) {
            return Err(Error::Config("lsp.tcp_port must not be 0".to_string()));
        }
        self.provider()?;

        if self.store.path.as_os_str().is_empty() {
            return Err(Error::Config("store.path must not be empty".to_string()));
        }
        self.store_options().validate()?;

        EnvFilter::try_new(&self.logging.level).map_err(|e| {
            Error::Config(format!("logging.level '{}' is invalid: {e}", self.logging.level))
        })?;
        Ok(())
    }

    /// Client timeouts from the `lsp` section.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: Duration::from_millis(self.lsp.request_timeout_ms),
            initialize_timeout: Duration::from_millis(self.lsp.initialize_timeout_ms),
            shutdown_timeout: Duration::from_millis(self.lsp.shutdown_timeout_ms),
            process: ShutdownTimeouts {
                graceful: Duration::from_millis(self.lsp.process_grace_ms),
                terminate: Duration::from_millis(self.lsp.process_terminate_ms),
            },
            ..ClientOptions::default()
        }
    }

    /// Store tuning from the `store` section.
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            batch_size: self.store.batch_size,
            max_retries: self.store.max_retries,
            retry_backoff: Duration::from_millis(self.store.retry_backoff_ms),
            ..StoreOptions::default()
        }
    }

    /// The configured language server backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the backend cannot use the requested
    /// transport.
    pub fn provider(&self) -> Result<AnyProvider> {
        AnyProvider::from_kind(self.lsp.server, self.lsp.tcp_port)
            .map_err(|e| Error::Config(format!("lsp: {e}")))
    }
}
