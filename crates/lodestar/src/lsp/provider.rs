//! Language-server backends and how to launch them.

use std::fmt;

use lsp_types::ClientCapabilities;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::capabilities::{self, has_capability};
use super::error::LspError;
use super::Result;

/// Loopback address socket-mode servers bind to.
pub const LOCALHOST: &str = "127.0.0.1";

/// How the client reaches a launched server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// JSON-RPC over the child's stdin/stdout.
    Stdio,
    /// JSON-RPC over a TCP socket the child listens on.
    Tcp {
        /// Host to connect to.
        host: String,
        /// Port to connect to.
        port: u16,
    },
}

/// Trait for configuring language-server backends.
///
/// Implementations define how to spawn a server, what to send it during the
/// handshake, and which advertised capabilities make it usable.
///
/// # Example
///
/// ```rust
/// use lodestar::lsp::LspProvider;
///
/// #[derive(Debug)]
/// struct Jedi;
///
/// impl LspProvider for Jedi {
///     fn name(&self) -> &'static str { "jedi" }
///     fn command(&self) -> &'static str { "jedi-language-server" }
///     fn install_hint(&self) -> &'static str { "pip install jedi-language-server" }
/// }
/// ```
pub trait LspProvider: Send + Sync + fmt::Debug {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// The executable to spawn.
    fn command(&self) -> &'static str;

    /// Command-line arguments for the server.
    fn args(&self) -> Vec<String> {
        vec![]
    }

    /// How to talk to the spawned process.
    fn transport(&self) -> Transport {
        Transport::Stdio
    }

    /// Capabilities sent in `initialize`.
    fn client_capabilities(&self) -> ClientCapabilities {
        capabilities::client_capabilities()
    }

    /// Backend-specific `initializationOptions`.
    fn initialize_options(&self) -> Option<Value> {
        None
    }

    /// Keys that must be present under `capabilities` in the initialize result.
    fn required_capabilities(&self) -> &'static [&'static str] {
        &["textDocumentSync"]
    }

    /// Check the raw initialize result before the session is used.
    ///
    /// # Errors
    ///
    /// Returns [`LspError::InitializeFailed`] if there is no `capabilities`
    /// object, or [`LspError::MissingCapability`] for the first required key
    /// that is absent.
    fn validate_initialize(&self, result: &Value) -> Result<()> {
        if !result.get("capabilities").is_some_and(Value::is_object) {
            return Err(LspError::InitializeFailed(format!(
                "{} returned no capabilities object",
                self.name()
            )));
        }
        for capability in self.required_capabilities() {
            if !has_capability(result, capability) {
                return Err(LspError::MissingCapability {
                    server: self.name().to_string(),
                    capability: (*capability).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Installation hint shown when the server is not found.
    fn install_hint(&self) -> &'static str {
        "Please install the language server and ensure it's in your PATH."
    }
}

/// Backend for `pylsp` (python-lsp-server).
///
/// Runs over stdio by default. [`PylspProvider::tcp`] starts it in socket
/// mode on a loopback port instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PylspProvider {
    tcp_port: Option<u16>,
}

impl PylspProvider {
    /// Socket-mode backend listening on `127.0.0.1:<port>`.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self {
            tcp_port: Some(port),
        }
    }
}

impl LspProvider for PylspProvider {
    fn name(&self) -> &'static str {
        "pylsp"
    }

    fn command(&self) -> &'static str {
        "pylsp"
    }

    fn args(&self) -> Vec<String> {
        match self.tcp_port {
            Some(port) => vec![
                "--tcp".to_string(),
                "--host".to_string(),
                LOCALHOST.to_string(),
                "--port".to_string(),
                port.to_string(),
            ],
            None => vec![],
        }
    }

    fn transport(&self) -> Transport {
        match self.tcp_port {
            Some(port) => Transport::Tcp {
                host: LOCALHOST.to_string(),
                port,
            },
            None => Transport::Stdio,
        }
    }

    fn initialize_options(&self) -> Option<Value> {
        // Navigation runs on jedi; the linters only add diagnostics noise.
        Some(json!({
            "pylsp": {
                "plugins": {
                    "jedi_definition": {"enabled": true, "follow_imports": true},
                    "jedi_references": {"enabled": true},
                    "jedi_hover": {"enabled": true},
                    "jedi_symbols": {"enabled": true, "all_scopes": true},
                    "pycodestyle": {"enabled": false},
                    "pyflakes": {"enabled": false},
                    "mccabe": {"enabled": false}
                }
            }
        }))
    }

    fn install_hint(&self) -> &'static str {
        "Install pylsp: pip install python-lsp-server"
    }
}

/// Backend for `pyright-langserver`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PyrightProvider;

impl LspProvider for PyrightProvider {
    fn name(&self) -> &'static str {
        "pyright"
    }

    fn command(&self) -> &'static str {
        "pyright-langserver"
    }

    fn args(&self) -> Vec<String> {
        vec!["--stdio".to_string()]
    }

    fn initialize_options(&self) -> Option<Value> {
        Some(json!({
            "python": {
                "analysis": {
                    "autoSearchPaths": true,
                    "useLibraryCodeForTypes": true,
                    "diagnosticMode": "openFilesOnly"
                }
            }
        }))
    }

    fn required_capabilities(&self) -> &'static [&'static str] {
        &["textDocumentSync", "definitionProvider"]
    }

    fn install_hint(&self) -> &'static str {
        "Install pyright: npm install -g pyright (or pip install pyright)"
    }
}

/// Backend selector used in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    /// python-lsp-server.
    #[default]
    Pylsp,
    /// pyright.
    Pyright,
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pylsp => f.write_str("pylsp"),
            Self::Pyright => f.write_str("pyright"),
        }
    }
}

/// Provider type that can be selected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyProvider {
    /// python-lsp-server.
    Pylsp(PylspProvider),
    /// pyright.
    Pyright(PyrightProvider),
}

impl AnyProvider {
    /// Build a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LspError::UnsupportedTransport`] when a TCP port is requested
    /// for a backend that only speaks stdio.
    pub fn from_kind(kind: ServerKind, tcp_port: Option<u16>) -> Result<Self> {
        match (kind, tcp_port) {
            (ServerKind::Pylsp, Some(port)) => Ok(Self::Pylsp(PylspProvider::tcp(port))),
            (ServerKind::Pylsp, None) => Ok(Self::Pylsp(PylspProvider::default())),
            (ServerKind::Pyright, None) => Ok(Self::Pyright(PyrightProvider)),
            (ServerKind::Pyright, Some(_)) => Err(LspError::UnsupportedTransport(
                "pyright only supports stdio".to_string(),
            )),
        }
    }

    fn inner(&self) -> &dyn LspProvider {
        match self {
            Self::Pylsp(p) => p,
            Self::Pyright(p) => p,
        }
    }
}

impl LspProvider for AnyProvider {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn command(&self) -> &'static str {
        self.inner().command()
    }

    fn args(&self) -> Vec<String> {
        self.inner().args()
    }

    fn transport(&self) -> Transport {
        self.inner().transport()
    }

    fn client_capabilities(&self) -> ClientCapabilities {
        self.inner().client_capabilities()
    }

    fn initialize_options(&self) -> Option<Value> {
        self.inner().initialize_options()
    }

    fn required_capabilities(&self) -> &'static [&'static str] {
        self.inner().required_capabilities()
    }

    fn validate_initialize(&self, result: &Value) -> Result<()> {
        self.inner().validate_initialize(result)
    }

    fn install_hint(&self) -> &'static str {
        self.inner().install_hint()
    }
}
