//! Plugin configuration
//!
//! A [`PluginConfig`] is built once per invocation and never mutated
//! afterwards. Everything downstream (transport choice, output shape,
//! graph definition) is derived from it.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PumaError, Result};

/// Metric key prefix used when none (or an empty one) is configured
pub const DEFAULT_PREFIX: &str = "puma";

pub const DEFAULT_HOST: &str = "127.0.0.1";

pub const DEFAULT_PORT: u16 = 9293;

/// Which introspection endpoint to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsKind {
    Stats,
    GcStats,
}

impl StatsKind {
    pub fn path(&self) -> &'static str {
        match self {
            StatsKind::Stats => "stats",
            StatsKind::GcStats => "gc-stats",
        }
    }
}

impl fmt::Display for StatsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Deployment mode of the monitored server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Multiple indexed workers, reported through `worker_status`
    #[default]
    Clustered,
    /// One worker, reported through flat top-level fields
    Single,
}

/// Where the control server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp {
        host: String,
        port: u16,
    },
    /// HTTP carried over a unix domain socket. Host and port only end up
    /// in the `Host` header.
    UnixSocket {
        path: PathBuf,
        host: String,
        port: u16,
    },
}

impl Endpoint {
    /// `host:port` as it appears in URLs and the `Host` header
    pub fn authority(&self) -> String {
        let (host, port) = match self {
            Endpoint::Tcp { host, port } => (host, port),
            Endpoint::UnixSocket { host, port, .. } => (host, port),
        };
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { .. } => write!(f, "http://{}", self.authority()),
            Endpoint::UnixSocket { path, .. } => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Immutable per-invocation configuration
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub prefix: String,
    pub endpoint: Endpoint,
    pub token: String,
    pub with_gc: bool,
    pub mode: Mode,
    /// Deadline for each request, connection included
    pub timeout: Option<Duration>,
}

impl PluginConfig {
    pub fn builder() -> PluginConfigBuilder {
        PluginConfigBuilder::new()
    }

    /// Prefix for every reported metric key
    pub fn metric_key_prefix(&self) -> &str {
        if self.prefix.is_empty() {
            DEFAULT_PREFIX
        } else {
            &self.prefix
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            endpoint: Endpoint::Tcp {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            token: String::new(),
            with_gc: false,
            mode: Mode::Clustered,
            timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Builder for [`PluginConfig`]
pub struct PluginConfigBuilder {
    prefix: String,
    host: String,
    port: u16,
    sock: Option<PathBuf>,
    token: String,
    with_gc: bool,
    mode: Mode,
    timeout: Option<Duration>,
}

impl PluginConfigBuilder {
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            sock: None,
            token: String::new(),
            with_gc: false,
            mode: Mode::Clustered,
            timeout: Some(Duration::from_secs(10)),
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Dial this socket instead of TCP. Takes precedence over host/port.
    pub fn sock(mut self, path: Option<PathBuf>) -> Self {
        self.sock = path;
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_gc(mut self, with_gc: bool) -> Self {
        self.with_gc = with_gc;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<PluginConfig> {
        if self.host.trim().is_empty() {
            return Err(PumaError::InvalidEndpoint("host must not be empty".into()));
        }

        let endpoint = match self.sock {
            Some(path) if path.as_os_str().is_empty() => {
                return Err(PumaError::InvalidEndpoint(
                    "socket path must not be empty".into(),
                ));
            }
            Some(path) => Endpoint::UnixSocket {
                path,
                host: self.host,
                port: self.port,
            },
            None => Endpoint::Tcp {
                host: self.host,
                port: self.port,
            },
        };

        Ok(PluginConfig {
            prefix: self.prefix,
            endpoint,
            token: self.token,
            with_gc: self.with_gc,
            mode: self.mode,
            timeout: self.timeout,
        })
    }
}

impl Default for PluginConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
