//! Configuration data structures for the relay.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and carry defaults so that a minimal config only needs the
//! allow-listed upstream host.
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_forward_path() -> String {
    "/relay".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_timeout() -> String {
    "30s".to_string()
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Path that triggers the forward flow
    #[serde(default = "default_forward_path")]
    pub forward_path: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub headers: HeaderRulesConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub static_files: Option<StaticFilesConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// Hostname every target URL must resolve to (no scheme, no port)
    pub allowed_host: String,
    /// Also accept `*.allowed_host`
    #[serde(default)]
    pub allow_subdomains: bool,
    #[serde(default = "default_timeout")]
    pub timeout: String, // Parsed by humantime, e.g., "500ms", "30s", "1m"
    /// User-Agent sent when the caller did not provide one
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl UpstreamConfig {
    /// Parse the configured timeout.
    pub fn timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.timeout)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie injected from the session control header and harvested from `Set-Cookie`
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HeaderRulesConfig {
    /// Extra inbound header names never forwarded upstream
    pub deny_request: Vec<String>,
    /// Extra upstream response header names never relayed back
    pub deny_response: Vec<String>,
    pub mapping: ControlHeaderNames,
}

/// Names of the inbound control headers consumed by the relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ControlHeaderNames {
    /// Becomes `Cookie: <cookie_name>=<value>`
    pub session: String,
    /// Becomes `Host`
    pub host: String,
    /// Becomes `Origin`
    pub origin: String,
    /// Becomes `Referer`
    pub referer: String,
    /// Carries the target URL
    pub target: String,
}

impl ControlHeaderNames {
    /// All control header names, target included.
    pub fn all(&self) -> [&str; 5] {
        [
            self.session.as_str(),
            self.host.as_str(),
            self.origin.as_str(),
            self.referer.as_str(),
            self.target.as_str(),
        ]
    }
}

impl Default for ControlHeaderNames {
    fn default() -> Self {
        Self {
            session: "x-relay-session".to_string(),
            host: "x-relay-host".to_string(),
            origin: "x-relay-origin".to_string(),
            referer: "x-relay-referer".to_string(),
            target: "x-relay-target".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_request_body_bytes: usize,
    pub max_response_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_body_bytes: DEFAULT_BODY_LIMIT,
            max_response_body_bytes: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Configuration for the static HTML fallback
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StaticFilesConfig {
    /// Root directory for static files
    pub root: String,
    /// File served for directories and for unknown paths
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    forward_path: Option<String>,
    health_path: Option<String>,
    allowed_host: Option<String>,
    allow_subdomains: bool,
    timeout: Option<String>,
    user_agent: Option<String>,
    cookie_name: Option<String>,
    headers: Option<HeaderRulesConfig>,
    limits: Option<LimitsConfig>,
    static_files: Option<StaticFilesConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn forward_path(mut self, path: impl Into<String>) -> Self {
        self.forward_path = Some(path.into());
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Set the allow-listed upstream host
    pub fn allowed_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_host = Some(host.into());
        self
    }

    pub fn allow_subdomains(mut self, enabled: bool) -> Self {
        self.allow_subdomains = enabled;
        self
    }

    /// Set the upstream timeout as a humantime string ("250ms", "30s")
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    pub fn headers(mut self, headers: HeaderRulesConfig) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set static files configuration
    pub fn static_files(mut self, config: StaticFilesConfig) -> Self {
        self.static_files = Some(config);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        let allowed_host = self
            .allowed_host
            .ok_or_else(|| "allowed_host is required".to_string())?;

        Ok(ServerConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            forward_path: self.forward_path.unwrap_or_else(default_forward_path),
            health_path: self.health_path.unwrap_or_else(default_health_path),
            upstream: UpstreamConfig {
                allowed_host,
                allow_subdomains: self.allow_subdomains,
                timeout: self.timeout.unwrap_or_else(default_timeout),
                user_agent: self.user_agent,
            },
            session: SessionConfig {
                cookie_name: self.cookie_name.unwrap_or_else(default_cookie_name),
            },
            headers: self.headers.unwrap_or_default(),
            limits: self.limits.unwrap_or_default(),
            static_files: self.static_files,
            logging: LoggingConfig::default(),
        })
    }
}
