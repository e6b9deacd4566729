use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for environment overrides, e.g. `RELAY__UPSTREAM__ALLOWED_HOST`
pub const ENV_PREFIX: &str = "RELAY";

/// Commented starter configuration written by `relay init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# relay configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Requests to this path are forwarded upstream
forward_path = "/relay"
health_path = "/health"

[upstream]
# The only host requests may be forwarded to
allowed_host = "example.com"
allow_subdomains = false
# Covers connect, response headers and the full body read
timeout = "30s"
# user_agent = "relay/0.1"

[session]
# Cookie injected from x-relay-session and harvested from Set-Cookie
cookie_name = "session"

[headers]
# Extra names appended to the built-in deny-lists
deny_request = []
deny_response = []

# [headers.mapping]
# session = "x-relay-session"
# host = "x-relay-host"
# origin = "x-relay-origin"
# referer = "x-relay-referer"
# target = "x-relay-target"

[limits]
max_request_body_bytes = 10485760
max_response_body_bytes = 10485760

# [static_files]
# root = "./public"
# index_file = "index.html"

[logging]
# RUST_LOG takes precedence when set
level = "info"
json = false
"#;

/// Load configuration from a file using the config crate, with `RELAY__*`
/// environment overrides layered on top.
/// Supports multiple formats: TOML, YAML, JSON.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    load_config_with_env(config_path, default_environment())
}

fn default_environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

/// Load configuration from `config_path` using an explicit environment source.
pub fn load_config_with_env(config_path: &str, environment: Environment) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(environment)
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(server_config)
}
