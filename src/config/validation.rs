#![allow(clippy::collapsible_if)]

use std::{collections::HashSet, net::SocketAddr};

use eyre::Result;
use http::HeaderName;

use crate::config::models::{
    ControlHeaderNames, HeaderRulesConfig, LimitsConfig, ServerConfig, StaticFilesConfig,
    UpstreamConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Conflict detected: {message}")]
    Conflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        errors.extend(Self::validate_paths(config));
        errors.extend(Self::validate_upstream(&config.upstream));

        if config.session.cookie_name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "session.cookie_name".to_string(),
            });
        } else if !Self::is_cookie_token(&config.session.cookie_name) {
            errors.push(ValidationError::InvalidField {
                field: "session.cookie_name".to_string(),
                message: format!(
                    "'{}' is not a valid cookie name",
                    config.session.cookie_name
                ),
            });
        }

        errors.extend(Self::validate_header_rules(&config.headers));
        errors.extend(Self::validate_limits(&config.limits));

        if let Some(static_files) = &config.static_files {
            if let Err(e) = Self::validate_static_files(static_files) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_paths(config: &ServerConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, path) in [
            ("forward_path", &config.forward_path),
            ("health_path", &config.health_path),
        ] {
            if !path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("Path '{path}' must start with '/'"),
                });
            }
        }

        if config.forward_path == config.health_path {
            errors.push(ValidationError::Conflict {
                message: format!(
                    "forward_path and health_path are both '{}'",
                    config.forward_path
                ),
            });
        }

        errors
    }

    fn validate_upstream(upstream: &UpstreamConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if upstream.allowed_host.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "upstream.allowed_host".to_string(),
            });
        } else if let Err(e) = url::Host::parse(&upstream.allowed_host) {
            errors.push(ValidationError::InvalidField {
                field: "upstream.allowed_host".to_string(),
                message: format!(
                    "'{}' must be a bare hostname without scheme, port or path: {e}",
                    upstream.allowed_host
                ),
            });
        }

        match upstream.timeout_duration() {
            Ok(duration) if duration.is_zero() => {
                errors.push(ValidationError::InvalidField {
                    field: "upstream.timeout".to_string(),
                    message: "Timeout must be greater than zero".to_string(),
                });
            }
            Ok(_) => {}
            Err(e) => {
                errors.push(ValidationError::InvalidField {
                    field: "upstream.timeout".to_string(),
                    message: format!("Invalid duration '{}': {e}", upstream.timeout),
                });
            }
        }

        if let Some(user_agent) = &upstream.user_agent {
            if http::HeaderValue::from_str(user_agent).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "upstream.user_agent".to_string(),
                    message: "User-Agent contains characters not allowed in a header".to_string(),
                });
            }
        }

        errors
    }

    fn validate_header_rules(headers: &HeaderRulesConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        errors.extend(Self::validate_control_headers(&headers.mapping));

        for (field, names) in [
            ("headers.deny_request", &headers.deny_request),
            ("headers.deny_response", &headers.deny_response),
        ] {
            for name in names {
                if HeaderName::from_bytes(name.as_bytes()).is_err() {
                    errors.push(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: format!("'{name}' is not a valid header name"),
                    });
                }
            }
        }

        errors
    }

    fn validate_control_headers(mapping: &ControlHeaderNames) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for name in mapping.all() {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(header) => {
                    if !seen.insert(header) {
                        errors.push(ValidationError::Conflict {
                            message: format!("control header '{name}' is mapped more than once"),
                        });
                    }
                }
                Err(_) => errors.push(ValidationError::InvalidField {
                    field: "headers.mapping".to_string(),
                    message: format!("'{name}' is not a valid header name"),
                }),
            }
        }

        errors
    }

    fn validate_limits(limits: &LimitsConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if limits.max_request_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "limits.max_request_body_bytes".to_string(),
                message: "Limit must be greater than 0".to_string(),
            });
        }
        if limits.max_response_body_bytes == 0 {
            errors.push(ValidationError::InvalidField {
                field: "limits.max_response_body_bytes".to_string(),
                message: "Limit must be greater than 0".to_string(),
            });
        }
        errors
    }

    fn validate_static_files(config: &StaticFilesConfig) -> ValidationResult<()> {
        if !std::path::Path::new(&config.root).is_dir() {
            return Err(ValidationError::InvalidField {
                field: "static_files.root".to_string(),
                message: format!("Static root directory '{}' does not exist", config.root),
            });
        }
        if config.index_file.contains("..") || config.index_file.starts_with('/') {
            return Err(ValidationError::InvalidField {
                field: "static_files.index_file".to_string(),
                message: "Index file must be a relative path inside the root".to_string(),
            });
        }
        Ok(())
    }

    /// RFC 6265 cookie-name token check
    fn is_cookie_token(name: &str) -> bool {
        name.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')'
                        | b'<'
                        | b'>'
                        | b'@'
                        | b','
                        | b';'
                        | b':'
                        | b'\\'
                        | b'"'
                        | b'/'
                        | b'['
                        | b']'
                        | b'?'
                        | b'='
                        | b'{'
                        | b'}'
                )
        })
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. {e}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
