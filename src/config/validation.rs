use std::net::SocketAddr;

use crate::{
    adapters::cors::cors_layer,
    config::models::{
        AuthConfig, CorsConfig, DEFAULT_JWT_SECRET, GatewayConfig, RateLimitConfig,
        ServerConfig, ServiceTarget, UpstreamConfig,
    },
    core::router::RouteTable,
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

    #[error("Invalid route table: {message}")]
    InvalidRoutes { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire configuration, reporting every problem at once.
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if !config.api_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "api_prefix".to_string(),
                message: "Must start with '/'".to_string(),
            });
        }

        errors.extend(Self::validate_auth(&config.auth, config.is_production()));
        errors.extend(Self::validate_services(config));
        errors.extend(Self::validate_rate_limit(&config.rate_limit));
        errors.extend(Self::validate_server(&config.server));
        errors.extend(Self::validate_upstream(&config.upstream));
        errors.extend(Self::validate_cors(&config.cors));
        errors.extend(Self::validate_routes(config));

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

    fn validate_auth(auth: &AuthConfig, production: bool) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if auth.jwt_secret.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "auth.jwt_secret".to_string(),
            });
        } else if production && auth.jwt_secret == DEFAULT_JWT_SECRET {
            errors.push(ValidationError::InvalidField {
                field: "auth.jwt_secret".to_string(),
                message: "The placeholder secret cannot be used in production".to_string(),
            });
        }

        if auth.user_id_claim.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "auth.user_id_claim".to_string(),
            });
        }

        errors
    }

    fn validate_services(config: &GatewayConfig) -> Vec<ValidationError> {
        [
            ServiceTarget::Identity,
            ServiceTarget::Portfolio,
            ServiceTarget::Analysis,
        ]
        .into_iter()
        .filter_map(|target| {
            let url = config.services.url_for(target)?;
            Self::validate_url(url, &format!("services.{target}")).err()
        })
        .collect()
    }

    fn validate_url(value: &str, field: &str) -> ValidationResult<()> {
        match url::Url::parse(value) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                if parsed.host_str().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: format!("URL '{value}' has no host"),
                    });
                }
                Ok(())
            }
            Ok(_) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("URL '{value}' must use http:// or https://"),
            }),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid URL '{value}': {e}"),
            }),
        }
    }

    fn validate_rate_limit(rate_limit: &RateLimitConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if rate_limit.requests == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.requests".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        for (field, value) in [
            ("rate_limit.window", &rate_limit.window),
            ("rate_limit.sweep_interval", &rate_limit.sweep_interval),
        ] {
            match humantime::parse_duration(value) {
                Ok(duration) if duration.is_zero() => {
                    errors.push(ValidationError::InvalidField {
                        field: field.to_string(),
                        message: "Must be greater than zero".to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: format!("Invalid duration '{value}': {e}"),
                }),
            }
        }

        errors
    }

    fn validate_server(server: &ServerConfig) -> Vec<ValidationError> {
        [
            ("server.read_timeout_secs", server.read_timeout_secs),
            ("server.write_timeout_secs", server.write_timeout_secs),
        ]
        .into_iter()
        .filter(|(_, secs)| *secs == 0)
        .map(|(field, _)| ValidationError::InvalidField {
            field: field.to_string(),
            message: "Must be greater than 0".to_string(),
        })
        .collect()
    }

    fn validate_upstream(upstream: &UpstreamConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if upstream.request_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "upstream.request_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if upstream.connect_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "upstream.connect_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        errors
    }

    fn validate_cors(cors: &CorsConfig) -> Vec<ValidationError> {
        match cors_layer(cors) {
            Ok(_) => Vec::new(),
            Err(message) => vec![ValidationError::InvalidField {
                field: "cors".to_string(),
                message,
            }],
        }
    }

    fn validate_routes(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
            return errors;
        }

        for route in &config.routes {
            if !route.path.starts_with('/') {
                errors.push(ValidationError::InvalidField {
                    field: format!("route path: {}", route.path),
                    message: "Route paths must start with '/'".to_string(),
                });
            }
            if route.methods.is_empty() {
                errors.push(ValidationError::InvalidField {
                    field: format!("route '{}' methods", route.path),
                    message: "At least one method is required".to_string(),
                });
            }
        }

        if let Err(e) = RouteTable::from_config(&config.routes, &config.api_prefix) {
            errors.push(ValidationError::InvalidRoutes {
                message: e.to_string(),
            });
        }

        errors
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("  {}. {}", i + 1, e))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
