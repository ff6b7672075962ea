//! Cross-origin policy for the gateway router.
use std::time::Duration;

use http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::models::CorsConfig;

/// Build the CORS layer from configuration.
///
/// A `*` entry in `allowed_origins` allows every origin and answers with a
/// literal `*`. Methods and headers are comma-separated lists.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, String> {
    let allow_origin = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|e| format!("Invalid CORS origin '{origin}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    let methods = split_list(&config.allowed_methods)
        .map(|m| {
            Method::from_bytes(m.as_bytes()).map_err(|e| format!("Invalid CORS method '{m}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let headers = split_list(&config.allowed_headers)
        .map(|h| {
            HeaderName::from_bytes(h.as_bytes())
                .map_err(|e| format!("Invalid CORS header '{h}': {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.max_age_secs)))
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        assert!(cors_layer(&CorsConfig::default()).is_ok());
    }

    #[test]
    fn test_bad_entries_are_reported() {
        let config = CorsConfig {
            allowed_origins: vec!["https://ok.example".to_string(), "bad\norigin".to_string()],
            ..CorsConfig::default()
        };
        let err = cors_layer(&config).unwrap_err();
        assert!(err.contains("Invalid CORS origin"));

        let config = CorsConfig {
            allowed_headers: "Content-Type, Bad Header".to_string(),
            ..CorsConfig::default()
        };
        let err = cors_layer(&config).unwrap_err();
        assert!(err.contains("Bad Header"));
    }

    #[test]
    fn test_list_splitting_ignores_blanks() {
        let items: Vec<_> = split_list(" GET,POST , ,DELETE ").collect();
        assert_eq!(items, vec!["GET", "POST", "DELETE"]);
    }
}
