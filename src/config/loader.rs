use std::path::Path;

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Prefix for structured environment overrides, e.g. `GATEWAY_AUTH__JWT_SECRET`.
pub const ENV_PREFIX: &str = "GATEWAY";

/// Load configuration from an optional file plus environment overrides.
///
/// Precedence, lowest first: built-in defaults, the file, `GATEWAY_*`
/// variables, then the deployment variables (`APP_HOST`, `JWT_SECRET`, ...).
pub async fn load_config(config_path: Option<&str>) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: Option<&str>) -> Result<GatewayConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        builder = builder.add_source(file_source(path)?);
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder = apply_overrides(builder, deployment_overrides(|key| std::env::var(key).ok()))?;

    let settings = builder
        .build()
        .wrap_err("Failed to build gateway configuration")?;

    let gateway_config: GatewayConfig = settings
        .try_deserialize()
        .wrap_err("Failed to deserialize gateway configuration")?;

    Ok(gateway_config)
}

fn file_source(config_path: &str) -> Result<File<config::FileSourceFile, FileFormat>> {
    let path = Path::new(config_path);

    // Determine file format based on extension
    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let path_str = path
        .to_str()
        .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;

    Ok(File::new(path_str, format))
}

/// Map the deployment's plain environment variables onto config keys.
///
/// Empty values count as unset. `APP_HOST` and `APP_PORT` combine into
/// `listen_addr`, each falling back to its default when only the other is set.
pub fn deployment_overrides<F>(lookup: F) -> Vec<(&'static str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
    let mut overrides = Vec::new();

    let host = get("APP_HOST");
    let port = get("APP_PORT");
    if host.is_some() || port.is_some() {
        overrides.push((
            "listen_addr",
            format!(
                "{}:{}",
                host.unwrap_or_else(|| "0.0.0.0".to_string()),
                port.unwrap_or_else(|| "8080".to_string())
            ),
        ));
    }

    let mapping = [
        ("JWT_SECRET", "auth.jwt_secret"),
        ("AUTH_SERVICE_URL", "services.identity"),
        ("DATA_SERVICE_URL", "services.portfolio"),
        ("ANALYSIS_SERVICE_URL", "services.analysis"),
        ("APP_ENV", "environment"),
    ];
    for (var, key) in mapping {
        if let Some(value) = get(var) {
            overrides.push((key, value));
        }
    }

    overrides
}

fn apply_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    overrides: Vec<(&'static str, String)>,
) -> Result<ConfigBuilder<DefaultState>> {
    for (key, value) in overrides {
        tracing::debug!(key, "Applying deployment environment override");
        builder = builder
            .set_override(key, value)
            .wrap_err_with(|| format!("Invalid override for {key}"))?;
    }
    Ok(builder)
}
