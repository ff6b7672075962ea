//! Configuration data structures for the gateway.
//!
//! These types map directly to YAML / TOML / JSON configuration files and to
//! `GATEWAY_*` environment overrides. Every struct carries `#[serde(default)]`
//! so that a missing file, or a file naming a single key, still produces a
//! complete configuration.
use serde::{Deserialize, Serialize};

/// Placeholder secret shipped with the defaults. Rejected in production.
pub const DEFAULT_JWT_SECRET: &str = "your-secret-key";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// Socket address the gateway binds to.
    pub listen_addr: String,
    /// Deployment environment name (`development`, `production`, ...).
    pub environment: String,
    /// Path prefix stripped from API paths before forwarding.
    pub api_prefix: String,
    pub auth: AuthConfig,
    pub services: ServicesConfig,
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cors: CorsConfig,
    pub log: LogConfig,
    pub routes: Vec<RouteConfig>,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            environment: "development".to_string(),
            api_prefix: "/api".to_string(),
            auth: AuthConfig::default(),
            services: ServicesConfig::default(),
            rate_limit: RateLimitConfig::default(),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            cors: CorsConfig::default(),
            log: LogConfig::default(),
            routes: default_routes(),
        }
    }
}

/// Bearer token verification settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret shared with the identity service.
    pub jwt_secret: String,
    /// Claim holding the subject identifier.
    pub user_id_claim: String,
    /// Clock skew tolerated when checking `exp`, in seconds.
    pub leeway_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            user_id_claim: "user_id".to_string(),
            leeway_secs: 0,
        }
    }
}

/// Base URLs of the backend services.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServicesConfig {
    pub identity: String,
    pub portfolio: String,
    pub analysis: String,
}

impl ServicesConfig {
    /// Base URL for a backend target; `None` for routes the gateway serves itself.
    pub fn url_for(&self, target: ServiceTarget) -> Option<&str> {
        match target {
            ServiceTarget::Gateway => None,
            ServiceTarget::Identity => Some(&self.identity),
            ServiceTarget::Portfolio => Some(&self.portfolio),
            ServiceTarget::Analysis => Some(&self.analysis),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            identity: "http://auth-service:8081".to_string(),
            portfolio: "http://data-service:8082".to_string(),
            analysis: "http://analysis-service:8083".to_string(),
        }
    }
}

/// Fixed-window limits applied per client address.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per window.
    pub requests: u64,
    /// Window length, parsed by humantime ("60s", "1m").
    pub window: String,
    /// How often stale counters are swept, and how old they must be.
    pub sweep_interval: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window: "60s".to_string(),
            sweep_interval: "5m".to_string(),
        }
    }
}

/// Timeouts on inbound connections.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Longest wait for the next chunk of a request body.
    pub read_timeout_secs: u64,
    /// Longest time from request to response headers.
    pub write_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 120,
            write_timeout_secs: 120,
        }
    }
}

/// Gateway-wide timeouts for backend calls. The request timeout bounds the
/// wait for response headers and then every gap between body chunks.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` reflects any caller origin.
    pub allowed_origins: Vec<String>,
    pub allowed_methods: String,
    pub allowed_headers: String,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: "GET, POST, PUT, DELETE, OPTIONS".to_string(),
            allowed_headers: "Content-Type, Authorization, X-Requested-With".to_string(),
            max_age_secs: 86400,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Whether a route requires a validated bearer token.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteAccess {
    Public,
    Protected,
}

/// Where a matched request is dispatched.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTarget {
    /// Answered by the gateway itself (health report).
    Gateway,
    Identity,
    Portfolio,
    Analysis,
}

impl std::fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceTarget::Gateway => write!(f, "gateway"),
            ServiceTarget::Identity => write!(f, "identity"),
            ServiceTarget::Portfolio => write!(f, "portfolio"),
            ServiceTarget::Analysis => write!(f, "analysis"),
        }
    }
}

/// One row of the route table. `path` is a template such as
/// `/api/portfolios/{id}/holdings`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<String>,
    pub access: RouteAccess,
    pub target: ServiceTarget,
}

impl RouteConfig {
    pub fn new(
        path: impl Into<String>,
        methods: &[&str],
        access: RouteAccess,
        target: ServiceTarget,
    ) -> Self {
        Self {
            path: path.into(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            access,
            target,
        }
    }
}

/// The public surface of the backend.
pub fn default_routes() -> Vec<RouteConfig> {
    use RouteAccess::{Protected, Public};
    use ServiceTarget::{Analysis, Gateway, Identity, Portfolio};

    vec![
        RouteConfig::new("/health", &["GET"], Public, Gateway),
        // Credential issuance / exchange
        RouteConfig::new("/api/auth/register", &["POST"], Public, Identity),
        RouteConfig::new("/api/auth/login", &["POST"], Public, Identity),
        RouteConfig::new("/api/auth/refresh", &["POST"], Public, Identity),
        RouteConfig::new("/api/users/me", &["GET", "PUT"], Protected, Identity),
        // Market data
        RouteConfig::new("/api/stocks", &["GET"], Protected, Portfolio),
        RouteConfig::new("/api/stocks/{symbol}", &["GET"], Protected, Portfolio),
        RouteConfig::new("/api/stocks/{symbol}/history", &["GET"], Protected, Portfolio),
        // Portfolios
        RouteConfig::new("/api/portfolios", &["GET", "POST"], Protected, Portfolio),
        RouteConfig::new(
            "/api/portfolios/{id}",
            &["GET", "PUT", "DELETE"],
            Protected,
            Portfolio,
        ),
        RouteConfig::new(
            "/api/portfolios/{id}/holdings",
            &["GET", "POST"],
            Protected,
            Portfolio,
        ),
        // Analysis
        RouteConfig::new("/api/analysis/generate", &["POST"], Protected, Analysis),
        RouteConfig::new("/api/analysis/history", &["GET"], Protected, Analysis),
        RouteConfig::new("/api/analysis/{id}", &["GET"], Protected, Analysis),
    ]
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = secret.into();
        self
    }

    /// Point a backend target at a base URL. Ignored for [`ServiceTarget::Gateway`].
    pub fn service(mut self, target: ServiceTarget, url: impl Into<String>) -> Self {
        let url = url.into();
        match target {
            ServiceTarget::Gateway => {}
            ServiceTarget::Identity => self.config.services.identity = url,
            ServiceTarget::Portfolio => self.config.services.portfolio = url,
            ServiceTarget::Analysis => self.config.services.analysis = url,
        }
        self
    }

    /// Set the per-client budget and window length.
    pub fn rate_limit(mut self, requests: u64, window: impl Into<String>) -> Self {
        self.config.rate_limit.requests = requests;
        self.config.rate_limit.window = window.into();
        self
    }

    pub fn server_timeouts(mut self, read_secs: u64, write_secs: u64) -> Self {
        self.config.server.read_timeout_secs = read_secs;
        self.config.server.write_timeout_secs = write_secs;
        self
    }

    pub fn upstream_timeouts(mut self, request_secs: u64, connect_secs: u64) -> Self {
        self.config.upstream.request_timeout_secs = request_secs;
        self.config.upstream.connect_timeout_secs = connect_secs;
        self
    }

    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    /// Replace the route table.
    pub fn routes(mut self, routes: Vec<RouteConfig>) -> Self {
        self.config.routes = routes;
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.config.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }
        if self.config.auth.jwt_secret.is_empty() {
            return Err("jwt_secret must not be empty".to_string());
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.rate_limit.requests, 100);
        assert_eq!(config.rate_limit.window, "60s");
        assert_eq!(config.rate_limit.sweep_interval, "5m");
        assert_eq!(config.server.read_timeout_secs, 120);
        assert_eq!(config.server.write_timeout_secs, 120);
        assert_eq!(config.upstream.request_timeout_secs, 120);
        assert_eq!(config.auth.user_id_claim, "user_id");
        assert!(!config.is_production());
    }

    #[test]
    fn test_default_routes_public_set() {
        let public: Vec<_> = default_routes()
            .into_iter()
            .filter(|r| r.access == RouteAccess::Public)
            .map(|r| r.path)
            .collect();
        assert_eq!(
            public,
            vec![
                "/health",
                "/api/auth/register",
                "/api/auth/login",
                "/api/auth/refresh"
            ]
        );
    }

    #[test]
    fn test_url_for_targets() {
        let services = ServicesConfig::default();
        assert_eq!(services.url_for(ServiceTarget::Gateway), None);
        assert_eq!(
            services.url_for(ServiceTarget::Portfolio),
            Some("http://data-service:8082")
        );
    }

    #[test]
    fn test_builder() {
        let config = GatewayConfig::builder()
            .listen_addr("127.0.0.1:0")
            .jwt_secret("s3cret")
            .service(ServiceTarget::Identity, "http://127.0.0.1:9001")
            .rate_limit(5, "1s")
            .build()
            .unwrap();
        assert_eq!(config.services.identity, "http://127.0.0.1:9001");
        assert_eq!(config.rate_limit.requests, 5);
        assert_eq!(config.auth.jwt_secret, "s3cret");

        let err = GatewayConfig::builder().routes(vec![]).build();
        assert!(err.is_err());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{ "auth": { "jwt_secret": "abc" } }"#).unwrap();
        assert_eq!(config.auth.jwt_secret, "abc");
        assert_eq!(config.auth.user_id_claim, "user_id");
        assert_eq!(config.routes.len(), default_routes().len());
    }
}
