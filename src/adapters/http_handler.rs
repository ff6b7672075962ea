use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request, State},
    response::Response,
    routing::any,
};
use eyre::{Result, eyre};
use http::{Method, StatusCode};
use tower_http::{
    cors::CorsLayer,
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
};

use crate::{adapters::cors::cors_layer, core::GatewayService};

/// HTTP handler for the gateway
///
/// Every path and method lands in the same handler; the gateway's own route
/// table decides what happens next. The peer address is taken from axum's
/// `ConnectInfo`, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()` for rate limiting to
/// see real clients.
#[derive(Clone)]
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
    cors: CorsLayer,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>) -> Result<Self> {
        let config = gateway_service.config();
        let cors = cors_layer(&config.cors).map_err(|e| eyre!("Failed to build CORS layer: {e}"))?;
        let read_timeout = Duration::from_secs(config.server.read_timeout_secs);
        let write_timeout = Duration::from_secs(config.server.write_timeout_secs);
        Ok(Self {
            gateway_service,
            cors,
            read_timeout,
            write_timeout,
        })
    }

    /// Main request handler
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        self.gateway_service.handle(req, client_addr).await
    }

    /// Axum router sending every request through the gateway pipeline.
    pub fn into_router(self) -> Router {
        let cors = self.cors.clone();
        let read_timeout = self.read_timeout;
        let write_timeout = self.write_timeout;

        Router::new()
            .route("/{*path}", any(dispatch))
            .route("/", any(dispatch))
            .with_state(self)
            .layer(RequestBodyTimeoutLayer::new(read_timeout))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::SERVICE_UNAVAILABLE,
                write_timeout,
            ))
            // Outermost: preflights never reach the pipeline, and the
            // allow-origin header on every response, proxied ones included,
            // replaces whatever the backend sent.
            .layer(cors)
    }
}

async fn dispatch(State(handler): State<HttpHandler>, req: Request) -> Response {
    // The CORS layer answers preflights carrying Access-Control-Request-Method;
    // any other OPTIONS is answered here without touching the limiter.
    if req.method() == Method::OPTIONS {
        return Response::new(AxumBody::empty());
    }

    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    if client_addr.is_none() {
        tracing::debug!("No connect info on request; rate limiting under 'unknown'");
    }
    handler.handle_request(req, client_addr).await
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use http::header;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        adapters::HttpClientAdapter,
        config::{GatewayConfig, models::CorsConfig},
        ports::http_client::{HttpClient, HttpClientResult},
    };

    fn handler_for(config: GatewayConfig, http_client: Arc<dyn HttpClient>) -> HttpHandler {
        let gateway_service = Arc::new(GatewayService::new(Arc::new(config), http_client).unwrap());
        HttpHandler::new(gateway_service).unwrap()
    }

    fn create_test_handler() -> HttpHandler {
        let config = GatewayConfig::default();
        let http_client = Arc::new(HttpClientAdapter::from_config(&config.upstream).unwrap())
            as Arc<dyn HttpClient>;
        handler_for(config, http_client)
    }

    /// Backend that sets its own CORS header on every response.
    struct CorsSettingBackend;

    #[async_trait]
    impl HttpClient for CorsSettingBackend {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            Ok(Response::builder()
                .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "https://backend.internal")
                .header("x-backend", "portfolio")
                .body(AxumBody::from("[]"))
                .unwrap())
        }
    }

    #[tokio::test]
    async fn test_health_through_router() {
        let app = create_test_handler().into_router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(AxumBody::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_root_path_is_handled_by_gateway() {
        let app = create_test_handler().into_router();
        let response = app
            .oneshot(Request::builder().uri("/").body(AxumBody::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_connect_info_is_forwarded_to_limiter() {
        let handler = create_test_handler();
        let gateway = handler.gateway_service.clone();
        let app = handler.into_router();

        let mut req = Request::builder().uri("/health").body(AxumBody::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo("192.0.2.10:5555".parse::<SocketAddr>().unwrap()));
        app.oneshot(req).await.unwrap();

        assert_eq!(gateway.limiter().tracked_clients(), 1);
        assert!(gateway.limiter().check("192.0.2.10").await.is_ok());
    }

    #[tokio::test]
    async fn test_preflight_is_answered_before_pipeline() {
        let handler = create_test_handler();
        let gateway = handler.gateway_service.clone();
        let app = handler.into_router();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/portfolios")
                    .header(header::ORIGIN, "https://app.example.com")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("POST"));
        assert!(methods.contains("DELETE"));

        // Without Access-Control-Request-Method it is still not counted.
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/stocks")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gateway.limiter().tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_rejections_carry_cors_headers() {
        let app = create_test_handler().into_router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stocks/AAPL")
                    .header(header::ORIGIN, "https://app.example.com")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_listed_origins_are_reflected() {
        let config = GatewayConfig::builder()
            .jwt_secret("handler-secret")
            .cors(CorsConfig {
                allowed_origins: vec!["https://app.example.com".to_string()],
                ..CorsConfig::default()
            })
            .build()
            .unwrap();
        let app = handler_for(config, Arc::new(CorsSettingBackend)).into_router();

        let request = |origin: &str| {
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, origin)
                .body(AxumBody::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(request("https://app.example.com")).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        let vary: Vec<_> = response.headers().get_all(header::VARY).iter().collect();
        assert!(vary.iter().any(|v| v.to_str().unwrap().contains("origin")));

        let response = app.oneshot(request("https://evil.example.com")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_backend_allow_origin_is_replaced() {
        let config = GatewayConfig::builder()
            .jwt_secret("handler-secret")
            .build()
            .unwrap();
        let app = handler_for(config, Arc::new(CorsSettingBackend)).into_router();

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/auth/login")
                    .header(header::ORIGIN, "https://app.example.com")
                    .body(AxumBody::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let origins: Vec<_> = response
            .headers()
            .get_all(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .iter()
            .collect();
        assert_eq!(origins, vec!["*"]);
        // Other backend headers pass through untouched.
        assert_eq!(response.headers()["x-backend"], "portfolio");
    }

    #[test]
    fn test_invalid_cors_config_fails_construction() {
        let mut config = GatewayConfig::default();
        config.cors.allowed_methods = "GET, NOT A METHOD".to_string();
        let http_client = Arc::new(HttpClientAdapter::from_config(&config.upstream).unwrap())
            as Arc<dyn HttpClient>;
        let gateway_service = Arc::new(GatewayService::new(Arc::new(config), http_client).unwrap());
        assert!(HttpHandler::new(gateway_service).is_err());
    }
}
