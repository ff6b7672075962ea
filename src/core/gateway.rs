//! Core gateway orchestration service.
//!
//! The `GatewayService` turns an immutable [`GatewayConfig`] into the runtime
//! pieces of the request path: the compiled route table, the token validator,
//! the fixed-window limiter and the proxy forwarder. They are assembled into a
//! [`Pipeline`] once at construction, so handling a request is a single call
//! to [`GatewayService::handle`].
use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    Json,
    body::Body,
    response::{IntoResponse, Response},
};
use eyre::{Result, WrapErr, eyre};
use http::Request;
use serde::Serialize;

use crate::{
    config::models::{GatewayConfig, ServiceTarget},
    core::{
        auth::TokenValidator,
        pipeline::{Dispatcher, Pipeline, RequestContext, Stage},
        proxy::ProxyForwarder,
        rate_limiter::FixedWindowLimiter,
        router::{RouteError, RouteTable},
        stages::{AuthenticationStage, LoggingStage, RateLimitStage, RoutingStage},
    },
    error::GatewayError,
    ports::http_client::HttpClient,
};

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
}

impl HealthReport {
    pub fn healthy() -> Self {
        Self {
            status: "healthy",
            service: "api-gateway",
        }
    }
}

/// Final step: answer locally or proxy to the routed backend.
struct RouteDispatcher {
    proxy: ProxyForwarder,
}

#[async_trait]
impl Dispatcher for RouteDispatcher {
    async fn dispatch(
        &self,
        req: Request<Body>,
        ctx: &RequestContext,
    ) -> Result<Response<Body>, GatewayError> {
        let route = ctx.route.as_ref().ok_or(RouteError::NotFound)?;
        match route.target {
            ServiceTarget::Gateway => Ok(Json(HealthReport::healthy()).into_response()),
            _ => self.proxy.forward(req, route).await,
        }
    }
}

/// Central orchestrator owning the request pipeline and its shared state.
///
/// Construct with [`GatewayService::new`]; call
/// [`start_background_tasks`](Self::start_background_tasks) once serving
/// begins and [`shutdown`](Self::shutdown) when it ends.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    routes: Arc<RouteTable>,
    limiter: Arc<FixedWindowLimiter>,
    pipeline: Pipeline,
}

impl GatewayService {
    /// Build every pipeline component from configuration.
    pub fn new(config: Arc<GatewayConfig>, http_client: Arc<dyn HttpClient>) -> Result<Self> {
        let routes = Arc::new(
            RouteTable::from_config(&config.routes, &config.api_prefix)
                .wrap_err("Failed to compile route table")?,
        );
        let limiter = Arc::new(
            FixedWindowLimiter::from_config(&config.rate_limit)
                .map_err(|e| eyre!("Failed to create rate limiter: {e}"))?,
        );
        let validator = Arc::new(TokenValidator::from_config(&config.auth));

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(LoggingStage),
            Box::new(RateLimitStage::new(limiter.clone())),
            Box::new(RoutingStage::new(routes.clone())),
            Box::new(AuthenticationStage::new(validator)),
        ];
        let dispatcher = Box::new(RouteDispatcher {
            proxy: ProxyForwarder::new(http_client, config.services.clone()),
        });

        tracing::info!(
            routes = routes.len(),
            environment = %config.environment,
            "Gateway pipeline assembled"
        );

        Ok(Self {
            config,
            routes,
            limiter,
            pipeline: Pipeline::new(stages, dispatcher),
        })
    }

    /// Run one request through the pipeline.
    pub async fn handle(&self, req: Request<Body>, client_addr: Option<SocketAddr>) -> Response {
        self.pipeline.run(req, client_addr).await
    }

    /// Start the rate limiter's idle-counter sweep.
    pub fn start_background_tasks(&self) {
        self.limiter.spawn_sweeper();
    }

    /// Stop background tasks.
    pub async fn shutdown(&self) {
        self.limiter.shutdown().await;
        tracing::info!("Gateway background tasks stopped");
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.routes
    }

    pub fn limiter(&self) -> &Arc<FixedWindowLimiter> {
        &self.limiter
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.pipeline.stage_names()
    }
}
