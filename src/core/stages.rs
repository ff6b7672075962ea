//! The concrete stages of the gateway pipeline, in the order they run.
use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Body, response::Response};
use http::{HeaderValue, Request};

use crate::{
    core::{
        auth::{AuthError, TokenValidator, USER_ID_HEADER},
        pipeline::{Flow, RequestContext, Stage},
        rate_limiter::FixedWindowLimiter,
        router::RouteTable,
    },
    error::GatewayError,
};

pub struct LoggingStage;

#[async_trait]
impl Stage for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn apply(
        &self,
        req: &mut Request<Body>,
        _ctx: &mut RequestContext,
    ) -> Result<Flow, GatewayError> {
        tracing::info!("Started {} {} {:?}", req.method(), req.uri(), req.version());
        Ok(Flow::Continue)
    }

    fn on_response(&self, response: &mut Response<Body>, ctx: &RequestContext) {
        let elapsed = ctx.started_at.elapsed();
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = elapsed.as_secs_f64() * 1000.0,
            "Completed in {:?}",
            elapsed
        );
    }
}

pub struct RateLimitStage {
    limiter: Arc<FixedWindowLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<FixedWindowLimiter>) -> Self {
        Self { limiter }
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn apply(
        &self,
        _req: &mut Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Flow, GatewayError> {
        let key = ctx.client_key();
        self.limiter
            .check(&key)
            .await
            .map_err(|_| GatewayError::RateLimitExceeded)?;
        Ok(Flow::Continue)
    }
}

pub struct RoutingStage {
    routes: Arc<RouteTable>,
}

impl RoutingStage {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl Stage for RoutingStage {
    fn name(&self) -> &'static str {
        "routing"
    }

    async fn apply(
        &self,
        req: &mut Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Flow, GatewayError> {
        let route = self.routes.resolve(req.method(), req.uri().path())?;
        tracing::Span::current().record("http.route", route.template.as_str());
        ctx.route = Some(route);
        Ok(Flow::Continue)
    }
}

/// Validates bearer tokens on protected routes and forwards the subject as
/// `X-User-ID`. On public routes a client-supplied `X-User-ID` is dropped.
pub struct AuthenticationStage {
    validator: Arc<TokenValidator>,
}

impl AuthenticationStage {
    pub fn new(validator: Arc<TokenValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Stage for AuthenticationStage {
    fn name(&self) -> &'static str {
        "authentication"
    }

    async fn apply(
        &self,
        req: &mut Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Flow, GatewayError> {
        // Unrouted requests never reach here; treat them as protected anyway.
        let protected = ctx.route.as_ref().is_none_or(|route| route.is_protected());
        req.headers_mut().remove(&USER_ID_HEADER);
        if !protected {
            return Ok(Flow::Continue);
        }

        let identity = self.validator.authenticate(req.headers())?;
        let value = HeaderValue::from_str(&identity.user_id).map_err(|_| AuthError::InvalidClaims)?;

        req.headers_mut().insert(USER_ID_HEADER.clone(), value);
        req.extensions_mut().insert(identity.clone());
        tracing::Span::current().record("user.id", identity.user_id.as_str());
        ctx.identity = Some(identity);
        Ok(Flow::Continue)
    }
}
