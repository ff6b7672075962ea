//! The ordered request pipeline.
//!
//! A [`Pipeline`] owns an explicit list of [`Stage`]s and a terminal
//! [`Dispatcher`]. The driver calls each stage's `apply` in order; a stage
//! either lets the request continue, answers it directly, or rejects it with a
//! [`GatewayError`]. Once a response exists, every stage that was entered sees
//! it again through `on_response`, innermost first, so the logging stage
//! records rejections as well as proxied responses.
use std::{net::SocketAddr, time::Instant};

use async_trait::async_trait;
use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::Request;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    core::{auth::Identity, router::ResolvedRoute},
    error::GatewayError,
};

/// What the driver does after a stage ran.
pub enum Flow {
    /// Hand the request to the next stage.
    Continue,
    /// Stop here and send this response.
    Respond(Response<Body>),
}

/// Per-request state threaded through the stages.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub client_addr: Option<SocketAddr>,
    pub route: Option<ResolvedRoute>,
    pub identity: Option<Identity>,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(client_addr: Option<SocketAddr>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            client_addr,
            route: None,
            identity: None,
            started_at: Instant::now(),
        }
    }

    /// Rate limiting key: the peer IP without the ephemeral port.
    pub fn client_key(&self) -> String {
        self.client_addr
            .map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(
        &self,
        req: &mut Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Flow, GatewayError>;

    /// Observe or decorate the outgoing response.
    fn on_response(&self, _response: &mut Response<Body>, _ctx: &RequestContext) {}
}

/// Terminal step run after every stage let the request through.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        req: Request<Body>,
        ctx: &RequestContext,
    ) -> Result<Response<Body>, GatewayError>;
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    dispatcher: Box<dyn Dispatcher>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>, dispatcher: Box<dyn Dispatcher>) -> Self {
        Self { stages, dispatcher }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Drive one request to a response. Never fails: errors become responses.
    pub async fn run(&self, req: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let ctx = RequestContext::new(client_addr);
        let span = tracing::info_span!(
            "request",
            request.id = %ctx.request_id,
            http.method = %req.method(),
            http.path = %req.uri().path(),
            client.addr = %ctx.client_key(),
            http.route = tracing::field::Empty,
            user.id = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
        );

        self.drive(req, ctx).instrument(span).await
    }

    async fn drive(&self, mut req: Request<Body>, mut ctx: RequestContext) -> Response<Body> {
        let mut entered = 0;
        let mut early = None;

        for stage in &self.stages {
            entered += 1;
            match stage.apply(&mut req, &mut ctx).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Respond(response)) => {
                    early = Some(response);
                    break;
                }
                Err(e) => {
                    tracing::warn!(stage = stage.name(), error = %e, "Request rejected");
                    early = Some(e.into_response());
                    break;
                }
            }
        }

        let mut response = match early {
            Some(response) => response,
            None => match self.dispatcher.dispatch(req, &ctx).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(stage = "dispatch", error = %e, "Request failed");
                    e.into_response()
                }
            },
        };

        for stage in self.stages[..entered].iter().rev() {
            stage.on_response(&mut response, &ctx);
        }

        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
}
