//! Client-facing error taxonomy of the request pipeline.
//!
//! Every variant maps to one HTTP status and renders as a single-field JSON
//! object. Internal details (upstream error text, decode failures) are logged
//! where they happen and never reach the response body.
use axum::{
    Json,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::core::{auth::AuthError, router::RouteError};

/// Errors that short-circuit a request inside the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    /// Credential missing, malformed or rejected by the token validator.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The client exhausted its request budget for the current window.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// No route for the path, or the path exists but not for this method.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The backend could not be reached (refused, DNS, timeout).
    #[error("Backend service unavailable")]
    BackendUnavailable,

    /// The outbound request could not be built.
    #[error("Failed to create proxy request")]
    ProxyConstructionFailure,
}

impl GatewayError {
    /// HTTP status returned to the client for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Route(RouteError::NotFound) => StatusCode::NOT_FOUND,
            GatewayError::Route(RouteError::MethodNotAllowed) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ProxyConstructionFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every gateway-originated rejection.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
