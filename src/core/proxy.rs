//! Forwarding of routed requests to backend services.
use std::sync::Arc;

use axum::{body::Body, response::Response};
use http::{HeaderMap, Request, Uri, header};

use crate::{
    config::models::ServicesConfig,
    core::{auth::USER_ID_HEADER, router::ResolvedRoute},
    error::GatewayError,
    ports::http_client::{HttpClient, HttpClientError},
};

/// Connection-scoped headers that must not travel to the backend.
const HOP_BY_HOP: [header::HeaderName; 4] = [
    header::CONNECTION,
    header::TE,
    header::UPGRADE,
    header::PROXY_AUTHORIZATION,
];

pub struct ProxyForwarder {
    client: Arc<dyn HttpClient>,
    services: ServicesConfig,
}

impl ProxyForwarder {
    pub fn new(client: Arc<dyn HttpClient>, services: ServicesConfig) -> Self {
        Self { client, services }
    }

    /// Absolute backend URI: base URL, prefix-stripped path, original query.
    pub fn backend_uri(
        base_url: &str,
        upstream_path: &str,
        query: Option<&str>,
    ) -> Result<Uri, GatewayError> {
        let mut target = format!("{}{}", base_url.trim_end_matches('/'), upstream_path);
        if let Some(query) = query {
            target.push('?');
            target.push_str(query);
        }

        let uri: Uri = target.parse().map_err(|e| {
            tracing::error!(uri = %target, error = %e, "Failed to build backend URI");
            GatewayError::ProxyConstructionFailure
        })?;
        if uri.scheme().is_none() || uri.authority().is_none() {
            tracing::error!(uri = %target, "Backend URI is not absolute");
            return Err(GatewayError::ProxyConstructionFailure);
        }
        Ok(uri)
    }

    /// Drop hop-by-hop headers, including every header the client named in
    /// `Connection`. The verified `X-User-ID` always survives.
    fn strip_hop_by_hop(headers: &mut HeaderMap) {
        let listed: Vec<header::HeaderName> = headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .filter_map(|name| header::HeaderName::from_bytes(name.trim().as_bytes()).ok())
            .filter(|name| *name != USER_ID_HEADER)
            .collect();
        for name in &listed {
            headers.remove(name);
        }
        for name in &HOP_BY_HOP {
            headers.remove(name);
        }
        headers.remove("keep-alive");
        headers.remove("proxy-connection");
    }

    /// Send the request to the route's backend and relay whatever comes back.
    ///
    /// Method, headers and the streaming body are passed through unchanged.
    /// Backend error statuses are returned as-is; only transport failures
    /// become gateway errors.
    pub async fn forward(
        &self,
        req: Request<Body>,
        route: &ResolvedRoute,
    ) -> Result<Response<Body>, GatewayError> {
        let base_url = self.services.url_for(route.target).ok_or_else(|| {
            tracing::error!(backend = %route.target, "No backend URL for route target");
            GatewayError::ProxyConstructionFailure
        })?;
        let uri = Self::backend_uri(base_url, &route.upstream_path, req.uri().query())?;

        let (mut parts, body) = req.into_parts();
        parts.uri = uri;
        Self::strip_hop_by_hop(&mut parts.headers);

        tracing::debug!(backend = %route.target, uri = %parts.uri, "Forwarding request");

        match self.client.send_request(Request::from_parts(parts, body)).await {
            Ok(response) => Ok(response),
            Err(HttpClientError::InvalidRequest(reason)) => {
                tracing::error!(backend = %route.target, %reason, "Backend request rejected by client");
                Err(GatewayError::ProxyConstructionFailure)
            }
            Err(e) => {
                tracing::warn!(backend = %route.target, error = %e, "Backend unavailable");
                Err(GatewayError::BackendUnavailable)
            }
        }
    }
}
