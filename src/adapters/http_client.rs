use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;
use tower_http::timeout::TimeoutBody;
use tracing::Instrument;

use crate::{
    config::models::UpstreamConfig,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Pools connections to every backend behind one client
/// * Rewrites `Host` to the backend authority
/// * Forces request version to HTTP/1.1 toward the backends
/// * Bounds connect and response-header latency with gateway-wide timeouts
/// * Fails a relayed body that stalls for longer than the request timeout
///
/// Bodies are streamed in both directions; nothing is buffered here.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
    request_timeout: Duration,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_connect_timeout(Some(connect_timeout));

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::info!(
            request_timeout = ?request_timeout,
            connect_timeout = ?connect_timeout,
            "Created backend HTTP client"
        );
        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    /// Replace `Host` with the authority of the outgoing URI.
    fn set_backend_host(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let Some(host) = req.uri().host() else {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        };
        let value = match req.uri().port_u16() {
            Some(port) => HeaderValue::from_str(&format!("{host}:{port}")),
            None => HeaderValue::from_str(host),
        }
        .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        req.headers_mut().insert(header::HOST, value);
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        let backend_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );

        let span = tracing::info_span!(
            "backend_request",
            backend.url = %backend_identifier,
            http.method = %req.method(),
            http.path = %req.uri().path(),
            http.status_code = tracing::field::Empty,
        );

        Self::set_backend_host(&mut req)?;

        let (mut parts, axum_body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing_request = Request::from_parts(parts, axum_body);

        let client = self.client.clone();
        let request_timeout = self.request_timeout;

        async move {
            tracing::debug!("Sending request: {} {}", method, uri);

            match timeout(request_timeout, client.request(outgoing_request)).await {
                Ok(Ok(response)) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());

                    let (mut parts, hyper_body) = response.into_parts();
                    // Framing is re-established by the downstream server.
                    parts.headers.remove(header::TRANSFER_ENCODING);

                    // The deadline restarts on every frame.
                    let body = TimeoutBody::new(request_timeout, hyper_body);
                    Ok(Response::from_parts(parts, AxumBody::new(body)))
                }
                Ok(Err(e)) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    tracing::error!(
                        "Error making request to backend {} ({} {}): {}",
                        backend_identifier,
                        method,
                        uri,
                        e
                    );
                    Err(HttpClientError::ConnectionError(format!(
                        "Request to {method} {uri} failed: {e}"
                    )))
                }
                Err(_) => {
                    tracing::Span::current().record("http.status_code", 504u16);
                    tracing::error!(
                        "Backend {} did not respond within {:?}",
                        backend_identifier,
                        request_timeout
                    );
                    Err(HttpClientError::Timeout(request_timeout.as_secs()))
                }
            }
        }
        .instrument(span)
        .await
    }
}
