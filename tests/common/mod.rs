#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use folio_gateway::{
    GatewayService, HttpClientAdapter, HttpHandler, config::GatewayConfig,
    ports::http_client::HttpClient,
};
use http::{HeaderMap, Method, StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

pub const SECRET: &str = "integration-secret";

/// One request as seen by a stub backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path and query exactly as received.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> Response + Send + Sync>;

#[derive(Clone)]
struct StubState {
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Responder,
}

/// A backend service on an ephemeral port that records every request.
pub struct StubBackend {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubBackend {
    pub async fn spawn<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> Response + Send + Sync + 'static,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            seen: seen.clone(),
            responder: Arc::new(responder),
        };
        let app = Router::new().fallback(record).with_state(state);
        let addr = spawn_router(app).await;

        Self { addr, seen }
    }

    /// Backend answering every request with a JSON summary of what it got.
    pub async fn echo() -> Self {
        Self::spawn(|req| {
            axum::Json(json!({
                "method": req.method.as_str(),
                "target": req.target,
                "user_id": req.header("x-user-id"),
                "body_len": req.body.len(),
            }))
            .into_response()
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn record(State(state): State<StubState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let recorded = RecordedRequest {
        method: parts.method,
        target: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers: parts.headers,
        body,
    };
    let response = (state.responder)(&recorded);
    state.seen.lock().unwrap().push(recorded);
    response
}

/// Serve `app` on an ephemeral loopback port.
pub async fn spawn_router(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A backend that answers the first connection with `reply` and then holds
/// the socket open without writing anything more.
pub async fn spawn_stalling_backend(reply: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = socket.read(&mut buf).await.unwrap();
        socket.write_all(reply).await.unwrap();
        std::future::pending::<()>().await;
    });
    addr
}

/// Write `request` verbatim on a fresh connection and read until the reply
/// contains `until`, the peer closes, or five seconds pass. The connection is
/// kept open after writing, so a short body stays short.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8], until: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut received = Vec::new();
    let read_loop = async {
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    received.extend_from_slice(&buf[..n]);
                    if String::from_utf8_lossy(&received).contains(until) {
                        break;
                    }
                }
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(5), read_loop).await;
    String::from_utf8_lossy(&received).into_owned()
}

/// A gateway served on an ephemeral port with connect info enabled.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub service: Arc<GatewayService>,
}

impl TestGateway {
    pub async fn spawn(config: GatewayConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = Arc::new(config);
        let client: Arc<dyn HttpClient> =
            Arc::new(HttpClientAdapter::from_config(&config.upstream).unwrap());
        let service = Arc::new(GatewayService::new(config, client).unwrap());
        let app = HttpHandler::new(service.clone()).unwrap().into_router();

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self { addr, service }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Base configuration with the integration secret and every backend pointed
/// at `backend_url`.
pub fn config_for(backend_url: &str) -> folio_gateway::config::GatewayConfigBuilder {
    use folio_gateway::config::ServiceTarget;

    GatewayConfig::builder()
        .listen_addr("127.0.0.1:0")
        .jwt_secret(SECRET)
        .service(ServiceTarget::Identity, backend_url)
        .service(ServiceTarget::Portfolio, backend_url)
        .service(ServiceTarget::Analysis, backend_url)
        .upstream_timeouts(5, 2)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// HS256 token for `user_id` expiring `ttl_secs` from now (negative for
/// already expired).
pub fn mint_token(user_id: &str, ttl_secs: i64) -> String {
    let iat = now();
    encode(
        &Header::default(),
        &json!({ "user_id": user_id, "iat": iat, "exp": iat + ttl_secs }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Change one character in the middle of the signature segment.
pub fn tamper_signature(token: &str) -> String {
    let (head, signature) = token.rsplit_once('.').unwrap();
    let mut chars: Vec<char> = signature.chars().collect();
    let mid = chars.len() / 2;
    chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
    format!("{head}.{}", chars.into_iter().collect::<String>())
}

pub fn status_response(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}
