mod common;

use std::time::{Duration, Instant};

use axum::{Router, extract::Request};
use common::{
    TestGateway, client, config_for, mint_token, raw_exchange, spawn_router,
    spawn_stalling_backend,
};
use http::StatusCode;

#[tokio::test]
async fn test_stalled_backend_body_is_cut_off() {
    let backend_addr =
        spawn_stalling_backend(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n0123456789").await;
    let config = config_for(&format!("http://{backend_addr}"))
        .upstream_timeouts(1, 1)
        .build()
        .unwrap();
    let gateway = TestGateway::spawn(config).await;

    let response = client()
        .get(gateway.url("/api/stocks"))
        .bearer_auth(mint_token("u-1", 600))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The body fails instead of hanging on the silent backend.
    let body = tokio::time::timeout(Duration::from_secs(5), response.bytes()).await;
    assert!(matches!(body, Ok(Err(_))));
}

#[tokio::test]
async fn test_slow_response_hits_write_timeout() {
    let backend = Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        "too late"
    });
    let backend_addr = spawn_router(backend).await;
    let config = config_for(&format!("http://{backend_addr}"))
        .server_timeouts(30, 1)
        .upstream_timeouts(10, 2)
        .build()
        .unwrap();
    let gateway = TestGateway::spawn(config).await;

    let started = Instant::now();
    let response = client()
        .get(gateway.url("/api/stocks"))
        .bearer_auth(mint_token("u-1", 600))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(started.elapsed() < Duration::from_millis(2500));
}

#[tokio::test]
async fn test_stalled_request_body_is_cut_off() {
    let backend = Router::new().fallback(|req: Request| async move {
        match axum::body::to_bytes(req.into_body(), usize::MAX).await {
            Ok(body) => format!("read {} bytes", body.len()),
            Err(_) => "body aborted".to_string(),
        }
    });
    let backend_addr = spawn_router(backend).await;
    let config = config_for(&format!("http://{backend_addr}"))
        .server_timeouts(1, 30)
        .build()
        .unwrap();
    let gateway = TestGateway::spawn(config).await;

    let request = format!(
        "POST /api/portfolios HTTP/1.1\r\n\
         host: {}\r\n\
         authorization: Bearer {}\r\n\
         content-length: 1000\r\n\
         \r\n\
         partial",
        gateway.addr,
        mint_token("u-1", 600)
    );
    let started = Instant::now();
    let reply = raw_exchange(gateway.addr, request.as_bytes(), "\r\n\r\n").await;

    assert!(reply.starts_with("HTTP/1.1 503"), "reply: {reply}");
    assert!(started.elapsed() < Duration::from_secs(5));
}
