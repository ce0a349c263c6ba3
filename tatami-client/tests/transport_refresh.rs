//! Token-refresh behavior against a real HTTP server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use tatami_client::{ClientConfig, RequestError, Transport};
use tatami_model::AuthToken;

#[derive(Default)]
struct Counters {
    protected_hits: AtomicUsize,
    refresh_hits: AtomicUsize,
}

fn bearer(headers: &HeaderMap) -> &str {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

async fn protected(
    State(counters): State<Arc<Counters>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    counters.protected_hits.fetch_add(1, Ordering::SeqCst);
    if bearer(&headers) == "Bearer fresh-access" {
        (StatusCode::OK, Json(json!({ "ok": true })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "expired" })))
    }
}

async fn always_unauthorized(
    State(counters): State<Arc<Counters>>,
) -> (StatusCode, Json<Value>) {
    counters.protected_hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": "revoked" })))
}

async fn refresh(
    State(counters): State<Arc<Counters>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    counters.refresh_hits.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["refreshToken"], "refresh-1");
    (
        StatusCode::OK,
        Json(json!({
            "accessToken": "fresh-access",
            "refreshToken": "refresh-2",
        })),
    )
}

async fn start_server() -> (std::net::SocketAddr, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let app = Router::new()
        .route("/api/v1/library", get(protected))
        .route("/api/v1/revoked", get(always_unauthorized))
        .route("/api/v1/auth/refresh", post(refresh))
        .with_state(counters.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, counters)
}

fn stale_token() -> AuthToken {
    AuthToken {
        access_token: "stale-access".into(),
        refresh_token: "refresh-1".into(),
    }
}

#[tokio::test]
async fn a_401_triggers_exactly_one_refresh_and_one_retry() {
    let (addr, counters) = start_server().await;
    let transport = Transport::new(Arc::new(ClientConfig::new(format!(
        "http://{addr}"
    ))))
    .unwrap();
    transport.set_token(Some(stale_token())).await;

    let body: Value = transport.get_json("library").await.unwrap();
    assert_eq!(body["ok"], true);

    // One logical request, observable as exactly two protected calls plus
    // one refresh call.
    assert_eq!(counters.refresh_hits.load(Ordering::SeqCst), 1);
    assert_eq!(counters.protected_hits.load(Ordering::SeqCst), 2);
    assert_eq!(
        transport.token().await.unwrap().access_token,
        "fresh-access"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_401s_share_one_refresh() {
    let (addr, counters) = start_server().await;
    let transport = Transport::new(Arc::new(ClientConfig::new(format!(
        "http://{addr}"
    ))))
    .unwrap();
    transport.set_token(Some(stale_token())).await;

    let calls = (0..4).map(|_| {
        let transport = transport.clone();
        tokio::spawn(async move {
            transport.get_json::<Value>("library").await
        })
    });
    for call in calls {
        let body = call.await.unwrap().unwrap();
        assert_eq!(body["ok"], true);
    }

    // Every caller saw its 401, but the token was rotated exactly once.
    assert_eq!(counters.refresh_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_401_after_refresh_clears_the_token() {
    let (addr, counters) = start_server().await;
    let transport = Transport::new(Arc::new(ClientConfig::new(format!(
        "http://{addr}"
    ))))
    .unwrap();
    transport.set_token(Some(stale_token())).await;

    let err = transport.get_json::<Value>("revoked").await.unwrap_err();
    assert!(matches!(err, RequestError::Unauthorized));
    assert_eq!(counters.refresh_hits.load(Ordering::SeqCst), 1);
    assert!(transport.token().await.is_none());
}

#[tokio::test]
async fn refresh_without_a_stored_token_is_unauthorized() {
    let (addr, counters) = start_server().await;
    let transport = Transport::new(Arc::new(ClientConfig::new(format!(
        "http://{addr}"
    ))))
    .unwrap();

    // No token stored: the 401 cannot be refreshed away.
    let err = transport.get_json::<Value>("library").await.unwrap_err();
    assert!(matches!(err, RequestError::Unauthorized));
    assert_eq!(counters.refresh_hits.load(Ordering::SeqCst), 0);
}
