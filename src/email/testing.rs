//! Local stand-in for the email provider, for tests

use crate::config::Config;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Request captured by the fake provider
#[derive(Debug, Clone)]
pub(crate) struct Captured {
    pub body: Value,
    pub idempotency_key: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub(crate) struct FakeProvider {
    /// Statuses to answer with, in order; the last one repeats
    script: Vec<u16>,
    pub requests: Mutex<Vec<Captured>>,
}

async fn handle(
    State(provider): State<Arc<FakeProvider>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut requests = provider.requests.lock().unwrap();
    requests.push(Captured {
        body,
        idempotency_key: header("idempotency-key"),
        authorization: header("authorization"),
    });

    let index = (requests.len() - 1).min(provider.script.len() - 1);
    let status = StatusCode::from_u16(provider.script[index]).unwrap();
    (status, Json(serde_json::json!({ "id": format!("msg-{}", requests.len()) })))
}

/// Serve `POST /emails` on an ephemeral port; returns the base URL
pub(crate) async fn spawn_provider(script: Vec<u16>) -> (String, Arc<FakeProvider>) {
    let provider = Arc::new(FakeProvider {
        script,
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/emails", post(handle))
        .with_state(Arc::clone(&provider));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), provider)
}

/// Config pointing at a fake provider, with near-zero backoff
pub(crate) fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.email.api_key = Some("re_test".to_string());
    config.email.api_base_url = base_url.to_string();
    config.email.backoff_base_ms = 1;
    config.site.base_url = "https://example.org".to_string();
    config
}
