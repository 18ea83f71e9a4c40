//! Outreach REST API
//!
//! HTTP API layer, built with Axum.
//!
//! # Endpoints
//!
//! ## Events
//! - `POST /api/v1/events` - Record a behavior event
//!
//! ## Segments
//! - `POST /api/v1/segments` - Classify a batch of patients
//!
//! ## Calendar
//! - `POST /api/v1/calendar/invite` - Render a booking invite (`text/calendar`)
//!
//! ## Site
//! - `GET /api/v1/site` - Public site flags
//! - `GET /api/images/therapist-profiles/*path` - Same-domain profile image proxy
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use outreach::api::{serve, AppState};
//! use outreach::{Config, SqliteEventStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let store = Arc::new(SqliteEventStore::open(config.events.database_path.as_ref())?);
//!     let addr = config.api.addr();
//!
//!     serve(AppState::new(store, config), &addr).await?;
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Request bodies are small JSON documents
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/events", post(routes::events::record_event))
        .route("/segments", post(routes::segments::classify_segments))
        .route("/calendar/invite", post(routes::calendar::render_invite))
        .route("/site", get(routes::site::site_flags))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let image_route = format!(
        "/{}/*path",
        state.config.site.image_proxy_path.trim_matches('/')
    );

    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .route(&image_route, get(routes::images::proxy_image))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the API server on `addr`
pub async fn serve(state: AppState, addr: &str) -> Result<(), ApiError> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Outreach API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Outreach API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::SqliteEventStore;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    fn create_test_app_with(config: Config) -> Router {
        let store = Arc::new(SqliteEventStore::open_in_memory().unwrap());
        build_router(AppState::new(store, config))
    }

    fn create_test_app() -> Router {
        create_test_app_with(Config::default())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let response = create_test_app().oneshot(get_request("/health/live")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready() {
        let response = create_test_app().oneshot(get_request("/health/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full_without_email_is_degraded() {
        let response = create_test_app().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["events"], "ok");
        assert_eq!(body["email"], "disabled");
    }

    #[tokio::test]
    async fn test_record_event() {
        let response = create_test_app()
            .oneshot(post_json(
                "/api/v1/events",
                json!({"type": "match_page_view", "properties": {"secure_uuid": "uuid-A"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["id"], 1);
    }

    #[tokio::test]
    async fn test_record_event_empty_type() {
        let response = create_test_app()
            .oneshot(post_json("/api/v1/events", json!({"type": "  "})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_record_event_invalid_json() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/events")
                    .header("Content-Type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_segments_round_trip() {
        let app = create_test_app();

        let now = chrono::Utc::now().timestamp_millis();
        for (event_type, properties, offset) in [
            ("match_page_view", json!({"secure_uuid": "uuid-A"}), 3000),
            (
                "contact_modal_opened",
                json!({"secure_uuid": "uuid-A", "therapist_id": "t1"}),
                2000,
            ),
            ("match_page_view", json!({"secure_uuid": "uuid-B"}), 1000),
        ] {
            let response = app
                .clone()
                .oneshot(post_json(
                    "/api/v1/events",
                    json!({"type": event_type, "properties": properties, "created_at": now - offset}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .oneshot(post_json(
                "/api/v1/segments",
                json!({
                    "candidates": {"uuid-A": "p1", "uuid-B": "p2", "uuid-C": "p3"},
                    "days": 7
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["segments"]["p1"],
            json!({"segment": "almost_booked", "therapist_id": "t1"})
        );
        assert_eq!(
            body["segments"]["p2"],
            json!({"segment": "visited_no_action", "visitCount": 1})
        );
        assert_eq!(body["segments"]["p3"], json!({"segment": "never_visited"}));
    }

    #[tokio::test]
    async fn test_segments_empty_candidates() {
        let response = create_test_app()
            .oneshot(post_json("/api/v1/segments", json!({"candidates": {}})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"segments": {}}));
    }

    #[tokio::test]
    async fn test_calendar_invite() {
        let response = create_test_app()
            .oneshot(post_json(
                "/api/v1/calendar/invite",
                json!({
                    "uid": "booking-1@example.org",
                    "summary": "First session",
                    "start": "2026-11-03T09:30:00Z",
                    "end": "2026-11-03T10:20:00Z",
                    "stamp": "2026-10-16T12:00:00Z"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/calendar"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let ics = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(ics.contains("DTSTART:20261103T093000Z\r\n"));
        assert!(ics.contains("SUMMARY:First session\r\n"));
    }

    #[tokio::test]
    async fn test_calendar_invite_end_before_start() {
        let response = create_test_app()
            .oneshot(post_json(
                "/api/v1/calendar/invite",
                json!({
                    "uid": "booking-1@example.org",
                    "summary": "First session",
                    "start": "2026-11-03T10:20:00Z",
                    "end": "2026-11-03T09:30:00Z"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_site_flags() {
        let mut config = Config::default();
        config.site.base_url = "https://example.org/".to_string();
        config.site.cookie_consent = true;

        let response = create_test_app_with(config)
            .oneshot(get_request("/api/v1/site"))
            .await
            .unwrap();

        assert_eq!(
            body_json(response).await,
            json!({"base_url": "https://example.org", "cookie_consent": true})
        );
    }

    #[tokio::test]
    async fn test_image_proxy_unconfigured() {
        let response = create_test_app()
            .oneshot(get_request("/api/images/therapist-profiles/t1/photo.jpg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_image_proxy_rejects_traversal() {
        let mut config = Config::default();
        config.storage.public_url = Some("http://127.0.0.1:9".to_string());

        let response = create_test_app_with(config)
            .oneshot(get_request("/api/images/therapist-profiles/t1/../../secret"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_image_proxy_fetches_object() {
        let storage = Router::new().route(
            "/therapist-profiles/t1/photo.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], vec![0x89u8, b'P', b'N', b'G']) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, storage).await.unwrap();
        });

        let mut config = Config::default();
        config.storage.public_url = Some(format!("http://{}/", addr));
        let app = create_test_app_with(config);

        let response = app
            .clone()
            .oneshot(get_request("/api/images/therapist-profiles/t1/photo.png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);

        let response = app
            .oneshot(get_request("/api/images/therapist-profiles/t1/missing.png"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
