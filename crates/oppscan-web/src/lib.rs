//! JSON data API the dashboard reads: latest digest, parsed view, done toggles.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use oppscan_scan::{load_digest_view, read_latest_digest, ScanConfig};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "oppscan-web";

pub const NO_SCAN_HINT: &str = "No opportunity scan found. Run: oppscan";

#[derive(Clone)]
pub struct AppState {
    pub config: ScanConfig,
}

impl AppState {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }
}

#[derive(Debug, Deserialize)]
pub struct DoneRequest {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoneResponse {
    pub success: bool,
    pub done: bool,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/opportunities", get(opportunities_handler))
        .route("/api/opportunities-parsed", get(opportunities_parsed_handler))
        .route("/api/opportunity-done", post(opportunity_done_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: ScanConfig) -> anyhow::Result<()> {
    let port = config.web_port;
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!(port, "dashboard api listening");
    axum::serve(listener, app(AppState::new(config))).await?;
    Ok(())
}

async fn opportunities_handler(State(state): State<Arc<AppState>>) -> Response {
    match read_latest_digest(&state.config).await {
        Ok(Some(raw)) => Json(json!({ "raw": raw })).into_response(),
        Ok(None) => Json(json!({ "raw": NO_SCAN_HINT })).into_response(),
        Err(err) => server_error(err),
    }
}

async fn opportunities_parsed_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_digest_view(&state.config).await {
        Ok(view) => Json(view).into_response(),
        Err(err) => server_error(err),
    }
}

async fn opportunity_done_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DoneRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let id = request.id.trim();
    if id.is_empty() {
        return bad_request("missing id".to_string());
    }

    match state.config.completion_store().toggle(id).await {
        Ok(done) => {
            info!(id, done, "completion toggled");
            Json(DoneResponse {
                success: true,
                done,
            })
            .into_response()
        }
        Err(err) => server_error(err),
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    warn!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("{err:#}") })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    const DIGEST: &str = "# Opportunity Digest — 2026-10-19 08:00

---
## Reddit (1 posts)

### 1. Is eToro safe?
**r/etoro** | 1 comments **← FEW REPLIES** | score 4 | 2026-10-18 09:00
Link: https://reddit.com/r/etoro/comments/a1/

---
## Hacker News (0 mentions)

_None this scan._
";

    fn state_with_digest(dir: &std::path::Path) -> AppState {
        let config = ScanConfig::for_root(dir);
        std::fs::create_dir_all(&config.reports_dir).unwrap();
        std::fs::write(config.latest_path(), DIGEST).unwrap();
        AppState::new(config)
    }

    async fn body_json(resp: Response) -> Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_done(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/opportunity-done")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn raw_endpoint_returns_latest_digest() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with_digest(dir.path()));
        let resp = app
            .oneshot(Request::builder().uri("/api/opportunities").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["raw"], DIGEST);
    }

    #[tokio::test]
    async fn raw_endpoint_hints_before_first_scan() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(AppState::new(ScanConfig::for_root(dir.path())));
        let resp = app
            .oneshot(Request::builder().uri("/api/opportunities").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["raw"], NO_SCAN_HINT);
    }

    #[tokio::test]
    async fn toggling_an_item_marks_it_done_in_the_parsed_view() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with_digest(dir.path()));

        let resp = app
            .clone()
            .oneshot(post_done(r#"{"id": "redditisetorosafe"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"success": true, "done": true}));

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/api/opportunities-parsed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let view = body_json(resp).await;
        assert_eq!(view["date"], "2026-10-19 08:00");
        assert_eq!(view["total"], 1);
        assert_eq!(view["total_done"], 1);
        assert_eq!(view["sections"][0]["type"], "opportunities");
        assert_eq!(view["sections"][0]["items"][0]["done"], true);
        assert_eq!(view["sections"][1]["type"], "empty");

        let resp = app
            .oneshot(post_done(r#"{"id": "redditisetorosafe"}"#))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["done"], false);
    }

    #[tokio::test]
    async fn malformed_toggle_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(state_with_digest(dir.path()));

        let resp = app.clone().oneshot(post_done("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());

        let resp = app.oneshot(post_done(r#"{"id": "  "}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "missing id");
    }
}
