//! HTTP API surface.
//!
//! Thin axum handlers over the shared engine. Every request serializes on
//! the engine mutex; the handlers only parse parameters, time the call,
//! and map errors to status codes.

use crate::engine::Engine;
use crate::error::{Error, IndexError, SearchError};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

/// The engine behind the process-wide coarse mutex.
pub type SharedEngine = Arc<Mutex<Engine>>;

pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/search", get(search))
        .route("/api/suggest", get(suggest))
        .route("/api/reload", post(reload))
        .route("/api/add_document", post(add_document))
        .route("/api/ai_summary", get(ai_summary))
        .route("/api/ai_overview", get(ai_overview))
        .route("/api/stats", get(stats))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn error_for(e: &Error) -> Response {
    let status = match e {
        Error::Search(SearchError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
        Error::Search(SearchError::UnknownDocument(_)) => StatusCode::NOT_FOUND,
        Error::Index(IndexError::EmptyDocument(_)) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, &e.to_string())
}

async fn health(State(engine): State<SharedEngine>) -> Json<Value> {
    let engine = engine.lock().await;
    Json(json!({ "ok": true, "segments": engine.segment_count() }))
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    k: Option<i64>,
}

async fn search(
    State(engine): State<SharedEngine>,
    Query(params): Query<SearchParams>,
) -> Response {
    let total_start = Instant::now();
    let Some(q) = params.q else {
        return error_body(StatusCode::BAD_REQUEST, "missing q param");
    };
    let k = params.k.unwrap_or(10);

    let mut engine = engine.lock().await;
    let search_start = Instant::now();
    match engine.search(&q, k) {
        Ok(mut resp) => {
            let elapsed_ms = search_start.elapsed().as_secs_f64() * 1000.0;
            if resp.cached {
                resp.search_time_ms = Some(0.0);
                resp.cache_lookup_ms = Some(elapsed_ms);
            } else {
                resp.search_time_ms = Some(elapsed_ms);
            }
            resp.total_time_ms = Some(total_start.elapsed().as_secs_f64() * 1000.0);
            info!(
                query = %q,
                k,
                cached = resp.cached,
                found = resp.found,
                elapsed_ms,
                "search"
            );
            Json(resp).into_response()
        }
        Err(e) => error_for(&e),
    }
}

async fn suggest(
    State(engine): State<SharedEngine>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(q) = params.q else {
        return error_body(StatusCode::BAD_REQUEST, "missing q param");
    };
    let limit = params.k.unwrap_or(5);

    let mut engine = engine.lock().await;
    Json(engine.suggest(&q, limit)).into_response()
}

async fn reload(State(engine): State<SharedEngine>) -> Json<Value> {
    let mut engine = engine.lock().await;
    let reloaded = match engine.reload() {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "reload failed");
            false
        }
    };
    Json(json!({ "reloaded": reloaded, "segments": engine.segment_count() }))
}

#[derive(Deserialize)]
struct AddDocumentRequest {
    cord_uid: String,
    title: String,
    #[serde(default)]
    json_relpath: String,
    text: String,
}

async fn add_document(
    State(engine): State<SharedEngine>,
    Json(req): Json<AddDocumentRequest>,
) -> Response {
    if req.cord_uid.is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "cord_uid must not be empty");
    }

    let mut engine = engine.lock().await;
    match engine.add_document(&req.cord_uid, &req.title, &req.json_relpath, &req.text) {
        Ok(segment) => Json(json!({
            "added": true,
            "segment": segment,
            "segments": engine.segment_count(),
        }))
        .into_response(),
        Err(e) => error_for(&e),
    }
}

#[derive(Deserialize)]
struct SummaryParams {
    uid: Option<String>,
}

async fn ai_summary(
    State(engine): State<SharedEngine>,
    Query(params): Query<SummaryParams>,
) -> Response {
    let Some(uid) = params.uid else {
        return error_body(StatusCode::BAD_REQUEST, "missing uid param");
    };

    let mut engine = engine.lock().await;
    match engine.summary_lookup(&uid) {
        Ok(Some(value)) => Json(value).into_response(),
        Ok(None) => error_body(StatusCode::NOT_FOUND, "summary not cached"),
        Err(e) => error_for(&e),
    }
}

async fn ai_overview(
    State(engine): State<SharedEngine>,
    Query(params): Query<SearchParams>,
) -> Response {
    let Some(q) = params.q else {
        return error_body(StatusCode::BAD_REQUEST, "missing q param");
    };
    let k = params.k.unwrap_or(10);

    let mut engine = engine.lock().await;
    match engine.overview_lookup(&q, k) {
        Some(value) => Json(value).into_response(),
        None => error_body(StatusCode::NOT_FOUND, "overview not cached"),
    }
}

async fn stats(State(engine): State<SharedEngine>) -> Json<Value> {
    let engine = engine.lock().await;
    Json(serde_json::to_value(engine.stats()).unwrap_or_else(|_| json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SegmentWriter;
    use crate::segment;
    use crate::types::DocInfo;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn test_engine() -> (tempfile::TempDir, SharedEngine) {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut w = SegmentWriter::new();
        w.add_document(
            DocInfo {
                cord_uid: "uid0".to_string(),
                title: String::new(),
                json_relpath: String::new(),
                doc_len: 2,
            },
            &[("alpha".to_string(), 1), ("beta".to_string(), 1)],
        );
        w.write_segment(&tmp.path().join("segments").join("seg_000001"))
            .unwrap();
        segment::save_manifest(
            &tmp.path().join("manifest.bin"),
            &["seg_000001".to_string()],
        )
        .unwrap();

        let cache_dir = tmp.path().join("caches");
        std::fs::create_dir_all(&cache_dir).unwrap();
        let mut engine = Engine::with_cache_dir(tmp.path(), cache_dir);
        engine.reload().unwrap();
        (tmp, Arc::new(Mutex::new(engine)))
    }

    #[tokio::test]
    async fn test_health() {
        let (_tmp, engine) = test_engine();
        let app = router(engine);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["segments"], 1);
    }

    #[tokio::test]
    async fn test_search_missing_q_is_bad_request() {
        let (_tmp, engine) = test_engine();
        let app = router(engine);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/search")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("missing q"));
    }

    #[tokio::test]
    async fn test_search_returns_results_and_timings() {
        let (_tmp, engine) = test_engine();
        let app = router(engine);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/search?q=alpha&k=5")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["found"], 1);
        assert_eq!(body["cached"], false);
        assert!(body["search_time_ms"].is_number());
        assert!(body["total_time_ms"].is_number());
        assert_eq!(body["results"][0]["cord_uid"], "uid0");
    }

    #[tokio::test]
    async fn test_suggest() {
        let (_tmp, engine) = test_engine();
        let app = router(engine);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/suggest?q=al&k=3")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["suggestions"][0], "alpha");
    }

    #[tokio::test]
    async fn test_summary_unknown_uid_is_not_found() {
        let (_tmp, engine) = test_engine();
        let app = router(engine);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/ai_summary?uid=zzz")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
