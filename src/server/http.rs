//! axum routes over a [`CaptionService`].
//!
//! | Route | Kind |
//! |---|---|
//! | `GET /api?id=..&caption=..[&search=..]` | image |
//! | `GET /api/{encoded}` | image, base64url-encoded query |
//! | `GET /gif?..` / `GET /gif/{encoded}` | gif |
//! | `GET /search?query=..&caption=..&kind=image\|gif[&pos=..]` | search hit |
//! | `GET /health` | liveness |
//!
//! Search responses name the hit in `X-Subject-Id` and, when the provider
//! has more results, the cursor for `pos` in `X-Search-Next`.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::{debug, error};

use crate::KittenError;
use crate::service::CaptionService;
use crate::types::{CaptionRequest, MediaKind, RenderedArtifact};

const SUBJECT_ID: HeaderName = HeaderName::from_static("x-subject-id");
const SEARCH_NEXT: HeaderName = HeaderName::from_static("x-search-next");

/// Build the daemon's router.
pub fn router(service: Arc<CaptionService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api", get(image_by_query))
        .route("/api/{encoded}", get(image_by_path))
        .route("/gif", get(gif_by_query))
        .route("/gif/{encoded}", get(gif_by_path))
        .route("/search", get(search))
        .with_state(service)
}

async fn health() -> &'static str {
    "ok"
}

async fn image_by_query(
    State(service): State<Arc<CaptionService>>,
    RawQuery(query): RawQuery,
) -> Response {
    render(&service, MediaKind::Image, "", query).await
}

async fn image_by_path(
    State(service): State<Arc<CaptionService>>,
    Path(encoded): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(&service, MediaKind::Image, &encoded, query).await
}

async fn gif_by_query(
    State(service): State<Arc<CaptionService>>,
    RawQuery(query): RawQuery,
) -> Response {
    render(&service, MediaKind::Gif, "", query).await
}

async fn gif_by_path(
    State(service): State<Arc<CaptionService>>,
    Path(encoded): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(&service, MediaKind::Gif, &encoded, query).await
}

async fn render(
    service: &CaptionService,
    kind: MediaKind,
    path: &str,
    query: Option<String>,
) -> Response {
    let request = match CaptionRequest::from_path(path, query.as_deref().unwrap_or_default(), kind)
    {
        Ok(request) => request,
        Err(e) => return error_response(e),
    };

    match service.render(&request).await {
        Ok(artifact) => artifact_response(artifact, &service.cache_control()),
        Err(e) => error_response(e),
    }
}

async fn search(
    State(service): State<Arc<CaptionService>>,
    RawQuery(query): RawQuery,
) -> Response {
    let mut kind = String::new();
    let mut text = String::new();
    let mut caption = String::new();
    let mut pos = None;
    for (name, value) in url::form_urlencoded::parse(query.as_deref().unwrap_or_default().as_bytes())
    {
        match name.as_ref() {
            "kind" => kind = value.into_owned(),
            "query" => text = value.into_owned(),
            "caption" => caption = value.into_owned(),
            "pos" => pos = Some(value.into_owned()),
            _ => {}
        }
    }

    let kind = match MediaKind::parse(kind.trim()) {
        Ok(kind) => kind,
        Err(e) => return error_response(e),
    };
    let outcome = match service
        .search(kind, &text, pos.as_deref(), &caption)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return error_response(e),
    };

    let mut response = artifact_response(outcome.artifact, &service.cache_control());
    let headers = response.headers_mut();
    if let Ok(id) = HeaderValue::from_str(&outcome.hit.subject.id) {
        headers.insert(SUBJECT_ID, id);
    }
    if let Some(next) = outcome.hit.next.and_then(|n| HeaderValue::from_str(&n).ok()) {
        headers.insert(SEARCH_NEXT, next);
    }
    response
}

fn artifact_response(artifact: RenderedArtifact, cache_control: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, artifact.content_type().to_string()),
            (header::CACHE_CONTROL, cache_control.to_string()),
        ],
        artifact.bytes().to_vec(),
    )
        .into_response()
}

fn error_response(err: KittenError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "render failed");
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        debug!(status = status.as_u16(), error = %err, "request rejected");
        err.to_string()
    };

    let mut response = (status, body).into_response();
    if let Some(retry) = err.retry_after() {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(retry.as_secs()));
    }
    response
}
