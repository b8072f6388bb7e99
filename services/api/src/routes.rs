use crate::infra::AppState;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use volunteer_hub::engagement::media::MediaError;
use volunteer_hub::engagement::repository::{
    CommunityRepository, EventRepository, UserRepository,
};
use volunteer_hub::engagement::similarity::SimilarityClient;
use volunteer_hub::engagement::{engagement_router, EngagementCore};

pub(crate) fn with_engagement_routes<E, C, U, S>(
    core: Arc<EngagementCore<E, C, U, S>>,
) -> axum::Router
where
    E: EventRepository + 'static,
    C: CommunityRepository + 'static,
    U: UserRepository + 'static,
    S: SimilarityClient + 'static,
{
    engagement_router(core)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route("/media/:reference", axum::routing::get(media_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serve the bytes behind a stored media reference. The content type is
/// guessed from the reference's extension.
pub(crate) async fn media_endpoint(
    Extension(state): Extension<AppState>,
    Path(reference): Path<String>,
) -> impl IntoResponse {
    match state.media.open(&reference) {
        Ok(payload) => {
            let content_type = mime_guess::from_path(&reference).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.to_string())],
                payload.bytes,
            )
                .into_response()
        }
        Err(MediaError::NotFound) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "media reference not found" })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}
