//! Route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/prompt/generate-prompts",
            post(handlers::prompt::generate_prompts),
        )
        .route(
            "/prompt/generate-prompts-ids",
            post(handlers::prompt::generate_prompts_by_ids),
        )
        .route("/generate-images", post(handlers::image::generate_images))
        .route("/generate-audio", post(handlers::audio::generate_audio))
        .route(
            "/video-tasks",
            post(handlers::video_tasks::create_video_task),
        )
        .route(
            "/video-tasks/:video_task_id",
            get(handlers::video_tasks::get_video_task),
        )
        .route(
            "/video-tasks/:video_task_id/retry",
            post(handlers::video_tasks::retry_video_task),
        )
        .route("/tasks/:task_id", get(handlers::tasks::get_task))
        .route("/ws/connect", get(ws::ws_connect))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .with_state(state)
}
