use axum::Router;
use axum::routing::get;

use crate::state::AppState;

pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;
pub mod status;
pub mod stream_handler;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/videos", get(handler::list_videos))
        .route("/videos/{id}/thumbnail", get(stream_handler::get_thumbnail))
        .route(
            "/videos/{id}/{resolution}/manifest",
            get(stream_handler::get_manifest),
        )
        .route(
            "/videos/{id}/{resolution}/{segment}",
            get(stream_handler::get_segment),
        )
}
