use axum::{extract::State, response::IntoResponse};

use super::dto::VideoResponse;
use super::service::AssetService;
use crate::common::error::AppError;
use crate::common::response::{ApiResponse, ApiSuccess};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/videos",
    responses(
        (status = 200, description = "List Videos", body = ApiResponse<Vec<VideoResponse>>),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Content"
)]
pub async fn list_videos(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let videos = AssetService::list_assets(&state).await?;
    Ok(ApiSuccess::ok(videos, "Videos retrieved successfully"))
}
