use tracing::{info, warn};

use super::dto::VideoResponse;
use super::events::Job;
use super::model::{Asset, AssetId, NewAsset};
use crate::common::error::AppError;
use crate::state::AppState;

pub struct AssetService;

impl AssetService {
    /// Registers an uploaded source and dispatches its transcode and
    /// thumbnail jobs. When the queue refuses the work the asset is kept in
    /// `pending` and the caller gets `QueueUnavailable`.
    pub async fn create_asset(state: &AppState, new: NewAsset) -> Result<Asset, AppError> {
        let asset = state.assets.create(new).await?;
        info!(asset_id = asset.id, title = %asset.title, "Asset created");

        Self::enqueue_jobs(state, asset.id).await?;
        Ok(asset)
    }

    /// Re-enqueues both jobs for an existing asset.
    pub async fn reprocess(state: &AppState, id: AssetId) -> Result<Asset, AppError> {
        let asset = state
            .assets
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {id}")))?;

        Self::enqueue_jobs(state, asset.id).await?;
        info!(asset_id = asset.id, "Asset queued for reprocessing");
        Ok(asset)
    }

    pub async fn list_assets(state: &AppState) -> Result<Vec<VideoResponse>, AppError> {
        let assets = state.assets.list().await?;
        Ok(assets.into_iter().map(VideoResponse::from).collect())
    }

    async fn enqueue_jobs(state: &AppState, id: AssetId) -> Result<(), AppError> {
        let timeout = state.config.job_timeout();
        for job in [Job::transcode(id, timeout), Job::thumbnail(id, timeout)] {
            if let Err(e) = state.queue.enqueue(&job).await {
                warn!(asset_id = id, kind = %job.kind, "Failed to enqueue job: {}", e);
                return Err(e.into());
            }
        }
        Ok(())
    }
}
