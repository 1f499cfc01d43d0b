//! Pipeline orchestrator: turns one dequeued job into artifacts on disk and
//! a status transition for its asset.
//!
//! Rendering happens in private staging space and may overlap freely with
//! other runs. Publishing a leg's outcome (swapping the live master or
//! thumbnail in, or removing it) and recording the matching status event
//! happen together under a per-asset lock, so the record always describes
//! what the last publisher left on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::error::AppError;
use crate::infrastructure::storage::artifacts::{ArtifactStore, discard};
use crate::infrastructure::storage::playlist::render_master;
use crate::infrastructure::transcoder::{TranscodeError, Transcoder};
use crate::modules::content::events::{Job, JobKind};
use crate::modules::content::model::{Asset, AssetId, RenditionSet};
use crate::modules::content::repository::AssetRepository;
use crate::modules::content::status::StatusEvent;

pub struct Pipeline {
    store: ArtifactStore,
    assets: Arc<dyn AssetRepository>,
    transcoder: Arc<dyn Transcoder>,
    renditions: RenditionSet,
    locks: AssetLocks,
}

/// Result of a rendered leg, not yet visible to readers.
enum Outcome {
    Transcoded { renditions: Vec<String> },
    TranscodeFailed { renditions: Vec<String>, error: AppError },
    Thumbnailed { staged: PathBuf },
    ThumbnailFailed { error: AppError },
}

impl Pipeline {
    pub fn new(
        store: ArtifactStore,
        assets: Arc<dyn AssetRepository>,
        transcoder: Arc<dyn Transcoder>,
        renditions: RenditionSet,
    ) -> Self {
        Self {
            store,
            assets,
            transcoder,
            renditions,
            locks: AssetLocks::default(),
        }
    }

    /// Runs `job` to completion and records its outcome. Transcoder failures
    /// are not errors here: they end up in the asset's status. `Err` means
    /// the asset is unknown or its record could not be updated.
    pub async fn handle(&self, job: &Job) -> Result<Asset, AppError> {
        let asset = self
            .assets
            .get(job.asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {}", job.asset_id)))?;

        self.assets.apply(asset.id, StatusEvent::Started).await?;

        let run = Uuid::new_v4();
        info!(asset_id = asset.id, kind = %job.kind, %run, "Processing job");

        let outcome = match tokio::time::timeout(job.timeout(), self.run_leg(job.kind, &asset, run))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => timed_out(job),
        };

        let published = self.publish(asset.id, outcome).await;

        discard(&self.store.staging_dir(asset.id, run)).await;
        discard(&self.store.thumbnail_staging_path(asset.id, run)).await;

        let asset = published?;
        info!(
            asset_id = asset.id,
            kind = %job.kind,
            status = %asset.status,
            "Job finished"
        );
        Ok(asset)
    }

    async fn run_leg(&self, kind: JobKind, asset: &Asset, run: Uuid) -> Outcome {
        match kind {
            JobKind::Transcode => self.transcode(asset, run).await,
            JobKind::Thumbnail => self.thumbnail(asset, run).await,
        }
    }

    /// Attempts every configured rendition; one failing never stops the rest.
    async fn transcode(&self, asset: &Asset, run: Uuid) -> Outcome {
        let source = Path::new(&asset.source_path);
        let staging = self.store.staging_dir(asset.id, run);

        let mut completed = Vec::new();
        let mut reasons = Vec::new();

        for rendition in self.renditions.iter() {
            let output = staging.join(&rendition.label);
            let result = match self
                .transcoder
                .render_rendition(source, &output, rendition.height)
                .await
            {
                Ok(()) => self
                    .store
                    .promote_rendition(&output, asset.id, &rendition.label)
                    .await
                    .map_err(TranscodeError::from),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    info!(asset_id = asset.id, rendition = %rendition.label, "✅ Rendition ready");
                    completed.push(rendition.label.clone());
                }
                Err(e) => {
                    warn!(asset_id = asset.id, rendition = %rendition.label, error = %e, "❌ Rendition failed");
                    discard(&output).await;
                    reasons.push(format!("{}: {}", rendition.label, e));
                }
            }
        }

        if reasons.is_empty() {
            Outcome::Transcoded {
                renditions: completed,
            }
        } else {
            Outcome::TranscodeFailed {
                renditions: completed,
                error: AppError::TranscodeFailure(reasons.join("; ")),
            }
        }
    }

    async fn thumbnail(&self, asset: &Asset, run: Uuid) -> Outcome {
        let source = Path::new(&asset.source_path);
        let staged = self.store.thumbnail_staging_path(asset.id, run);

        let rendered = async {
            self.store.prepare_thumbnail_dir().await?;
            self.transcoder.render_thumbnail(source, &staged).await?;
            Ok::<(), TranscodeError>(())
        }
        .await;

        match rendered {
            Ok(()) => Outcome::Thumbnailed { staged },
            Err(e) => Outcome::ThumbnailFailed {
                error: AppError::TranscodeFailure(format!("thumbnail: {e}")),
            },
        }
    }

    /// Makes the outcome visible and records it as one step per asset.
    async fn publish(&self, id: AssetId, outcome: Outcome) -> Result<Asset, AppError> {
        let guard = self.locks.lock(id).await;

        let event = match outcome {
            Outcome::Transcoded { renditions } => {
                match self
                    .store
                    .write_master(id, &render_master(&self.renditions))
                    .await
                {
                    Ok(()) => StatusEvent::TranscodeSucceeded { renditions },
                    Err(e) => {
                        let error = AppError::TranscodeFailure(format!(
                            "writing master playlist: {e}"
                        ));
                        self.transcode_failed(id, renditions, error).await
                    }
                }
            }
            Outcome::TranscodeFailed { renditions, error } => {
                self.transcode_failed(id, renditions, error).await
            }
            Outcome::Thumbnailed { staged } => {
                match self.store.promote_thumbnail(&staged, id).await {
                    Ok(()) => StatusEvent::ThumbnailSucceeded,
                    Err(e) => {
                        let error = AppError::TranscodeFailure(format!("thumbnail: {e}"));
                        self.thumbnail_failed(id, error).await
                    }
                }
            }
            Outcome::ThumbnailFailed { error } => self.thumbnail_failed(id, error).await,
        };

        let recorded = self.assets.apply(id, event).await;
        drop(guard);
        self.locks.release(id).await;
        recorded
    }

    // A failed leg must not leave an earlier run's artifact looking current.
    async fn transcode_failed(
        &self,
        id: AssetId,
        renditions: Vec<String>,
        error: AppError,
    ) -> StatusEvent {
        warn!(asset_id = id, error = %error, "❌ Transcode leg failed");
        if let Err(e) = self.store.remove_master(id).await {
            warn!(asset_id = id, error = %e, "Failed to remove stale master playlist");
        }
        StatusEvent::TranscodeFailed {
            renditions,
            detail: error.to_string(),
        }
    }

    async fn thumbnail_failed(&self, id: AssetId, error: AppError) -> StatusEvent {
        warn!(asset_id = id, error = %error, "❌ Thumbnail leg failed");
        if let Err(e) = self.store.remove_thumbnail(id).await {
            warn!(asset_id = id, error = %e, "Failed to remove stale thumbnail");
        }
        StatusEvent::ThumbnailFailed {
            detail: error.to_string(),
        }
    }
}

fn timed_out(job: &Job) -> Outcome {
    warn!(asset_id = job.asset_id, kind = %job.kind, "Job timed out");
    let error = AppError::TranscodeFailure(format!(
        "{} timed out after {}s",
        job.kind, job.timeout_secs
    ));
    match job.kind {
        JobKind::Transcode => Outcome::TranscodeFailed {
            renditions: Vec::new(),
            error,
        },
        JobKind::Thumbnail => Outcome::ThumbnailFailed { error },
    }
}

/// One mutex per asset with a publish in flight.
#[derive(Default)]
struct AssetLocks {
    held: Mutex<HashMap<AssetId, Arc<Mutex<()>>>>,
}

impl AssetLocks {
    async fn lock(&self, id: AssetId) -> OwnedMutexGuard<()> {
        let entry = self.held.lock().await.entry(id).or_default().clone();
        entry.lock_owned().await
    }

    /// Forgets the asset's mutex once nobody holds or waits for it.
    async fn release(&self, id: AssetId) {
        let mut held = self.held.lock().await;
        if held.get(&id).is_some_and(|m| Arc::strong_count(m) == 1) {
            held.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn asset_locks_serialize_one_asset_only() {
        let locks = AssetLocks::default();
        let first = locks.lock(7).await;

        // Another asset is not blocked.
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock(8)).await;
        assert!(other.is_ok());

        // The same asset waits for the holder.
        let same = tokio::time::timeout(Duration::from_millis(50), locks.lock(7)).await;
        assert!(same.is_err());

        drop(first);
        drop(other);
        locks.release(7).await;
        locks.release(8).await;
        assert!(locks.held.lock().await.is_empty());
    }

    #[test]
    fn timeouts_fail_the_matching_leg() {
        let job = Job::thumbnail(4, Duration::from_secs(30));
        match timed_out(&job) {
            Outcome::ThumbnailFailed { error } => {
                assert_eq!(
                    error.to_string(),
                    "transcode failed: thumbnail timed out after 30s"
                );
            }
            _ => panic!("expected a thumbnail failure"),
        }
    }
}
