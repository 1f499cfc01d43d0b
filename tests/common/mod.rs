#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use vod_pipeline::common::error::AppError;
use vod_pipeline::config::settings::AppConfig;
use vod_pipeline::infrastructure::queue::InMemoryJobQueue;
use vod_pipeline::infrastructure::transcoder::{TranscodeError, Transcoder};
use vod_pipeline::modules::content::model::{Asset, AssetId, NewAsset};
use vod_pipeline::modules::content::repository::{AssetRepository, InMemoryAssetRepository};
use vod_pipeline::modules::content::status::StatusEvent;
use vod_pipeline::state::AppState;
use vod_pipeline::workers::pipeline::Pipeline;

pub const TIMEOUT: Duration = Duration::from_secs(60);

/// Writes a tiny playlist and two segments per rendition. Every file carries
/// the output directory it was written to, so a mixed directory is
/// detectable.
#[derive(Default)]
pub struct FakeTranscoder {
    failing_heights: Mutex<HashSet<u32>>,
    fail_thumbnail: AtomicBool,
    delay: Duration,
    thumbnail_script: Mutex<VecDeque<ThumbnailStep>>,
}

/// Scripted behaviour for one thumbnail call. A successful step writes its
/// output before waiting; a failing one waits and then errors.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailStep {
    pub delay: Duration,
    pub succeed: bool,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_height(&self, height: u32) {
        self.failing_heights.lock().unwrap().insert(height);
    }

    pub fn heal(&self) {
        self.failing_heights.lock().unwrap().clear();
        self.fail_thumbnail.store(false, Ordering::SeqCst);
    }

    pub fn fail_thumbnail(&self) {
        self.fail_thumbnail.store(true, Ordering::SeqCst);
    }

    /// Queues behaviour for upcoming thumbnail calls, in call order.
    pub fn script_thumbnails(&self, steps: impl IntoIterator<Item = ThumbnailStep>) {
        self.thumbnail_script.lock().unwrap().extend(steps);
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn render_rendition(
        &self,
        _source: &Path,
        output_dir: &Path,
        target_height: u32,
    ) -> Result<(), TranscodeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        tokio::fs::create_dir_all(output_dir).await?;
        if self.failing_heights.lock().unwrap().contains(&target_height) {
            tokio::fs::write(output_dir.join("000.ts"), b"partial").await?;
            return Err(TranscodeError::Io(std::io::Error::other(format!(
                "encoder crashed at {target_height}"
            ))));
        }

        let marker = output_dir.display().to_string();
        let playlist = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:4\n#EXT-X-PLAYLIST-TYPE:VOD\n\
             # {marker}\n#EXTINF:4.0,\n000.ts\n#EXTINF:2.0,\n001.ts\n#EXT-X-ENDLIST\n"
        );
        tokio::fs::write(output_dir.join("index.m3u8"), playlist).await?;
        for segment in ["000.ts", "001.ts"] {
            tokio::fs::write(output_dir.join(segment), format!("segment {marker}")).await?;
        }
        Ok(())
    }

    async fn render_thumbnail(&self, _source: &Path, output: &Path) -> Result<(), TranscodeError> {
        let step = self.thumbnail_script.lock().unwrap().pop_front();
        if let Some(step) = step {
            if step.succeed {
                tokio::fs::write(output, b"\xFF\xD8\xFFjpeg").await?;
                tokio::time::sleep(step.delay).await;
                return Ok(());
            }
            tokio::time::sleep(step.delay).await;
            return Err(TranscodeError::Io(std::io::Error::other("scripted failure")));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_thumbnail.load(Ordering::SeqCst) {
            return Err(TranscodeError::Io(std::io::Error::other(
                "no frame at 00:00:01",
            )));
        }
        tokio::fs::write(output, b"\xFF\xD8\xFFjpeg").await?;
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub state: AppState,
    pub queue: Arc<InMemoryJobQueue>,
    pub transcoder: Arc<FakeTranscoder>,
    pub pipeline: Arc<Pipeline>,
}

impl Harness {
    pub fn new(transcoder: FakeTranscoder) -> Self {
        Self::with_repository(transcoder, Arc::new(InMemoryAssetRepository::new()))
    }

    pub fn with_repository(transcoder: FakeTranscoder, assets: Arc<dyn AssetRepository>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::local(dir.path().join("videos"));
        let queue = Arc::new(InMemoryJobQueue::new());
        let state = AppState::new(config.clone(), assets.clone(), queue.clone());
        let transcoder = Arc::new(transcoder);
        let pipeline = Arc::new(Pipeline::new(
            state.store.clone(),
            assets,
            transcoder.clone(),
            config.renditions.clone(),
        ));

        Self {
            dir,
            state,
            queue,
            transcoder,
            pipeline,
        }
    }

    pub fn new_asset(&self, title: &str) -> NewAsset {
        let source = self.dir.path().join(format!("{title}.mp4"));
        std::fs::write(&source, b"not really a movie").unwrap();
        NewAsset {
            title: title.to_string(),
            description: format!("{title} description"),
            category: "movie".to_string(),
            source_path: source.display().to_string(),
        }
    }

    /// Registers an asset without dispatching any job.
    pub async fn register(&self, title: &str) -> Asset {
        self.state.assets.create(self.new_asset(title)).await.unwrap()
    }

    pub async fn asset(&self, id: i64) -> Asset {
        self.state.assets.get(id).await.unwrap().unwrap()
    }
}

/// In-memory repository that can slow down recording a thumbnail success
/// and fail a number of outcome writes before recovering.
pub struct ScriptedRepository {
    inner: InMemoryAssetRepository,
    thumbnail_success_delay: Duration,
    failing_writes: AtomicUsize,
}

impl ScriptedRepository {
    pub fn delaying_thumbnail_success(delay: Duration) -> Self {
        Self {
            inner: InMemoryAssetRepository::new(),
            thumbnail_success_delay: delay,
            failing_writes: AtomicUsize::new(0),
        }
    }

    pub fn failing_outcome_writes(count: usize) -> Self {
        Self {
            inner: InMemoryAssetRepository::new(),
            thumbnail_success_delay: Duration::ZERO,
            failing_writes: AtomicUsize::new(count),
        }
    }
}

#[async_trait]
impl AssetRepository for ScriptedRepository {
    async fn create(&self, new: NewAsset) -> Result<Asset, AppError> {
        self.inner.create(new).await
    }

    async fn get(&self, id: AssetId) -> Result<Option<Asset>, AppError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Asset>, AppError> {
        self.inner.list().await
    }

    async fn apply(&self, id: AssetId, event: StatusEvent) -> Result<Asset, AppError> {
        if event != StatusEvent::Started
            && self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        if event == StatusEvent::ThumbnailSucceeded {
            tokio::time::sleep(self.thumbnail_success_delay).await;
        }
        self.inner.apply(id, event).await
    }
}
