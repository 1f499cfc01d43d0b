use std::path::PathBuf;
use std::time::Duration;

use crate::common::error::AppError;
use crate::config::env::{self, EnvKey};
use crate::modules::content::model::RenditionSet;

pub const DEFAULT_RENDITIONS: &str = "480p:480:1400000,720p:720:2800000,1080p:1080:5000000";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub amqp_url: Option<String>,
    pub queue_name: String,
    pub media_root: PathBuf,
    pub ffmpeg_path: String,
    pub worker_count: usize,
    pub job_timeout_secs: u64,
    pub renditions: RenditionSet,
}

impl AppConfig {
    pub fn new() -> Result<Self, AppError> {
        let renditions = RenditionSet::parse(&env::get_or(EnvKey::Renditions, DEFAULT_RENDITIONS))
            .map_err(AppError::InvalidConfig)?;

        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            database_url: env::get_opt(EnvKey::DatabaseUrl),
            amqp_url: env::get_opt(EnvKey::AmqpUrl),
            queue_name: env::get_or(EnvKey::QueueName, "transcoding_tasks"),
            media_root: PathBuf::from(env::get_or(EnvKey::MediaRoot, "media/videos")),
            ffmpeg_path: env::get_or(EnvKey::FfmpegPath, "ffmpeg"),
            worker_count: env::get_parsed(EnvKey::WorkerCount, 2usize).max(1),
            job_timeout_secs: env::get_parsed(EnvKey::JobTimeoutSecs, 900u64).max(1),
            renditions,
        })
    }

    /// Configuration rooted at `media_root` with every backend in-process.
    pub fn local(media_root: impl Into<PathBuf>) -> Self {
        Self {
            server_port: 3000,
            database_url: None,
            amqp_url: None,
            queue_name: "transcoding_tasks".to_string(),
            media_root: media_root.into(),
            ffmpeg_path: "ffmpeg".to_string(),
            worker_count: 2,
            job_timeout_secs: 900,
            renditions: RenditionSet::default(),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_renditions_match_builtin_set() {
        assert_eq!(
            RenditionSet::parse(DEFAULT_RENDITIONS).unwrap(),
            RenditionSet::default()
        );
    }

    #[test]
    fn local_config_has_no_external_backends() {
        let config = AppConfig::local("/tmp/media");
        assert!(config.database_url.is_none());
        assert!(config.amqp_url.is_none());
        assert_eq!(config.job_timeout(), Duration::from_secs(900));
        assert_eq!(config.renditions.len(), 3);
    }
}
