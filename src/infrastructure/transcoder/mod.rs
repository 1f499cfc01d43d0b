use std::path::Path;
use std::process::ExitStatus;

use async_trait::async_trait;
use thiserror::Error;

pub mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Exit {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drives an external encoder. Calls block the invoking worker until the
/// tool exits; dropping the returned future terminates the tool.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Writes `index.m3u8` plus numbered segments into `output_dir`, scaled to
    /// `target_height` with the source aspect ratio preserved.
    async fn render_rendition(
        &self,
        source: &Path,
        output_dir: &Path,
        target_height: u32,
    ) -> Result<(), TranscodeError>;

    /// Extracts a single still frame one second into `source`.
    async fn render_thumbnail(&self, source: &Path, output: &Path) -> Result<(), TranscodeError>;
}
