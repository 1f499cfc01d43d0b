use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{TranscodeError, Transcoder};
use crate::infrastructure::storage::artifacts::{MANIFEST_EXT, SEGMENT_PATTERN};

const SEGMENT_SECONDS: u32 = 4;
const VIDEO_CRF: u32 = 23;
const THUMBNAIL_OFFSET: &str = "00:00:01.000";
const STDERR_TAIL: usize = 500;

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn rendition_args(source: &Path, output_dir: &Path, target_height: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-i"].map(OsString::from).into();
        args.push(source.into());
        args.extend(
            [
                "-vf".to_string(),
                format!("scale=-2:{target_height}"),
                "-c:v".into(),
                "libx264".into(),
                "-crf".into(),
                VIDEO_CRF.to_string(),
                "-preset".into(),
                "veryfast".into(),
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                "128k".into(),
                "-ac".into(),
                "2".into(),
                "-ar".into(),
                "48000".into(),
                "-hls_time".into(),
                SEGMENT_SECONDS.to_string(),
                "-hls_playlist_type".into(),
                "vod".into(),
                "-hls_segment_filename".into(),
            ]
            .map(OsString::from),
        );
        args.push(output_dir.join(SEGMENT_PATTERN).into());
        args.push(output_dir.join(format!("index.{MANIFEST_EXT}")).into());
        args
    }

    fn thumbnail_args(source: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            ["-y", "-hide_banner", "-ss", THUMBNAIL_OFFSET, "-i"].map(OsString::from).into();
        args.push(source.into());
        args.extend(["-vframes", "1"].map(OsString::from));
        args.push(output.into());
        args
    }

    async fn run(&self, args: Vec<OsString>) -> Result<(), TranscodeError> {
        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                tool: self.ffmpeg_path.clone(),
                source,
            })?
            .wait_with_output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(tool = %self.ffmpeg_path, stderr = %stderr, "encoder finished");

        if !output.status.success() {
            return Err(TranscodeError::Exit {
                tool: self.ffmpeg_path.clone(),
                status: output.status,
                stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn render_rendition(
        &self,
        source: &Path,
        output_dir: &Path,
        target_height: u32,
    ) -> Result<(), TranscodeError> {
        tokio::fs::create_dir_all(output_dir).await?;
        info!(
            source = %source.display(),
            output = %output_dir.display(),
            height = target_height,
            "🎥 Rendering rendition"
        );
        self.run(Self::rendition_args(source, output_dir, target_height))
            .await
    }

    async fn render_thumbnail(&self, source: &Path, output: &Path) -> Result<(), TranscodeError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        info!(source = %source.display(), output = %output.display(), "🖼️ Extracting thumbnail");
        self.run(Self::thumbnail_args(source, output)).await
    }
}

/// Last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
