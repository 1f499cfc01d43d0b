//! Filesystem layout of generated artifacts.
//!
//! ```text
//! <root>/<asset-id>/<label>/index.m3u8      rendition playlist
//! <root>/<asset-id>/<label>/000.ts ...      rendition segments
//! <root>/<asset-id>/master.m3u8             master playlist
//! <root>/thumbnails/<asset-id>_thumbnail.jpg
//! ```
//!
//! Renditions are rendered into `<root>/<asset-id>/.staging/<run>/<label>` and
//! swapped into place with directory renames, so a finished rendition
//! directory is always the complete output of exactly one run.

use std::ffi::OsStr;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::modules::content::model::AssetId;

pub const MANIFEST_EXT: &str = "m3u8";
pub const SEGMENT_PATTERN: &str = "%03d.ts";
const STAGING_DIR: &str = ".staging";
const THUMBNAILS_DIR: &str = "thumbnails";
const PROMOTE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn asset_dir(&self, id: AssetId) -> PathBuf {
        self.root.join(id.to_string())
    }

    pub fn rendition_dir(&self, id: AssetId, label: &str) -> PathBuf {
        self.asset_dir(id).join(label)
    }

    pub fn rendition_manifest(&self, id: AssetId, label: &str) -> PathBuf {
        self.rendition_dir(id, label)
            .join(format!("index.{MANIFEST_EXT}"))
    }

    pub fn master_manifest(&self, id: AssetId) -> PathBuf {
        self.asset_dir(id).join(format!("master.{MANIFEST_EXT}"))
    }

    pub fn thumbnail_path(&self, id: AssetId) -> PathBuf {
        self.root
            .join(THUMBNAILS_DIR)
            .join(format!("{id}_thumbnail.jpg"))
    }

    /// Private working directory for one run of a job on an asset.
    pub fn staging_dir(&self, id: AssetId, run: Uuid) -> PathBuf {
        self.asset_dir(id).join(STAGING_DIR).join(run.to_string())
    }

    /// Temporary thumbnail location; keeps the `.jpg` extension so the
    /// encoder picks the right image format.
    pub fn thumbnail_staging_path(&self, id: AssetId, run: Uuid) -> PathBuf {
        self.root
            .join(THUMBNAILS_DIR)
            .join(format!(".{run}-{id}_thumbnail.jpg"))
    }

    /// Location of `segment` inside a rendition directory, or `None` when the
    /// name is anything other than a single plain file name.
    pub fn segment_path(&self, id: AssetId, label: &str, segment: &str) -> Option<PathBuf> {
        if !is_plain_file_name(segment) {
            return None;
        }
        Some(self.rendition_dir(id, label).join(segment))
    }

    /// Returns `path` if it is an existing regular file that, after resolving
    /// symlinks, still lives under `dir`.
    pub async fn existing_file_within(&self, dir: &Path, path: &Path) -> Option<PathBuf> {
        let dir = fs::canonicalize(dir).await.ok()?;
        let resolved = fs::canonicalize(path).await.ok()?;
        if !resolved.starts_with(&dir) {
            warn!(path = %path.display(), "rejected artifact outside its directory");
            return None;
        }
        let meta = fs::metadata(&resolved).await.ok()?;
        meta.is_file().then_some(resolved)
    }

    /// Replaces the rendition directory with `staged`. Concurrent promotions
    /// of the same rendition resolve to whichever rename lands last.
    pub async fn promote_rendition(
        &self,
        staged: &Path,
        id: AssetId,
        label: &str,
    ) -> io::Result<()> {
        let target = self.rendition_dir(id, label);
        let retired_root = self.asset_dir(id).join(STAGING_DIR);
        fs::create_dir_all(&retired_root).await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let retired = retired_root.join(format!("retired-{}", Uuid::new_v4()));
            match fs::rename(&target, &retired).await {
                Ok(()) => discard(&retired).await,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }

            match fs::rename(staged, &target).await {
                Ok(()) => return Ok(()),
                Err(e)
                    if attempt < PROMOTE_ATTEMPTS
                        && matches!(
                            e.kind(),
                            ErrorKind::DirectoryNotEmpty | ErrorKind::AlreadyExists
                        ) =>
                {
                    debug!(asset_id = id, rendition = label, "lost promotion race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn write_master(&self, id: AssetId, contents: &str) -> io::Result<()> {
        let staging = self.asset_dir(id).join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let tmp = staging.join(format!("master-{}.{MANIFEST_EXT}", Uuid::new_v4()));
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, self.master_manifest(id)).await
    }

    pub async fn remove_master(&self, id: AssetId) -> io::Result<()> {
        remove_if_exists(&self.master_manifest(id)).await
    }

    pub async fn promote_thumbnail(&self, staged: &Path, id: AssetId) -> io::Result<()> {
        fs::rename(staged, self.thumbnail_path(id)).await
    }

    pub async fn remove_thumbnail(&self, id: AssetId) -> io::Result<()> {
        remove_if_exists(&self.thumbnail_path(id)).await
    }

    pub async fn prepare_thumbnail_dir(&self) -> io::Result<()> {
        fs::create_dir_all(self.root.join(THUMBNAILS_DIR)).await
    }
}

fn is_plain_file_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(n)), None) if n == OsStr::new(name)
    )
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Best-effort removal of a file or directory left behind by a run.
pub async fn discard(path: &Path) {
    let result = match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        debug!(path = %path.display(), error = %e, "failed to discard artifact");
    }
}
