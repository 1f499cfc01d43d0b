use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::model::{Asset, AssetId, AssetStatus, Leg, NewAsset};
use super::status::StatusEvent;
use crate::common::error::AppError;
use crate::infrastructure::db::pool::DbPool;

/// Asset persistence. `apply` is the only mutation after creation and must
/// run as a serialized read-modify-write per asset.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn create(&self, new: NewAsset) -> Result<Asset, AppError>;

    async fn get(&self, id: AssetId) -> Result<Option<Asset>, AppError>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<Asset>, AppError>;

    async fn apply(&self, id: AssetId, event: StatusEvent) -> Result<Asset, AppError>;
}

// --- POSTGRES ---

#[derive(Debug, FromRow)]
struct AssetRow {
    id: i64,
    title: String,
    description: String,
    category: String,
    source_path: String,
    status: String,
    error_detail: Option<String>,
    renditions: Vec<String>,
    has_master: bool,
    has_thumbnail: bool,
    transcode_state: String,
    transcode_error: Option<String>,
    thumbnail_state: String,
    thumbnail_error: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<AssetRow> for Asset {
    type Error = AppError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        let decode = |e: String| AppError::Database(sqlx::Error::Decode(e.into()));
        Ok(Asset {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            source_path: row.source_path,
            status: row.status.parse().map_err(decode)?,
            error_detail: row.error_detail,
            renditions: row.renditions,
            has_master: row.has_master,
            has_thumbnail: row.has_thumbnail,
            transcode: Leg {
                state: row.transcode_state.parse().map_err(decode)?,
                error: row.transcode_error,
            },
            thumbnail: Leg {
                state: row.thumbnail_state.parse().map_err(decode)?,
                error: row.thumbnail_error,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgAssetRepository {
    pool: DbPool,
}

impl PgAssetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetRepository for PgAssetRepository {
    async fn create(&self, new: NewAsset) -> Result<Asset, AppError> {
        let row = sqlx::query_as::<_, AssetRow>(
            r#"
            INSERT INTO assets (title, description, category, source_path)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.category)
        .bind(&new.source_path)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: AssetId) -> Result<Option<Asset>, AppError> {
        let row = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Asset::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Asset>, AppError> {
        let rows = sqlx::query_as::<_, AssetRow>(
            "SELECT * FROM assets ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Asset::try_from).collect()
    }

    async fn apply(&self, id: AssetId, event: StatusEvent) -> Result<Asset, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent legs of the same asset.
        let row = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Asset {id}")))?;

        let mut asset = Asset::try_from(row)?;
        asset.apply(event);

        sqlx::query(
            r#"
            UPDATE assets SET
                status = $1,
                error_detail = $2,
                renditions = $3,
                has_master = $4,
                has_thumbnail = $5,
                transcode_state = $6,
                transcode_error = $7,
                thumbnail_state = $8,
                thumbnail_error = $9,
                updated_at = $10
            WHERE id = $11
            "#,
        )
        .bind(asset.status.as_str())
        .bind(&asset.error_detail)
        .bind(&asset.renditions)
        .bind(asset.has_master)
        .bind(asset.has_thumbnail)
        .bind(asset.transcode.state.as_str())
        .bind(&asset.transcode.error)
        .bind(asset.thumbnail.state.as_str())
        .bind(&asset.thumbnail.error)
        .bind(asset.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(asset)
    }
}

// --- IN-MEMORY ---

#[derive(Default)]
struct MemoryState {
    next_id: AssetId,
    assets: BTreeMap<AssetId, Asset>,
}

/// Process-local repository; one lock serializes every update.
#[derive(Default)]
pub struct InMemoryAssetRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryAssetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetRepository for InMemoryAssetRepository {
    async fn create(&self, new: NewAsset) -> Result<Asset, AppError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let asset = Asset {
            id: state.next_id,
            title: new.title,
            description: new.description,
            category: new.category,
            source_path: new.source_path,
            status: AssetStatus::Pending,
            error_detail: None,
            renditions: Vec::new(),
            has_master: false,
            has_thumbnail: false,
            transcode: Leg::pending(),
            thumbnail: Leg::pending(),
            created_at: now,
            updated_at: now,
        };
        state.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn get(&self, id: AssetId) -> Result<Option<Asset>, AppError> {
        Ok(self.state.lock().await.assets.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Asset>, AppError> {
        Ok(self.state.lock().await.assets.values().rev().cloned().collect())
    }

    async fn apply(&self, id: AssetId, event: StatusEvent) -> Result<Asset, AppError> {
        let mut state = self.state.lock().await;
        let asset = state
            .assets
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Asset {id}")))?;
        asset.apply(event);
        Ok(asset.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_asset(title: &str) -> NewAsset {
        NewAsset {
            title: title.to_string(),
            description: String::new(),
            category: "movie".to_string(),
            source_path: format!("{title}.mp4"),
        }
    }

    #[tokio::test]
    async fn memory_repository_assigns_ids_and_lists_newest_first() {
        let repo = InMemoryAssetRepository::new();
        let a = repo.create(new_asset("a")).await.unwrap();
        let b = repo.create(new_asset("b")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(a.status, AssetStatus::Pending);

        let ids: Vec<AssetId> = repo.list().await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn apply_on_missing_asset_is_not_found() {
        let repo = InMemoryAssetRepository::new();
        let err = repo.apply(42, StatusEvent::Started).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn apply_persists_the_transition() {
        let repo = InMemoryAssetRepository::new();
        let asset = repo.create(new_asset("a")).await.unwrap();
        repo.apply(asset.id, StatusEvent::Started).await.unwrap();
        let stored = repo.get(asset.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AssetStatus::Processing);
    }
}
