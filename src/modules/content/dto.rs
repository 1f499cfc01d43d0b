use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use utoipa::ToSchema;

use super::model::{Asset, AssetId, AssetStatus};

/// Public view of an asset. Failure detail stays internal.
#[derive(Debug, Serialize, ToSchema)]
pub struct VideoResponse {
    pub id: AssetId,
    /// RFC 3339 timestamp.
    pub created_at: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub thumbnail_url: Option<String>,
    pub status: AssetStatus,
}

impl From<Asset> for VideoResponse {
    fn from(asset: Asset) -> Self {
        Self {
            thumbnail_url: asset
                .has_thumbnail
                .then(|| format!("/videos/{}/thumbnail", asset.id)),
            id: asset.id,
            created_at: asset.created_at.format(&Rfc3339).unwrap_or_default(),
            title: asset.title,
            description: asset.description,
            category: asset.category,
            status: asset.status,
        }
    }
}
