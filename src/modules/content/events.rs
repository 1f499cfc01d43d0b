use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::model::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Transcode,
    Thumbnail,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Transcode => f.write_str("transcode"),
            JobKind::Thumbnail => f.write_str("thumbnail"),
        }
    }
}

/// A unit of dispatched work. Carries no mutable state; its payload is the
/// wire format on the durable queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub asset_id: AssetId,
    pub kind: JobKind,
    pub timeout_secs: u64,
}

impl Job {
    pub fn transcode(asset_id: AssetId, timeout: Duration) -> Self {
        Self {
            asset_id,
            kind: JobKind::Transcode,
            timeout_secs: timeout.as_secs().max(1),
        }
    }

    pub fn thumbnail(asset_id: AssetId, timeout: Duration) -> Self {
        Self {
            asset_id,
            kind: JobKind::Thumbnail,
            timeout_secs: timeout.as_secs().max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
