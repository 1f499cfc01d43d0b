use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;

pub type AssetId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Pending => "pending",
            AssetStatus::Processing => "processing",
            AssetStatus::Ready => "ready",
            AssetStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssetStatus::Pending),
            "processing" => Ok(AssetStatus::Processing),
            "ready" => Ok(AssetStatus::Ready),
            "failed" => Ok(AssetStatus::Failed),
            other => Err(format!("unknown asset status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegState {
    Pending,
    Succeeded,
    Failed,
}

impl LegState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegState::Pending => "pending",
            LegState::Succeeded => "succeeded",
            LegState::Failed => "failed",
        }
    }
}

impl FromStr for LegState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LegState::Pending),
            "succeeded" => Ok(LegState::Succeeded),
            "failed" => Ok(LegState::Failed),
            other => Err(format!("unknown leg state '{other}'")),
        }
    }
}

/// Outcome of the most recent attempt of one processing leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub state: LegState,
    pub error: Option<String>,
}

impl Leg {
    pub fn pending() -> Self {
        Self {
            state: LegState::Pending,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == LegState::Failed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub source_path: String,
    pub status: AssetStatus,
    pub error_detail: Option<String>,
    /// Labels of the renditions produced by the latest transcode attempt.
    pub renditions: Vec<String>,
    pub has_master: bool,
    pub has_thumbnail: bool,
    pub transcode: Leg,
    pub thumbnail: Leg,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub title: String,
    pub description: String,
    pub category: String,
    pub source_path: String,
}

/// Tallest rendition accepted from configuration (8K).
pub const MAX_RENDITION_HEIGHT: u32 = 4320;

/// One resolution-specific output: `label` names its directory, `height` is
/// the scaling target and `bandwidth` is what the master playlist declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub label: String,
    pub height: u32,
    pub bandwidth: u64,
}

impl Rendition {
    pub fn new(label: impl Into<String>, height: u32, bandwidth: u64) -> Self {
        Self {
            label: label.into(),
            height,
            bandwidth,
        }
    }

    /// 16:9 width for the target height, rounded up to an even pixel count.
    pub fn width(&self) -> u32 {
        let w = (self.height * 16).div_ceil(9);
        w + (w % 2)
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width(), self.height)
    }
}

/// The configured renditions, always kept in ascending height order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionSet(Vec<Rendition>);

impl RenditionSet {
    pub fn new(mut renditions: Vec<Rendition>) -> Result<Self, String> {
        if renditions.is_empty() {
            return Err("at least one rendition must be configured".into());
        }
        for (i, r) in renditions.iter().enumerate() {
            if r.label.is_empty()
                || !r
                    .label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(format!("invalid rendition label '{}'", r.label));
            }
            if r.label == "master" || r.label == "thumbnail" {
                return Err(format!("rendition label '{}' is reserved", r.label));
            }
            if r.height == 0 || r.height > MAX_RENDITION_HEIGHT {
                return Err(format!(
                    "rendition '{}' height must be between 1 and {MAX_RENDITION_HEIGHT}",
                    r.label
                ));
            }
            if renditions[..i].iter().any(|o| o.label == r.label) {
                return Err(format!("duplicate rendition label '{}'", r.label));
            }
        }
        renditions.sort_by_key(|r| r.height);
        Ok(Self(renditions))
    }

    /// Parses `label:height:bandwidth` entries separated by commas.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut renditions = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').collect();
            let [label, height, bandwidth] = parts.as_slice() else {
                return Err(format!("expected label:height:bandwidth, got '{entry}'"));
            };
            let height = height
                .parse()
                .map_err(|_| format!("invalid height in '{entry}'"))?;
            let bandwidth = bandwidth
                .parse()
                .map_err(|_| format!("invalid bandwidth in '{entry}'"))?;
            renditions.push(Rendition::new(*label, height, bandwidth));
        }
        Self::new(renditions)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rendition> {
        self.0.iter()
    }

    pub fn get(&self, label: &str) -> Option<&Rendition> {
        self.0.iter().find(|r| r.label == label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RenditionSet {
    fn default() -> Self {
        Self(vec![
            Rendition::new("480p", 480, 1_400_000),
            Rendition::new("720p", 720, 2_800_000),
            Rendition::new("1080p", 1080, 5_000_000),
        ])
    }
}
