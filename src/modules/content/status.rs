//! Asset lifecycle state machine.
//!
//! Each asset has two independent legs (transcode and thumbnail). The asset
//! status is derived from the latest outcome of both legs: `ready` once both
//! succeeded, `failed` while either one is failed, `processing` otherwise.
//! Repositories apply events under per-asset serialization, so the
//! functions here assume exclusive access to the record.

use time::OffsetDateTime;

use super::model::{Asset, AssetStatus, Leg, LegState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A worker dequeued a job for the asset.
    Started,
    TranscodeSucceeded { renditions: Vec<String> },
    TranscodeFailed { renditions: Vec<String>, detail: String },
    ThumbnailSucceeded,
    ThumbnailFailed { detail: String },
}

impl Asset {
    pub fn apply(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::Started => {
                // Only the very first pickup moves the status; a stale or
                // duplicate job must not pull a settled asset back.
                if self.status == AssetStatus::Pending {
                    self.status = AssetStatus::Processing;
                }
            }
            StatusEvent::TranscodeSucceeded { renditions } => {
                self.renditions = renditions;
                self.has_master = true;
                self.transcode = Leg {
                    state: LegState::Succeeded,
                    error: None,
                };
            }
            StatusEvent::TranscodeFailed { renditions, detail } => {
                self.renditions = renditions;
                self.has_master = false;
                self.transcode = Leg {
                    state: LegState::Failed,
                    error: Some(detail),
                };
            }
            StatusEvent::ThumbnailSucceeded => {
                self.has_thumbnail = true;
                self.thumbnail = Leg {
                    state: LegState::Succeeded,
                    error: None,
                };
            }
            StatusEvent::ThumbnailFailed { detail } => {
                self.has_thumbnail = false;
                self.thumbnail = Leg {
                    state: LegState::Failed,
                    error: Some(detail),
                };
            }
        }
        self.settle();
        self.updated_at = OffsetDateTime::now_utc();
    }

    fn settle(&mut self) {
        let (transcode, thumbnail) = (self.transcode.state, self.thumbnail.state);

        if transcode == LegState::Succeeded && thumbnail == LegState::Succeeded {
            self.status = AssetStatus::Ready;
            self.error_detail = None;
            return;
        }

        if self.transcode.is_failed() || self.thumbnail.is_failed() {
            self.status = AssetStatus::Failed;
            // First failure wins: keep the recorded detail for as long as the
            // leg that produced it is still failing.
            let recorded_still_failing = self
                .error_detail
                .as_ref()
                .is_some_and(|detail| self.failing_errors().any(|e| e == detail));
            if !recorded_still_failing {
                let first = self.failing_errors().next().cloned();
                self.error_detail = first;
            }
            return;
        }

        if self.status == AssetStatus::Pending {
            self.status = AssetStatus::Processing;
        }
    }

    fn failing_errors(&self) -> impl Iterator<Item = &String> {
        [&self.transcode, &self.thumbnail]
            .into_iter()
            .filter(|leg| leg.is_failed())
            .filter_map(|leg| leg.error.as_ref())
    }
}
