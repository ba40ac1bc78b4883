//! Media availability checks
//!
//! Before a conversion is attempted the link is classified, so scheduled
//! premieres are postponed and removed videos are disabled for good.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Availability of a media link
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Playable now
    Ok,
    /// Scheduled or currently live, try again on a later refresh
    Upcoming,
    /// Lookup failed or the media is gone, the item gets disabled
    Invalid,
}

impl Availability {
    /// Classify a yt-dlp `live_status` value
    ///
    /// `None` means the extractor did not report a status, which is treated
    /// as unusable.
    pub fn from_live_status(live_status: Option<&str>) -> Self {
        match live_status {
            Some("not_live") | Some("was_live") => Availability::Ok,
            Some("is_upcoming") => Availability::Upcoming,
            // is_live, post_live and unknown states settle later
            Some(_) => Availability::Upcoming,
            None => Availability::Invalid,
        }
    }
}

/// Queries the current status of a media link without downloading it
#[async_trait]
pub trait AvailabilityChecker: Send + Sync {
    /// Classify `link`; lookup failures map to [`Availability::Invalid`]
    async fn check_availability(&self, link: &str) -> Availability;
}

/// Checker used when no extractor is installed: every link counts as playable
///
/// Conversion failures then keep the item for the next refresh instead of
/// disabling it.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssumeAvailable;

#[async_trait]
impl AvailabilityChecker for AssumeAvailable {
    async fn check_availability(&self, _link: &str) -> Availability {
        Availability::Ok
    }
}
