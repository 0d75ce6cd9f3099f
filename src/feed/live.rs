use chrono::{DateTime, Utc};

use crate::model::Icon;

/// Read-only view of the live feed object behind a Feed entry.
///
/// Fetching and parsing happen elsewhere; the tree only consults this for
/// display data. Every method defaults to "unknown" so implementors can
/// provide just what they track.
pub trait LiveFeed: Send + Sync + std::fmt::Debug {
    /// Title reported by the feed document itself.
    fn title(&self) -> Option<String> {
        None
    }

    /// Icon downloaded for the feed.
    fn icon(&self) -> Option<Icon> {
        None
    }

    /// Timestamp of the newest item seen in the feed.
    fn last_update_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// When the feed was last fetched successfully.
    fn last_synchronization_time(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// A [`LiveFeed`] backed by plain values, for callers that keep feed state
/// in their own storage and only need to hand a snapshot to the tree.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub title: Option<String>,
    pub icon: Option<Icon>,
    pub last_update_time: Option<DateTime<Utc>>,
    pub last_synchronization_time: Option<DateTime<Utc>>,
}

impl LiveFeed for FeedSnapshot {
    fn title(&self) -> Option<String> {
        self.title.clone()
    }

    fn icon(&self) -> Option<Icon> {
        self.icon.clone()
    }

    fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_update_time
    }

    fn last_synchronization_time(&self) -> Option<DateTime<Utc>> {
        self.last_synchronization_time
    }
}
