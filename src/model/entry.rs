use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::feed::LiveFeed;
use crate::util::{decode_data_uri, encode_data_uri, DataUriError};

/// Handle to an entry slot in a [`FeedTree`](super::FeedTree).
///
/// Handles are never reused, so a handle to a destroyed entry simply stops
/// resolving. They are not persisted; use the entry's identifier for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The four kinds of entry. Fixed when the entry is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Root,
    Trash,
    Folder,
    Feed,
}

impl EntryKind {
    /// Root, Trash and Folder entries may hold children; Feeds are leaves.
    pub fn can_hold_children(self) -> bool {
        !matches!(self, EntryKind::Feed)
    }
}

/// Feed icon kept as raw image bytes plus MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub mime: String,
    pub data: Vec<u8>,
}

impl Icon {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    pub fn to_data_uri(&self) -> String {
        encode_data_uri(&self.mime, &self.data)
    }

    pub fn from_data_uri(uri: &str) -> Result<Self, DataUriError> {
        let (mime, data) = decode_data_uri(uri)?;
        Ok(Self { mime, data })
    }
}

/// Attributes that only exist on Feed entries.
#[derive(Debug, Clone, Default)]
pub struct FeedData {
    pub(crate) url: Option<Url>,
    pub(crate) icon: Option<Icon>,
    /// Minutes between refreshes.
    pub(crate) update_interval: Option<u32>,
    pub(crate) live: Option<Arc<dyn LiveFeed>>,
}

impl FeedData {
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn icon(&self) -> Option<&Icon> {
        self.icon.as_ref()
    }

    pub fn update_interval(&self) -> Option<u32> {
        self.update_interval
    }

    pub fn live(&self) -> Option<&Arc<dyn LiveFeed>> {
        self.live.as_ref()
    }
}

#[derive(Debug, Clone)]
pub(crate) enum EntryBody {
    Root,
    Trash { enabled: bool },
    Folder,
    Feed(FeedData),
}

/// A node in the subscription tree.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) body: EntryBody,
    pub(crate) identifier: u64,
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) expanded: bool,
    pub(crate) parent: Option<EntryId>,
    pub(crate) children: Vec<EntryId>,
}

impl Entry {
    pub(crate) fn new(body: EntryBody, identifier: u64) -> Self {
        Self {
            body,
            identifier,
            title: None,
            description: None,
            expanded: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self.body {
            EntryBody::Root => EntryKind::Root,
            EntryBody::Trash { .. } => EntryKind::Trash,
            EntryBody::Folder => EntryKind::Folder,
            EntryBody::Feed(_) => EntryKind::Feed,
        }
    }

    /// 0 for Root and Trash.
    pub fn identifier(&self) -> u64 {
        self.identifier
    }

    /// The stored title, without any live-feed or placeholder fallback.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn children(&self) -> &[EntryId] {
        &self.children
    }

    pub fn feed(&self) -> Option<&FeedData> {
        match &self.body {
            EntryBody::Feed(feed) => Some(feed),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&Url> {
        self.feed().and_then(FeedData::url)
    }

    pub(crate) fn feed_mut(&mut self) -> Option<&mut FeedData> {
        match &mut self.body {
            EntryBody::Feed(feed) => Some(feed),
            _ => None,
        }
    }
}

/// Initial attributes for [`FeedTree::add_entry`](super::FeedTree::add_entry).
///
/// Feed-only fields are ignored when adding a Folder.
#[derive(Debug, Clone, Default)]
pub struct EntryAttributes {
    /// Requested identifier; 0 or an identifier already in use means "assign one".
    pub identifier: u64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<Url>,
    pub icon: Option<Icon>,
    pub update_interval: Option<u32>,
}

impl EntryAttributes {
    pub fn folder(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn feed(url: Url, title: Option<String>) -> Self {
        Self {
            url: Some(url),
            title,
            ..Self::default()
        }
    }
}

/// One attribute write for [`FeedTree::set_attribute`](super::FeedTree::set_attribute).
#[derive(Debug, Clone)]
pub enum Attribute {
    Title(Option<String>),
    Description(Option<String>),
    Url(Option<Url>),
    Identifier(u64),
    Icon(Option<Icon>),
    UpdateInterval(Option<u32>),
    Expanded(bool),
}

impl Attribute {
    /// Significant attributes notify observers; the rest are view-layer data
    /// and change silently.
    pub fn is_significant(&self) -> bool {
        matches!(
            self,
            Attribute::Title(_)
                | Attribute::Description(_)
                | Attribute::Url(_)
                | Attribute::Identifier(_)
        )
    }
}

/// A view-layer position handle: "row `row` under `parent`", plus the
/// identifier the entry had when the handle was taken.
///
/// `parent == None` addresses the two top-level entries: row 0 is Root and
/// row 1 is Trash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub parent: Option<EntryId>,
    pub row: usize,
    pub identifier: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_children_capability() {
        assert!(EntryKind::Root.can_hold_children());
        assert!(EntryKind::Trash.can_hold_children());
        assert!(EntryKind::Folder.can_hold_children());
        assert!(!EntryKind::Feed.can_hold_children());
    }

    #[test]
    fn test_icon_data_uri() {
        let icon = Icon::new("image/png", vec![1, 2, 3, 4]);
        let parsed = Icon::from_data_uri(&icon.to_data_uri()).unwrap();
        assert_eq!(parsed, icon);
        assert!(Icon::from_data_uri("not-a-data-uri").is_err());
    }

    #[test]
    fn test_significant_attributes() {
        assert!(Attribute::Title(None).is_significant());
        assert!(Attribute::Url(None).is_significant());
        assert!(Attribute::Description(None).is_significant());
        assert!(Attribute::Identifier(3).is_significant());
        assert!(!Attribute::Icon(None).is_significant());
        assert!(!Attribute::UpdateInterval(Some(30)).is_significant());
        assert!(!Attribute::Expanded(true).is_significant());
    }

    #[test]
    fn test_folder_has_no_feed_data() {
        let folder = Entry::new(EntryBody::Folder, 1);
        assert_eq!(folder.kind(), EntryKind::Folder);
        assert!(folder.feed().is_none());
        assert!(folder.url().is_none());
    }
}
