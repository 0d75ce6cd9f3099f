use url::Url;

use super::entry::{EntryAttributes, EntryId, EntryKind, Position};
use super::tree::FeedTree;

/// MIME type advertised for dragged feeds.
pub const URI_LIST_MIME: &str = "text/uri-list";

/// What a drag out of the tree carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragData {
    /// Feed URLs joined with ", ", for plain-text targets.
    pub text: String,
    pub urls: Vec<Url>,
    /// Set when exactly one entry is dragged, so a drop back into the tree
    /// becomes a move instead of a new subscription.
    pub source: Option<Position>,
}

/// Something dropped onto the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropPayload {
    /// An entry dragged from this tree.
    Entry(Position),
    /// URLs from elsewhere; each becomes a Feed titled `title` or its URL.
    Urls {
        urls: Vec<Url>,
        title: Option<String>,
    },
}

impl FeedTree {
    pub fn mime_types(&self) -> &'static [&'static str] {
        &[URI_LIST_MIME]
    }

    /// Builds the drag payload for a selection. Only Feed entries contribute URLs.
    pub fn drag_data(&self, entries: &[EntryId]) -> DragData {
        let urls: Vec<Url> = entries
            .iter()
            .filter_map(|id| self.entry(*id))
            .filter_map(|entry| entry.url().cloned())
            .collect();

        let text = urls
            .iter()
            .map(Url::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        let source = match entries {
            [single] => self.position(*single),
            _ => None,
        };

        DragData { text, urls, source }
    }

    /// Whether `payload` may be dropped onto `parent`.
    ///
    /// Only Root, Trash and Folders accept drops. A dragged entry is refused
    /// when it would land inside itself.
    pub fn can_drop(&self, payload: &DropPayload, parent: EntryId) -> bool {
        if !self.accepts_drops(parent) {
            return false;
        }

        match payload {
            DropPayload::Entry(position) => self
                .get_entry_at(position)
                .is_some_and(|entry| entry != parent && !self.is_ancestor_of(entry, parent)),
            DropPayload::Urls { urls, .. } => !urls.is_empty(),
        }
    }

    /// Applies a drop at `row` under `parent` (appended when `None`).
    ///
    /// A dragged entry is moved with [`FeedTree::move_entry`]. Dropped URLs
    /// are added as Feeds in the order given. Returns `false` when nothing
    /// changed.
    pub fn drop_payload(
        &mut self,
        payload: DropPayload,
        parent: EntryId,
        row: Option<usize>,
    ) -> bool {
        if !self.accepts_drops(parent) {
            tracing::debug!(%parent, "Rejected drop onto an entry that cannot hold children");
            return false;
        }

        match payload {
            DropPayload::Entry(position) => match self.get_entry_at(&position) {
                Some(entry) => self.move_entry(entry, parent, row),
                None => false,
            },
            DropPayload::Urls { urls, title } => {
                let title = title.filter(|t| !t.is_empty());
                let mut added = 0;

                for url in urls {
                    let feed_title = title.clone().unwrap_or_else(|| url.to_string());
                    let attributes = EntryAttributes::feed(url, Some(feed_title));
                    let target = row.map(|r| r + added);
                    if self
                        .add_entry(EntryKind::Feed, attributes, Some(parent), target)
                        .is_some()
                    {
                        added += 1;
                    }
                }

                tracing::debug!(%parent, added, "Dropped URLs onto tree");
                added > 0
            }
        }
    }

    fn accepts_drops(&self, parent: EntryId) -> bool {
        matches!(
            self.kind(parent),
            Some(EntryKind::Root | EntryKind::Trash | EntryKind::Folder)
        )
    }
}
