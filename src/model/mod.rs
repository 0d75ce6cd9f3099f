//! The feed subscription tree and the indexes kept alongside it.
//!
//! - [`FeedTree`] - aggregate root: Root and Trash subtrees plus every mutation
//! - [`Entry`] - one node; its kind-specific data lives in [`FeedData`] for feeds
//! - [`ModelEvent`] - change notifications queued by mutations
//! - [`DropPayload`] / [`DragData`] - drag-and-drop glue on top of the mutation API
//!
//! # Example
//!
//! ```
//! use feedtree::model::{EntryAttributes, EntryKind, FeedTree};
//! use url::Url;
//!
//! let mut tree = FeedTree::new();
//! let folder = tree
//!     .add_entry(EntryKind::Folder, EntryAttributes::folder("News"), None, None)
//!     .unwrap();
//! let url = Url::parse("https://example.test/feed").unwrap();
//! let feed = tree
//!     .add_entry(EntryKind::Feed, EntryAttributes::feed(url, None), Some(folder), None)
//!     .unwrap();
//!
//! tree.trash_entry(feed);
//! assert!(!tree.has_feed("https://example.test/feed"));
//! tree.restore_entry(feed);
//! assert_eq!(tree.parent(feed), Some(folder));
//! ```

mod dnd;
mod entry;
mod event;
mod index;
mod trash;
mod tree;

pub use dnd::{DragData, DropPayload, URI_LIST_MIME};
pub use entry::{
    Attribute, Entry, EntryAttributes, EntryId, EntryKind, FeedData, Icon, Position,
};
pub use event::ModelEvent;
pub use trash::TrashRecord;
pub use tree::{ConsistencyError, FeedTree, UNTITLED};
