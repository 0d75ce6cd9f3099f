use super::entry::EntryId;

/// Change notifications queued by the tree's mutating operations.
///
/// Events are appended in the order they happen and stay queued until the
/// owner calls [`FeedTree::drain_events`](super::FeedTree::drain_events), so
/// observers never run while a mutation is half done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    EntryAdded {
        entry: EntryId,
    },
    EntryModified {
        entry: EntryId,
    },
    EntryMoved {
        entry: EntryId,
        previous_parent: EntryId,
        previous_row: usize,
    },
    /// `entry` no longer resolves when this is observed; `identifier` is what it had.
    EntryRemoved {
        entry: EntryId,
        identifier: u64,
        parent: EntryId,
    },
    EntryTrashed {
        entry: EntryId,
        previous_parent: EntryId,
    },
    EntryRestored {
        entry: EntryId,
    },
    /// Something persisted changed; the feeds file should be saved.
    ModelModified,
}
