use std::collections::HashMap;

use super::entry::EntryId;

/// Where a trashed entry lived before it was trashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrashRecord {
    /// Identifier of the former parent; 0 means Root.
    pub parent: u64,
    pub row: usize,
}

/// Side table of trash provenance, keyed by the trashed entry's identifier.
///
/// Records hold identifiers rather than handles, so restoring never follows
/// a pointer into a destroyed entry. The parent's slot is kept next to each
/// record only to verify that the identifier still names the same entry.
#[derive(Debug, Default, Clone)]
pub(crate) struct TrashLedger {
    records: HashMap<u64, (TrashRecord, EntryId)>,
}

impl TrashLedger {
    pub(crate) fn record(&mut self, identifier: u64, record: TrashRecord, parent: EntryId) {
        self.records.insert(identifier, (record, parent));
    }

    pub(crate) fn take(&mut self, identifier: u64) -> Option<TrashRecord> {
        self.records.remove(&identifier).map(|(record, _)| record)
    }

    pub(crate) fn get(&self, identifier: u64) -> Option<TrashRecord> {
        self.records.get(&identifier).map(|(record, _)| *record)
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    /// Drops every record whose former parent was `identifier`.
    ///
    /// Called when that parent is destroyed; its identifier may be handed
    /// out again and must not pull a restore into an unrelated folder.
    pub(crate) fn forget_parent(&mut self, identifier: u64) {
        self.records
            .retain(|_, (record, _)| record.parent != identifier);
    }

    /// Follows an identifier change on either side of a record.
    pub(crate) fn rekey(&mut self, old: u64, new: u64) {
        if let Some(entry) = self.records.remove(&old) {
            self.records.insert(new, entry);
        }
        for (record, _) in self.records.values_mut() {
            if record.parent == old {
                record.parent = new;
            }
        }
    }

    /// `(identifier, record, former parent slot)` for every record.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, TrashRecord, EntryId)> + '_ {
        self.records
            .iter()
            .map(|(identifier, (record, parent))| (*identifier, *record, *parent))
    }
}
