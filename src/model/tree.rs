use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

use super::entry::{
    Attribute, Entry, EntryAttributes, EntryBody, EntryId, EntryKind, FeedData, Icon, Position,
};
use super::event::ModelEvent;
use super::index::{IdentifierRegistry, UrlIndex};
use super::trash::{TrashLedger, TrashRecord};
use crate::feed::LiveFeed;
use crate::util::normalize_url;

/// Placeholder shown for folders without a title.
pub const UNTITLED: &str = "(Untitled)";

/// Disagreement between the incrementally maintained indexes and the tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("URL index does not match the feeds reachable from root")]
    UrlIndex,

    #[error("Identifier registry does not match the entries in the tree")]
    Identifiers,

    #[error("Trash ledger references {0}, which is not directly under trash")]
    Ledger(u64),

    #[error("Trash record of {0} names a former parent that no longer exists")]
    LedgerParent(u64),

    #[error("Entry {0} is not linked to its parent")]
    Link(EntryId),

    #[error("Feed entry {0} has children")]
    FeedWithChildren(EntryId),
}

/// The subscription tree: a Root subtree of live entries and a Trash
/// subtree of soft-deleted ones, plus the indexes derived from them.
///
/// All mutation goes through methods on this type, which keep the URL
/// index, the identifier registry and the trash ledger in step with the
/// tree before returning. Change notifications are queued as
/// [`ModelEvent`]s; see [`FeedTree::drain_events`].
///
/// The URL index covers the feeds reachable from Root. Trashed feeds are
/// taken out of it so they do not count as subscribed.
#[derive(Debug)]
pub struct FeedTree {
    entries: HashMap<EntryId, Entry>,
    next_slot: u64,
    root: EntryId,
    trash: EntryId,
    urls: UrlIndex,
    identifiers: IdentifierRegistry,
    ledger: TrashLedger,
    events: Vec<ModelEvent>,
}

impl Default for FeedTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedTree {
    /// Creates a tree holding only Root and an empty, disabled Trash.
    pub fn new() -> Self {
        let root = EntryId(0);
        let trash = EntryId(1);

        let mut entries = HashMap::new();
        entries.insert(root, Entry::new(EntryBody::Root, 0));
        entries.insert(trash, Entry::new(EntryBody::Trash { enabled: false }, 0));

        Self {
            entries,
            next_slot: 2,
            root,
            trash,
            urls: UrlIndex::default(),
            identifiers: IdentifierRegistry::default(),
            ledger: TrashLedger::default(),
            events: Vec::new(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn root(&self) -> EntryId {
        self.root
    }

    pub fn trash(&self) -> EntryId {
        self.trash
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn kind(&self, id: EntryId) -> Option<EntryKind> {
        self.entry(id).map(Entry::kind)
    }

    /// Number of Folder and Feed entries, live or trashed.
    pub fn len(&self) -> usize {
        self.entries.len() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: EntryId) -> &[EntryId] {
        self.entry(id).map(Entry::children).unwrap_or(&[])
    }

    pub fn parent(&self, id: EntryId) -> Option<EntryId> {
        self.entry(id).and_then(Entry::parent)
    }

    /// Index of the entry among its siblings. Root is row 0 and Trash row 1.
    pub fn row(&self, id: EntryId) -> Option<usize> {
        if id == self.root {
            return Some(0);
        }
        if id == self.trash {
            return Some(1);
        }
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    /// A position handle for the entry, suitable for [`FeedTree::get_entry_at`].
    pub fn position(&self, id: EntryId) -> Option<Position> {
        let entry = self.entry(id)?;
        Some(Position {
            parent: entry.parent,
            row: self.row(id)?,
            identifier: entry.identifier,
        })
    }

    /// True if Trash is an ancestor, looking no further up than Root.
    pub fn is_trashed(&self, id: EntryId) -> bool {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if parent == self.trash {
                return true;
            }
            if parent == self.root {
                return false;
            }
            current = self.parent(parent);
        }
        false
    }

    /// True if `ancestor` lies strictly above `child`.
    pub fn is_ancestor_of(&self, ancestor: EntryId, child: EntryId) -> bool {
        if ancestor == child {
            return false;
        }
        let mut current = self.parent(child);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Trash is enabled while it holds anything.
    pub fn is_trash_enabled(&self) -> bool {
        matches!(
            self.entry(self.trash).map(|e| &e.body),
            Some(EntryBody::Trash { enabled: true })
        )
    }

    /// The entry and everything below it, parents before children.
    pub fn descendants(&self, id: EntryId) -> Vec<EntryId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(entry) = self.entry(current) {
                out.push(current);
                stack.extend(entry.children.iter().rev().copied());
            }
        }
        out
    }

    /// Looks an entry up by identifier. Identifier 0 is Root.
    pub fn get_entry(&self, identifier: u64) -> Option<EntryId> {
        if identifier == 0 {
            return Some(self.root);
        }
        self.identifiers.get(identifier)
    }

    /// Resolves a position handle, falling back to its identifier when the
    /// position no longer holds the entry the handle was taken from.
    pub fn get_entry_at(&self, position: &Position) -> Option<EntryId> {
        let direct = match position.parent {
            None => match position.row {
                0 => Some(self.root),
                1 => Some(self.trash),
                _ => None,
            },
            Some(parent) => self.children(parent).get(position.row).copied(),
        };

        match direct {
            Some(id)
                if position.identifier == 0
                    || self.entry(id).map(Entry::identifier) == Some(position.identifier) =>
            {
                Some(id)
            }
            _ => self.get_entry(position.identifier),
        }
    }

    /// Feed entries subscribed to `url`, looked up both as given and normalized.
    pub fn get_entries(&self, url: &str) -> Vec<EntryId> {
        let mut found = self.urls.get(url).to_vec();

        if let Some(normalized) = normalized_key(url) {
            if normalized != url {
                for id in self.urls.get(&normalized) {
                    if !found.contains(id) {
                        found.push(*id);
                    }
                }
            }
        }

        found
    }

    /// True if a live feed is subscribed to `url`, as given or normalized.
    pub fn has_feed(&self, url: &str) -> bool {
        self.urls.contains(url) || normalized_key(url).is_some_and(|key| self.urls.contains(&key))
    }

    pub fn trash_record(&self, id: EntryId) -> Option<TrashRecord> {
        self.entry(id).and_then(|e| self.ledger.get(e.identifier))
    }

    // ========================================================================
    // Display data
    // ========================================================================

    /// Title as a presentation layer would show it.
    ///
    /// Feeds prefer the live feed's own title, then the stored title, then
    /// the URL.
    pub fn display_title(&self, id: EntryId) -> Option<String> {
        let entry = self.entry(id)?;
        let stored = entry.title.as_deref().filter(|t| !t.is_empty());

        let title = match &entry.body {
            EntryBody::Root => "Feeds".to_owned(),
            EntryBody::Trash { .. } => "Trash".to_owned(),
            EntryBody::Folder => stored.unwrap_or(UNTITLED).to_owned(),
            EntryBody::Feed(feed) => feed
                .live
                .as_ref()
                .and_then(|live| live.title())
                .filter(|t| !t.is_empty())
                .or_else(|| stored.map(str::to_owned))
                .or_else(|| feed.url.as_ref().map(|u| u.to_string()))
                .unwrap_or_else(|| UNTITLED.to_owned()),
        };

        Some(title)
    }

    /// The live feed's icon, else the stored one.
    pub fn icon(&self, id: EntryId) -> Option<Icon> {
        let feed = self.entry(id)?.feed()?;
        feed.live
            .as_ref()
            .and_then(|live| live.icon())
            .or_else(|| feed.icon.clone())
    }

    pub fn last_update_time(&self, id: EntryId) -> Option<DateTime<Utc>> {
        self.live_feed(id)?.last_update_time()
    }

    pub fn last_synchronization_time(&self, id: EntryId) -> Option<DateTime<Utc>> {
        self.live_feed(id)?.last_synchronization_time()
    }

    fn live_feed(&self, id: EntryId) -> Option<&Arc<dyn LiveFeed>> {
        self.entry(id)?.feed()?.live.as_ref()
    }

    /// Connects a Feed entry to the object that fetches it.
    pub fn attach_live_feed(&mut self, id: EntryId, live: Arc<dyn LiveFeed>) -> bool {
        match self.entries.get_mut(&id).and_then(Entry::feed_mut) {
            Some(feed) => {
                feed.live = Some(live);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Takes every queued event, oldest first.
    pub fn drain_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_events(&self) -> &[ModelEvent] {
        &self.events
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Adds a Folder or Feed entry under `parent` (Root when `None`) at
    /// `row` (appended when `None` or past the end).
    ///
    /// Returns `None` for Root/Trash kinds and for parents that are missing
    /// or are Feeds.
    pub fn add_entry(
        &mut self,
        kind: EntryKind,
        attributes: EntryAttributes,
        parent: Option<EntryId>,
        row: Option<usize>,
    ) -> Option<EntryId> {
        let parent = parent.unwrap_or(self.root);

        let body = match kind {
            EntryKind::Folder => EntryBody::Folder,
            EntryKind::Feed => EntryBody::Feed(FeedData {
                url: attributes.url,
                icon: attributes.icon,
                update_interval: attributes.update_interval,
                live: None,
            }),
            EntryKind::Root | EntryKind::Trash => {
                tracing::warn!(?kind, "Refusing to add a singleton entry kind");
                return None;
            }
        };

        if !self.kind(parent).is_some_and(EntryKind::can_hold_children) {
            tracing::warn!(%parent, "Refusing to add entry under a missing or feed parent");
            return None;
        }

        let identifier = self.identifiers.assign(attributes.identifier);
        let mut entry = Entry::new(body, identifier);
        entry.title = attributes.title;
        entry.description = attributes.description;

        let id = EntryId(self.next_slot);
        self.next_slot += 1;
        self.entries.insert(id, entry);
        self.identifiers.insert(identifier, id);
        self.attach(id, parent, row);

        if !self.is_trashed(id) {
            self.register_urls(id);
        }
        self.refresh_trash_state();

        tracing::debug!(%id, identifier, ?kind, %parent, "Added entry");
        self.events.push(ModelEvent::EntryAdded { entry: id });
        self.events.push(ModelEvent::ModelModified);

        Some(id)
    }

    /// Destroys an entry and its subtree. No-op for unknown ids, Root and Trash.
    pub fn remove_entry(&mut self, id: EntryId) {
        if id == self.root || id == self.trash || !self.contains(id) {
            return;
        }

        let identifier = self.entries[&id].identifier;
        let Some((parent, _)) = self.detach(id) else {
            return;
        };

        self.events.push(ModelEvent::EntryRemoved {
            entry: id,
            identifier,
            parent,
        });

        let destroyed = self.destroy_subtree(id);
        self.refresh_trash_state();

        tracing::debug!(%id, identifier, destroyed, "Removed entry");
        self.events.push(ModelEvent::ModelModified);
    }

    /// Moves an entry to `row` under `new_parent` (appended when `None`).
    ///
    /// When moving later within the same parent, `row` counts positions
    /// before the entry is taken out, so the target is decremented by one.
    /// Fails without touching the tree if either entry is missing, the entry
    /// is Root or Trash, the new parent cannot hold children, the move would
    /// create a cycle, or the entry would end up where it already is.
    pub fn move_entry(&mut self, id: EntryId, new_parent: EntryId, row: Option<usize>) -> bool {
        if id == new_parent
            || !matches!(self.kind(id), Some(EntryKind::Folder | EntryKind::Feed))
            || !self.kind(new_parent).is_some_and(EntryKind::can_hold_children)
            || self.is_ancestor_of(id, new_parent)
        {
            return false;
        }

        let (Some(previous_parent), Some(previous_row)) = (self.parent(id), self.row(id)) else {
            return false;
        };

        let target = match row {
            Some(row) if previous_parent == new_parent && previous_row < row => Some(row - 1),
            other => other,
        };

        if previous_parent == new_parent {
            let last = self.children(new_parent).len() - 1;
            let landing = target.map_or(last, |t| t.min(last));
            if landing == previous_row {
                return false;
            }
        }

        let was_trashed = self.is_trashed(id);
        self.detach(id);
        self.attach(id, new_parent, target);
        let now_trashed = self.is_trashed(id);

        match (was_trashed, now_trashed) {
            (false, true) => self.unregister_urls(id),
            (true, false) => self.register_urls(id),
            _ => {}
        }

        // A manual move replaces whatever provenance a trash operation recorded.
        let identifier = self.entries[&id].identifier;
        self.ledger.take(identifier);
        self.refresh_trash_state();

        tracing::debug!(%id, %previous_parent, previous_row, %new_parent, "Moved entry");
        self.events.push(ModelEvent::EntryMoved {
            entry: id,
            previous_parent,
            previous_row,
        });
        self.events.push(ModelEvent::ModelModified);

        true
    }

    /// Moves a live Folder or Feed to the end of Trash, remembering where it
    /// came from. No-op for Root, Trash and entries already in the trash.
    pub fn trash_entry(&mut self, id: EntryId) {
        if !matches!(self.kind(id), Some(EntryKind::Folder | EntryKind::Feed)) || self.is_trashed(id)
        {
            return;
        }

        let (Some(previous_parent), Some(row)) = (self.parent(id), self.row(id)) else {
            return;
        };

        let identifier = self.entries[&id].identifier;
        let parent_identifier = self.entries[&previous_parent].identifier;
        self.ledger.record(
            identifier,
            TrashRecord {
                parent: parent_identifier,
                row,
            },
            previous_parent,
        );

        self.unregister_urls(id);
        self.detach(id);
        self.attach(id, self.trash, None);
        self.refresh_trash_state();

        tracing::debug!(%id, identifier, %previous_parent, row, "Trashed entry");
        self.events.push(ModelEvent::EntryModified { entry: id });
        self.events.push(ModelEvent::EntryTrashed {
            entry: id,
            previous_parent,
        });
        self.events.push(ModelEvent::ModelModified);
    }

    /// Brings a trashed entry back to its former parent and row.
    ///
    /// Falls back to appending under Root when there is no trash record, or
    /// when the former parent is gone, is not a Folder, or is itself trashed.
    pub fn restore_entry(&mut self, id: EntryId) {
        if !matches!(self.kind(id), Some(EntryKind::Folder | EntryKind::Feed))
            || !self.is_trashed(id)
        {
            return;
        }

        let identifier = self.entries[&id].identifier;
        let record = self.ledger.take(identifier);

        let parent = record
            .and_then(|r| self.get_entry(r.parent))
            .filter(|p| self.kind(*p) == Some(EntryKind::Folder) && !self.is_trashed(*p))
            .unwrap_or(self.root);

        self.detach(id);
        self.attach(id, parent, record.map(|r| r.row));
        self.register_urls(id);
        self.refresh_trash_state();

        tracing::debug!(%id, identifier, %parent, "Restored entry");
        self.events.push(ModelEvent::EntryModified { entry: id });
        self.events.push(ModelEvent::EntryRestored { entry: id });
        self.events.push(ModelEvent::ModelModified);
    }

    /// Destroys everything under Trash and forgets all trash records.
    pub fn empty_trash(&mut self) {
        let trashed = std::mem::take(&mut self.entry_mut(self.trash).children);

        let mut destroyed = 0;
        for id in trashed {
            destroyed += self.destroy_subtree(id);
        }

        self.ledger.clear();
        self.refresh_trash_state();

        tracing::debug!(destroyed, "Emptied trash");
        self.events.push(ModelEvent::ModelModified);
    }

    /// Writes one attribute. Returns `false` when the attribute does not
    /// apply to the entry's kind or an identifier change would collide.
    ///
    /// Title, description, URL and identifier changes queue
    /// `EntryModified` + `ModelModified`; the others are silent.
    pub fn set_attribute(&mut self, id: EntryId, attribute: Attribute) -> bool {
        let Some(kind) = self.kind(id) else {
            return false;
        };
        let is_item = matches!(kind, EntryKind::Folder | EntryKind::Feed);
        let significant = attribute.is_significant();

        match attribute {
            Attribute::Title(title) => {
                if !is_item {
                    return false;
                }
                self.entry_mut(id).title = title;
            }
            Attribute::Description(description) => {
                self.entry_mut(id).description = description;
            }
            Attribute::Url(url) => {
                if kind != EntryKind::Feed {
                    return false;
                }
                let old = self.entries[&id].url().cloned();
                if old != url && !self.is_trashed(id) {
                    if let Some(old) = &old {
                        self.urls.remove(old, id);
                    }
                    if let Some(new) = &url {
                        self.urls.insert(new, id);
                    }
                }
                if let Some(feed) = self.entry_mut(id).feed_mut() {
                    feed.url = url;
                }
            }
            Attribute::Identifier(identifier) => {
                if !is_item {
                    return false;
                }
                let current = self.entries[&id].identifier;
                if identifier != current {
                    if identifier == 0 || self.identifiers.contains(identifier) {
                        return false;
                    }
                    self.identifiers.rekey(current, identifier);
                    self.ledger.rekey(current, identifier);
                    self.entry_mut(id).identifier = identifier;
                }
            }
            Attribute::Icon(icon) => match self.entry_mut(id).feed_mut() {
                Some(feed) => feed.icon = icon,
                None => return false,
            },
            Attribute::UpdateInterval(interval) => match self.entry_mut(id).feed_mut() {
                Some(feed) => feed.update_interval = interval,
                None => return false,
            },
            Attribute::Expanded(expanded) => {
                self.entry_mut(id).expanded = expanded;
            }
        }

        if significant {
            self.events.push(ModelEvent::EntryModified { entry: id });
            self.events.push(ModelEvent::ModelModified);
        }

        true
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Rebuilds every derived index from the tree and compares it with the
    /// incrementally maintained one.
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        for (id, entry) in &self.entries {
            if entry.kind() == EntryKind::Feed && !entry.children.is_empty() {
                return Err(ConsistencyError::FeedWithChildren(*id));
            }
            if let Some(parent) = entry.parent {
                if !self.children(parent).contains(id) {
                    return Err(ConsistencyError::Link(*id));
                }
            } else if *id != self.root && *id != self.trash {
                return Err(ConsistencyError::Link(*id));
            }
            for child in &entry.children {
                if self.parent(*child) != Some(*id) {
                    return Err(ConsistencyError::Link(*child));
                }
            }
        }

        let mut urls = UrlIndex::default();
        for id in self.descendants(self.root) {
            if let Some(url) = self.entries[&id].url() {
                urls.insert(url, id);
            }
        }
        if urls.sorted() != self.urls.sorted() {
            return Err(ConsistencyError::UrlIndex);
        }

        let expected: BTreeMap<u64, EntryId> = self
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.kind(), EntryKind::Folder | EntryKind::Feed))
            .map(|(id, e)| (e.identifier, *id))
            .collect();
        if expected.len() != self.len()
            || expected.contains_key(&0)
            || &expected != self.identifiers.as_map()
        {
            return Err(ConsistencyError::Identifiers);
        }

        for (identifier, record, parent) in self.ledger.iter() {
            let in_trash = self
                .identifiers
                .get(identifier)
                .is_some_and(|id| self.parent(id) == Some(self.trash));
            if !in_trash {
                return Err(ConsistencyError::Ledger(identifier));
            }
            if self.get_entry(record.parent) != Some(parent) {
                return Err(ConsistencyError::LedgerParent(identifier));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        self.entries
            .get_mut(&id)
            .expect("callers check that the entry exists")
    }

    /// Unlinks an entry from its parent, returning the old parent and row.
    fn detach(&mut self, id: EntryId) -> Option<(EntryId, usize)> {
        let parent = self.entries.get_mut(&id)?.parent.take()?;
        let siblings = &mut self.entry_mut(parent).children;
        let row = siblings.iter().position(|c| *c == id)?;
        siblings.remove(row);
        Some((parent, row))
    }

    /// Links an entry under `parent` at `row`, clamped to the sibling count.
    fn attach(&mut self, id: EntryId, parent: EntryId, row: Option<usize>) {
        let siblings = &mut self.entry_mut(parent).children;
        let row = row.map_or(siblings.len(), |r| r.min(siblings.len()));
        siblings.insert(row, id);
        self.entry_mut(id).parent = Some(parent);
    }

    /// Drops an already detached subtree along with its index entries.
    fn destroy_subtree(&mut self, id: EntryId) -> usize {
        let doomed = self.descendants(id);
        for current in &doomed {
            if let Some(entry) = self.entries.remove(current) {
                if let Some(url) = entry.url() {
                    self.urls.remove(url, *current);
                }
                self.identifiers.remove(entry.identifier, *current);
                self.ledger.take(entry.identifier);
                self.ledger.forget_parent(entry.identifier);
            }
        }
        doomed.len()
    }

    fn register_urls(&mut self, id: EntryId) {
        for current in self.descendants(id) {
            if let Some(url) = self.entries[&current].url() {
                self.urls.insert(url, current);
            }
        }
    }

    fn unregister_urls(&mut self, id: EntryId) {
        for current in self.descendants(id) {
            if let Some(url) = self.entries[&current].url() {
                self.urls.remove(url, current);
            }
        }
    }

    fn refresh_trash_state(&mut self) {
        let trash = self.entry_mut(self.trash);
        let has_children = !trash.children.is_empty();
        if let EntryBody::Trash { enabled } = &mut trash.body {
            *enabled = has_children;
        }
    }
}

fn normalized_key(url: &str) -> Option<String> {
    Url::parse(url).ok().map(|u| normalize_url(&u).into())
}
