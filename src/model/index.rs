use std::collections::{BTreeMap, HashMap};

use url::Url;

use super::entry::EntryId;
use crate::util::normalize_url;

/// Normalized URL -> Feed entries subscribed to it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct UrlIndex {
    urls: HashMap<String, Vec<EntryId>>,
}

impl UrlIndex {
    pub(crate) fn insert(&mut self, url: &Url, entry: EntryId) {
        let key = normalize_url(url).into();
        let entries = self.urls.entry(key).or_default();
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }

    pub(crate) fn remove(&mut self, url: &Url, entry: EntryId) {
        let key: String = normalize_url(url).into();
        if let Some(entries) = self.urls.get_mut(&key) {
            entries.retain(|e| *e != entry);
            if entries.is_empty() {
                self.urls.remove(&key);
            }
        }
    }

    /// Exact key lookup; callers decide whether to normalize first.
    pub(crate) fn get(&self, key: &str) -> &[EntryId] {
        self.urls.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.urls.contains_key(key)
    }

    /// Order-insensitive view used by consistency checks.
    pub(crate) fn sorted(&self) -> BTreeMap<&str, Vec<EntryId>> {
        self.urls
            .iter()
            .map(|(url, entries)| {
                let mut entries = entries.clone();
                entries.sort();
                (url.as_str(), entries)
            })
            .collect()
    }
}

/// Identifier -> entry, for Folder and Feed entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct IdentifierRegistry {
    identifiers: BTreeMap<u64, EntryId>,
}

impl IdentifierRegistry {
    /// Picks the identifier for a new entry: the requested one if it is
    /// non-zero and free, otherwise one past the largest in use.
    ///
    /// Once `u64::MAX` is taken there is nothing past the largest, so the
    /// lowest free identifier is used instead.
    pub(crate) fn assign(&self, requested: u64) -> u64 {
        if requested != 0 && !self.identifiers.contains_key(&requested) {
            return requested;
        }

        match self.identifiers.keys().next_back() {
            None => 1,
            Some(&last) => last.checked_add(1).unwrap_or_else(|| self.lowest_free()),
        }
    }

    fn lowest_free(&self) -> u64 {
        let mut candidate = 1;
        for &used in self.identifiers.keys() {
            if used > candidate {
                break;
            }
            candidate = used.saturating_add(1);
        }
        candidate
    }

    pub(crate) fn insert(&mut self, identifier: u64, entry: EntryId) {
        self.identifiers.insert(identifier, entry);
    }

    /// Removes `identifier` only if it still belongs to `entry`.
    pub(crate) fn remove(&mut self, identifier: u64, entry: EntryId) {
        if self.identifiers.get(&identifier) == Some(&entry) {
            self.identifiers.remove(&identifier);
        }
    }

    pub(crate) fn get(&self, identifier: u64) -> Option<EntryId> {
        self.identifiers.get(&identifier).copied()
    }

    pub(crate) fn contains(&self, identifier: u64) -> bool {
        self.identifiers.contains_key(&identifier)
    }

    pub(crate) fn rekey(&mut self, old: u64, new: u64) {
        if let Some(entry) = self.identifiers.remove(&old) {
            self.identifiers.insert(new, entry);
        }
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<u64, EntryId> {
        &self.identifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_url_index_keys_are_normalized() {
        let mut index = UrlIndex::default();
        index.insert(&url("HTTP://Example.test/feed/"), EntryId(5));

        assert_eq!(index.get("http://example.test/feed"), &[EntryId(5)]);
        assert!(!index.contains("HTTP://Example.test/feed/"));
    }

    #[test]
    fn test_url_index_removes_empty_buckets() {
        let mut index = UrlIndex::default();
        let feed = url("http://example.test/feed");
        index.insert(&feed, EntryId(2));
        index.insert(&feed, EntryId(3));
        index.insert(&feed, EntryId(3));
        assert_eq!(index.get(feed.as_str()).len(), 2);

        index.remove(&feed, EntryId(2));
        assert_eq!(index.get(feed.as_str()), &[EntryId(3)]);

        index.remove(&feed, EntryId(3));
        assert!(!index.contains(feed.as_str()));
        assert!(index.sorted().is_empty());
    }

    #[test]
    fn test_assign_starts_at_one() {
        let registry = IdentifierRegistry::default();
        assert_eq!(registry.assign(0), 1);
        assert_eq!(registry.assign(42), 42);
    }

    #[test]
    fn test_assign_skips_taken_identifiers() {
        let mut registry = IdentifierRegistry::default();
        registry.insert(1, EntryId(10));
        registry.insert(7, EntryId(11));

        assert_eq!(registry.assign(0), 8);
        assert_eq!(registry.assign(7), 8);
        assert_eq!(registry.assign(3), 3);
    }

    #[test]
    fn test_assign_after_max_identifier_fills_lowest_gap() {
        let mut registry = IdentifierRegistry::default();
        registry.insert(u64::MAX, EntryId(2));
        assert_eq!(registry.assign(0), 1);

        registry.insert(1, EntryId(3));
        registry.insert(2, EntryId(4));
        registry.insert(5, EntryId(5));
        assert_eq!(registry.assign(0), 3);
        assert_eq!(registry.assign(u64::MAX), 3);
        assert_eq!(registry.assign(4), 4);
    }

    #[test]
    fn test_remove_ignores_foreign_owner() {
        let mut registry = IdentifierRegistry::default();
        registry.insert(4, EntryId(1));
        registry.remove(4, EntryId(2));
        assert_eq!(registry.get(4), Some(EntryId(1)));

        registry.rekey(4, 9);
        assert!(!registry.contains(4));
        assert_eq!(registry.get(9), Some(EntryId(1)));
    }
}
