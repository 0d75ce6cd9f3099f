//! Integration tests for the subscription tree: add, move, trash, restore, remove.
//!
//! Scenario tests walk through the public API the way a front end would.
//! The property tests at the bottom drive random operation sequences and
//! check that the identifier registry, URL index and trash ledger never
//! drift from the tree itself.

use std::collections::HashSet;

use feedtree::model::{
    Attribute, EntryAttributes, EntryId, EntryKind, FeedTree, ModelEvent, Position,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use url::Url;

fn add_folder(tree: &mut FeedTree, title: &str, parent: Option<EntryId>) -> EntryId {
    tree.add_entry(EntryKind::Folder, EntryAttributes::folder(title), parent, None)
        .unwrap()
}

fn add_feed(tree: &mut FeedTree, url: &str, parent: Option<EntryId>) -> EntryId {
    let url = Url::parse(url).unwrap();
    tree.add_entry(EntryKind::Feed, EntryAttributes::feed(url, None), parent, None)
        .unwrap()
}

// ============================================================================
// Subscription Scenarios
// ============================================================================

#[test]
fn test_organize_subscriptions_into_folders() {
    let mut tree = FeedTree::new();
    let news = add_folder(&mut tree, "News", None);
    let tech = add_folder(&mut tree, "Tech", Some(news));
    let feed = add_feed(&mut tree, "https://example.test/rss", Some(news));

    assert!(tree.move_entry(feed, tech, None));
    assert_eq!(tree.parent(feed), Some(tech));
    assert_eq!(tree.descendants(news), vec![news, tech, feed]);

    // A folder cannot move below its own subtree
    assert!(!tree.move_entry(news, tech, None));
    assert!(tree.check_consistency().is_ok());
}

#[test]
fn test_same_url_in_two_folders() {
    let mut tree = FeedTree::new();
    let a = add_folder(&mut tree, "A", None);
    let b = add_folder(&mut tree, "B", None);
    let first = add_feed(&mut tree, "https://example.test/rss", Some(a));
    let second = add_feed(&mut tree, "https://example.test/rss/", Some(b));

    let mut found = tree.get_entries("https://example.test/rss");
    found.sort();
    assert_eq!(found, vec![first, second]);

    tree.trash_entry(a);
    assert_eq!(tree.get_entries("https://example.test/rss"), vec![second]);
    assert!(tree.has_feed("https://example.test/rss"));

    tree.remove_entry(second);
    assert!(!tree.has_feed("https://example.test/rss"));

    tree.restore_entry(a);
    assert_eq!(tree.get_entries("https://example.test/rss"), vec![first]);
}

#[test]
fn test_trash_restore_returns_to_original_row() {
    let mut tree = FeedTree::new();
    let folder = add_folder(&mut tree, "Folder", None);
    let one = add_feed(&mut tree, "https://one.test/feed", Some(folder));
    let two = add_feed(&mut tree, "https://two.test/feed", Some(folder));
    let three = add_feed(&mut tree, "https://three.test/feed", Some(folder));

    tree.trash_entry(two);
    assert!(tree.is_trashed(two));
    assert!(tree.is_trash_enabled());
    assert_eq!(tree.children(folder), &[one, three]);

    tree.restore_entry(two);
    assert_eq!(tree.children(folder), &[one, two, three]);
    assert!(!tree.is_trash_enabled());
    assert!(tree.trash_record(two).is_none());
}

#[test]
fn test_empty_trash_forgets_everything_trashed() {
    let mut tree = FeedTree::new();
    let folder = add_folder(&mut tree, "Old", None);
    let feed = add_feed(&mut tree, "https://old.test/feed", Some(folder));
    let identifier = tree.entry(feed).unwrap().identifier();

    tree.trash_entry(folder);
    tree.empty_trash();

    assert!(tree.is_empty());
    assert!(!tree.contains(feed));
    assert_eq!(tree.get_entry(identifier), None);
    assert!(!tree.is_trash_enabled());
    assert!(tree.check_consistency().is_ok());
}

#[test]
fn test_identifiers_stay_unique_after_max_is_taken() {
    let mut tree = FeedTree::new();
    let top = tree
        .add_entry(
            EntryKind::Folder,
            EntryAttributes {
                identifier: u64::MAX,
                ..EntryAttributes::folder("top")
            },
            None,
            None,
        )
        .unwrap();
    let next = add_folder(&mut tree, "next", None);
    let feed = add_feed(&mut tree, "https://a.test/feed", Some(next));

    assert_eq!(tree.entry(next).unwrap().identifier(), 1);
    assert_eq!(tree.entry(feed).unwrap().identifier(), 2);
    assert_eq!(tree.get_entry(u64::MAX), Some(top));
    assert!(tree.check_consistency().is_ok());
}

#[test]
fn test_restore_after_former_parent_replaced() {
    let mut tree = FeedTree::new();
    let outer = add_folder(&mut tree, "X", None);
    let feed = add_feed(&mut tree, "https://f.test/feed", Some(outer));
    let former = add_folder(&mut tree, "B", Some(outer));

    assert!(tree.move_entry(feed, former, None));
    tree.trash_entry(feed);
    tree.remove_entry(former);
    let replacement = add_folder(&mut tree, "D", None);
    assert!(tree.check_consistency().is_ok());

    tree.restore_entry(feed);

    assert_eq!(tree.parent(feed), Some(tree.root()));
    assert!(tree.children(replacement).is_empty());
    assert!(tree.has_feed("https://f.test/feed"));
}

#[test]
fn test_position_handle_survives_reordering() {
    let mut tree = FeedTree::new();
    let a = add_feed(&mut tree, "https://a.test/feed", None);
    let b = add_feed(&mut tree, "https://b.test/feed", None);

    let handle: Position = tree.position(b).unwrap();
    assert!(tree.move_entry(b, tree.root(), Some(0)));

    assert_eq!(tree.get_entry_at(&handle), Some(b));
    assert_eq!(tree.children(tree.root()), &[b, a]);
}

#[test]
fn test_events_describe_each_change() {
    let mut tree = FeedTree::new();
    let feed = add_feed(&mut tree, "https://a.test/feed", None);
    tree.drain_events();

    assert!(tree.set_attribute(feed, Attribute::Title(Some("Renamed".into()))));
    tree.trash_entry(feed);

    let events = tree.drain_events();
    assert_eq!(
        events,
        vec![
            ModelEvent::EntryModified { entry: feed },
            ModelEvent::ModelModified,
            ModelEvent::EntryModified { entry: feed },
            ModelEvent::EntryTrashed {
                entry: feed,
                previous_parent: tree.root(),
            },
            ModelEvent::ModelModified,
        ]
    );
    assert!(tree.pending_events().is_empty());
}

// ============================================================================
// Property Tests
// ============================================================================

const URLS: [&str; 4] = [
    "https://a.test/feed",
    "https://a.test/feed/",
    "https://b.test/rss",
    "http://c.test/atom.xml",
];

#[derive(Debug, Clone)]
enum Op {
    AddFolder { parent: usize },
    AddFeed { parent: usize, url: usize },
    AddWithIdentifier { parent: usize, identifier: u64 },
    Remove(usize),
    Move { entry: usize, parent: usize, row: Option<usize> },
    Trash(usize),
    Restore(usize),
    SetUrl { entry: usize, url: usize },
    SetIdentifier { entry: usize, identifier: u64 },
    EmptyTrash,
}

/// Requested identifiers, biased towards the top of the range and towards
/// small values that collide with automatically assigned ones.
fn identifier_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(u64::MAX),
        Just(u64::MAX - 1),
        1u64..6,
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<usize>().prop_map(|parent| Op::AddFolder { parent }),
        4 => (any::<usize>(), 0..URLS.len()).prop_map(|(parent, url)| Op::AddFeed { parent, url }),
        1 => any::<usize>().prop_map(Op::Remove),
        2 => (any::<usize>(), any::<usize>(), proptest::option::of(0usize..4))
            .prop_map(|(entry, parent, row)| Op::Move { entry, parent, row }),
        2 => any::<usize>().prop_map(Op::Trash),
        2 => any::<usize>().prop_map(Op::Restore),
        2 => (any::<usize>(), identifier_strategy())
            .prop_map(|(parent, identifier)| Op::AddWithIdentifier { parent, identifier }),
        1 => (any::<usize>(), 0..URLS.len()).prop_map(|(entry, url)| Op::SetUrl { entry, url }),
        1 => (any::<usize>(), identifier_strategy())
            .prop_map(|(entry, identifier)| Op::SetIdentifier { entry, identifier }),
        1 => Just(Op::EmptyTrash),
    ]
}

/// Every entry currently in the tree, Root and Trash included.
fn all_entries(tree: &FeedTree) -> Vec<EntryId> {
    let mut entries = tree.descendants(tree.root());
    entries.extend(tree.descendants(tree.trash()));
    entries
}

fn pick(entries: &[EntryId], index: usize) -> EntryId {
    entries[index % entries.len()]
}

fn apply(tree: &mut FeedTree, op: &Op) {
    let entries = all_entries(tree);
    match *op {
        Op::AddFolder { parent } => {
            tree.add_entry(
                EntryKind::Folder,
                EntryAttributes::folder("folder"),
                Some(pick(&entries, parent)),
                None,
            );
        }
        Op::AddFeed { parent, url } => {
            let url = Url::parse(URLS[url]).unwrap();
            tree.add_entry(
                EntryKind::Feed,
                EntryAttributes::feed(url, None),
                Some(pick(&entries, parent)),
                None,
            );
        }
        Op::AddWithIdentifier { parent, identifier } => {
            let attributes = EntryAttributes {
                identifier,
                ..EntryAttributes::folder("numbered")
            };
            tree.add_entry(
                EntryKind::Folder,
                attributes,
                Some(pick(&entries, parent)),
                None,
            );
        }
        Op::Remove(entry) => tree.remove_entry(pick(&entries, entry)),
        Op::Move { entry, parent, row } => {
            tree.move_entry(pick(&entries, entry), pick(&entries, parent), row);
        }
        Op::Trash(entry) => tree.trash_entry(pick(&entries, entry)),
        Op::Restore(entry) => tree.restore_entry(pick(&entries, entry)),
        Op::SetUrl { entry, url } => {
            let url = Url::parse(URLS[url]).unwrap();
            tree.set_attribute(pick(&entries, entry), Attribute::Url(Some(url)));
        }
        Op::SetIdentifier { entry, identifier } => {
            tree.set_attribute(pick(&entries, entry), Attribute::Identifier(identifier));
        }
        Op::EmptyTrash => tree.empty_trash(),
    }
}

proptest! {
    #[test]
    fn prop_indexes_match_tree(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut tree = FeedTree::new();
        for op in &ops {
            apply(&mut tree, op);
            prop_assert_eq!(tree.check_consistency(), Ok(()));
        }
    }

    #[test]
    fn prop_identifiers_stay_unique(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut tree = FeedTree::new();
        for op in &ops {
            apply(&mut tree, op);
        }

        let items: Vec<EntryId> = all_entries(&tree)
            .into_iter()
            .filter(|id| matches!(tree.kind(*id), Some(EntryKind::Folder | EntryKind::Feed)))
            .collect();
        let identifiers: HashSet<u64> = items
            .iter()
            .map(|id| tree.entry(*id).unwrap().identifier())
            .collect();

        prop_assert_eq!(identifiers.len(), items.len());
        prop_assert!(!identifiers.contains(&0));
        for id in &items {
            let identifier = tree.entry(*id).unwrap().identifier();
            prop_assert_eq!(tree.get_entry(identifier), Some(*id));
        }
    }

    #[test]
    fn prop_url_lookup_is_exact(ops in proptest::collection::vec(op_strategy(), 1..60)) {
        let mut tree = FeedTree::new();
        for op in &ops {
            apply(&mut tree, op);
        }

        for url in URLS {
            let normalized = feedtree::util::normalize_url(&Url::parse(url).unwrap());
            let mut expected: Vec<EntryId> = tree
                .descendants(tree.root())
                .into_iter()
                .filter(|id| {
                    tree.entry(*id)
                        .and_then(|e| e.url())
                        .is_some_and(|u| feedtree::util::normalize_url(u) == normalized)
                })
                .collect();
            expected.sort();

            let mut found = tree.get_entries(url);
            found.sort();

            prop_assert_eq!(tree.has_feed(url), !expected.is_empty());
            prop_assert_eq!(found, expected);
        }
    }
}
