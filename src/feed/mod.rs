//! Feed persistence and the live feed collaborator.
//!
//! - [`opml`] - outline document codec for the feeds file (load, save, import)
//! - [`live`] - read-only view onto a feed's synchronization state
//!
//! # Example
//!
//! ```
//! use feedtree::feed::{load_str, to_string};
//! use feedtree::model::FeedTree;
//! use feedtree::util::HostPolicy;
//!
//! let mut tree = FeedTree::new();
//! let content = r#"<opml version="1.0"><body>
//!     <outline text="Example" xmlUrl="https://example.test/feed"/>
//! </body></opml>"#;
//!
//! let summary = load_str(&mut tree, content, HostPolicy::AllowAll).unwrap();
//! assert_eq!(summary.feeds, 1);
//! assert!(to_string(&tree).unwrap().contains("https://example.test/feed"));
//! ```

mod live;
mod opml;

pub use live::{FeedSnapshot, LiveFeed};
pub use opml::{load, load_str, save, to_string, LoadSummary, OpmlError};
