//! Utility functions shared by the model, the codec and the CLI.
//!
//! - **URL handling**: parsing, host policy checks and normalization for the URL index
//! - **Data URIs**: base64 `data:` encoding used for inline feed icons
//! - **Atomic writes**: write-to-temp-then-rename file replacement
//!
//! # Examples
//!
//! ```
//! use feedtree::util::{parse_feed_url, encode_data_uri, HostPolicy};
//!
//! let url = parse_feed_url("https://example.test/feed/", HostPolicy::AllowAll).unwrap();
//! assert_eq!(url.as_str(), "https://example.test/feed");
//!
//! let icon = encode_data_uri("image/png", &[1, 2, 3]);
//! assert!(icon.starts_with("data:image/png;base64,"));
//! ```

mod atomic;
mod data_uri;
mod url_validator;

pub use atomic::atomic_write;
pub use data_uri::{decode_data_uri, encode_data_uri, DataUriError};
pub use url_validator::{normalize_url, parse_feed_url, HostPolicy, UrlError};
