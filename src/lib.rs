//! A tree of feed subscriptions with Root and Trash sections, URL and
//! identifier indexes, trash provenance, and an outline file codec.

pub mod config;
pub mod console;
pub mod feed;
pub mod model;
pub mod util;
