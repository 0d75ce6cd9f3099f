use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::console::{Console, MessageCategory, MessageLevel};
use crate::model::{EntryAttributes, EntryId, EntryKind, FeedTree, Icon};
use crate::util::{atomic_write, parse_feed_url, HostPolicy};

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// The only document version the loader accepts and the writer produces.
const OPML_VERSION: &str = "1.0";

/// Errors that can occur while loading or saving a feeds file.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing failed.
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// The document has no root element at all.
    #[error("Feeds file is empty")]
    EmptyDocument,

    /// The root element is not `<opml version="1.0">`.
    #[error("Unsupported feeds file: root <{root}> with version {version:?}")]
    UnsupportedDocument {
        root: String,
        version: Option<String>,
    },

    /// Writing is disabled for this store.
    #[error("Feeds file is read-only")]
    ReadOnly,

    /// Serializing the tree failed.
    #[error("Failed to serialize feeds: {0}")]
    Serialize(String),

    /// File I/O error.
    #[error("Feeds file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn xml_error(e: impl std::fmt::Display) -> OpmlError {
    OpmlError::XmlParse(e.to_string())
}

fn write_error(e: impl std::fmt::Display) -> OpmlError {
    OpmlError::Serialize(e.to_string())
}

/// What a load added to the tree.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub folders: usize,
    pub feeds: usize,
    /// Feed outlines dropped because their `xmlUrl` did not validate.
    pub skipped: usize,
}

/// Loads the feeds file at `path` into `tree` under Root.
///
/// A missing file is not an error: the tree simply stays empty. Any other
/// failure is reported to `console` and returned; entries parsed before the
/// failure stay in the tree.
///
/// # Errors
///
/// Returns [`OpmlError`] if the file cannot be read, is not well-formed XML,
/// is not an `<opml version="1.0">` document, or nests outlines deeper than
/// the safety limit.
pub fn load(
    tree: &mut FeedTree,
    path: &Path,
    policy: HostPolicy,
    console: &dyn Console,
) -> Result<LoadSummary, OpmlError> {
    let source = path.display().to_string();

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %source, "No feeds file found, starting empty");
            return Ok(LoadSummary::default());
        }
        Err(e) => {
            console.add_message(
                &format!("Failed to open feeds file: {}", e),
                MessageCategory::Other,
                MessageLevel::Error,
                &source,
            );
            return Err(OpmlError::Io(e));
        }
    };

    match load_str(tree, &content, policy) {
        Ok(summary) => {
            tracing::info!(
                path = %source,
                folders = summary.folders,
                feeds = summary.feeds,
                skipped = summary.skipped,
                "Loaded feeds file"
            );
            Ok(summary)
        }
        Err(e) => {
            console.add_message(
                &format!("Failed to load feeds file: {}", e),
                MessageCategory::Other,
                MessageLevel::Error,
                &source,
            );
            Err(e)
        }
    }
}

/// Parses an outline document and appends its entries under Root.
///
/// `<head>` is ignored and `<body>` is descended into. An outline with an
/// `xmlUrl` attribute becomes a Feed; any other outline becomes a Folder
/// whose nested outlines are read recursively. Feeds whose URL fails to
/// validate are skipped with a warning and do not abort the load.
pub fn load_str(
    tree: &mut FeedTree,
    content: &str,
    policy: HostPolicy,
) -> Result<LoadSummary, OpmlError> {
    // SEC-002: XXE protection. quick-xml (0.37) never parses <!ENTITY> declarations from
    // DOCTYPE; `decode_and_unescape_value()` only resolves the 5 XML builtins and rejects
    // anything else with `EscapeError::UnrecognizedEntity`.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut loader = Loader {
        tree,
        policy,
        summary: LoadSummary::default(),
    };

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                check_root(&e, &reader)?;
                let root = loader.tree.root();
                loader.read_children(&mut reader, root, 0, true)?;
                return Ok(loader.summary);
            }
            Event::Empty(e) => {
                check_root(&e, &reader)?;
                return Ok(loader.summary);
            }
            Event::Eof => return Err(OpmlError::EmptyDocument),
            Event::Text(_) | Event::End(_) => {
                return Err(OpmlError::XmlParse(
                    "content before the root element".to_owned(),
                ))
            }
            _ => {}
        }
    }
}

fn check_root(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<(), OpmlError> {
    let root = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let version = e
        .try_get_attribute("version")
        .map_err(xml_error)?
        .map(|attr| attr.decode_and_unescape_value(reader.decoder()))
        .transpose()
        .map_err(xml_error)?
        .map(|v| v.into_owned());

    if root != "opml" || version.as_deref() != Some(OPML_VERSION) {
        return Err(OpmlError::UnsupportedDocument { root, version });
    }
    Ok(())
}

struct Loader<'t> {
    tree: &'t mut FeedTree,
    policy: HostPolicy,
    summary: LoadSummary,
}

/// Attributes of one `<outline>` element.
#[derive(Debug, Default)]
struct Outline {
    title: Option<String>,
    text: Option<String>,
    xml_url: Option<String>,
    icon: Option<String>,
    update_interval: Option<String>,
    identifier: Option<String>,
    description: Option<String>,
}

impl Loader<'_> {
    /// Reads elements until the end tag of the enclosing element.
    ///
    /// `in_opml` is true only directly inside `<opml>`, the one level where
    /// `<body>` is descended into rather than skipped.
    fn read_children(
        &mut self,
        reader: &mut Reader<&[u8]>,
        parent: EntryId,
        depth: usize,
        in_opml: bool,
    ) -> Result<(), OpmlError> {
        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) if e.name().as_ref() == b"outline" => {
                    let depth = depth + 1;
                    // SEC-003: Reject excessively nested OPMLs
                    if depth > MAX_OPML_DEPTH {
                        return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                    }
                    let outline = parse_outline(&e, reader)?;
                    match self.add_outline(outline, parent) {
                        Some(folder) if self.tree.kind(folder) == Some(EntryKind::Folder) => {
                            self.read_children(reader, folder, depth, false)?;
                        }
                        _ => {
                            // Feeds are leaves; anything nested in them is ignored.
                            reader.read_to_end(e.name()).map_err(xml_error)?;
                        }
                    }
                }
                Event::Empty(e) if e.name().as_ref() == b"outline" => {
                    let outline = parse_outline(&e, reader)?;
                    self.add_outline(outline, parent);
                }
                Event::Start(e) if in_opml && e.name().as_ref() == b"body" => {
                    self.read_children(reader, parent, depth, false)?;
                }
                Event::Start(e) => {
                    reader.read_to_end(e.name()).map_err(xml_error)?;
                }
                Event::End(_) => return Ok(()),
                Event::Eof => {
                    return Err(OpmlError::XmlParse(
                        "unexpected end of document".to_owned(),
                    ))
                }
                _ => {}
            }
        }
    }

    /// Turns an outline into a Folder or Feed under `parent`.
    fn add_outline(&mut self, outline: Outline, parent: EntryId) -> Option<EntryId> {
        let title = outline
            .title
            .or(outline.text)
            .filter(|t| !t.is_empty());
        let identifier = outline
            .identifier
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let description = outline.description.filter(|d| !d.is_empty());

        let Some(raw_url) = outline.xml_url else {
            let attributes = EntryAttributes {
                identifier,
                title,
                description,
                ..EntryAttributes::default()
            };
            let folder = self
                .tree
                .add_entry(EntryKind::Folder, attributes, Some(parent), None)?;
            self.summary.folders += 1;
            return Some(folder);
        };

        let url = match parse_feed_url(&raw_url, self.policy) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(url = %raw_url, error = %e, "Skipping invalid feed URL");
                self.summary.skipped += 1;
                return None;
            }
        };

        let icon = outline
            .icon
            .filter(|v| !v.is_empty())
            .and_then(|uri| match Icon::from_data_uri(&uri) {
                Ok(icon) => Some(icon),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Ignoring invalid feed icon");
                    None
                }
            });
        let update_interval = outline
            .update_interval
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|minutes| *minutes > 0);

        let attributes = EntryAttributes {
            identifier,
            title,
            description,
            url: Some(url),
            icon,
            update_interval,
        };
        let feed = self
            .tree
            .add_entry(EntryKind::Feed, attributes, Some(parent), None)?;
        self.summary.feeds += 1;
        Some(feed)
    }
}

/// Extracts the attributes the loader cares about from an outline element.
fn parse_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Outline, OpmlError> {
    let mut outline = Outline::default();
    let decoder = reader.decoder();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let slot = match attr.key.as_ref() {
            b"title" => &mut outline.title,
            b"text" => &mut outline.text,
            b"xmlUrl" => &mut outline.xml_url,
            b"icon" => &mut outline.icon,
            b"updateInterval" => &mut outline.update_interval,
            b"identifier" => &mut outline.identifier,
            b"description" => &mut outline.description,
            _ => continue,
        };
        *slot = Some(
            attr.decode_and_unescape_value(decoder)
                .map_err(xml_error)?
                .into_owned(),
        );
    }

    Ok(outline)
}

/// Serializes Root's subtree as an `<opml version="1.0">` document.
///
/// The Trash subtree is never written. Each entry maps onto exactly the
/// attributes [`load_str`] reads back: `text`/`title`, `xmlUrl`, `icon` as a
/// data URI, `updateInterval`, `identifier` and `description`. Feeds without
/// a URL cannot be represented and are left out.
pub fn to_string(tree: &FeedTree) -> Result<String, OpmlError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_error)?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", OPML_VERSION));
    writer.write_event(Event::Start(opml)).map_err(write_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .map_err(write_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("title")))
        .map_err(write_error)?;
    writer
        .write_event(Event::Text(BytesText::new("Feeds")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("title")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .map_err(write_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .map_err(write_error)?;
    for child in tree.children(tree.root()) {
        write_entry(&mut writer, tree, *child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .map_err(write_error)?;

    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .map_err(write_error)?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(write_error)
}

fn write_entry(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    tree: &FeedTree,
    id: EntryId,
) -> Result<(), OpmlError> {
    let Some(entry) = tree.entry(id) else {
        return Ok(());
    };

    let mut outline = BytesStart::new("outline");
    if let Some(title) = entry.title() {
        outline.push_attribute(("text", title));
        outline.push_attribute(("title", title));
    }

    match entry.kind() {
        EntryKind::Folder => {
            push_common(&mut outline, entry.identifier(), entry.description());

            if entry.children().is_empty() {
                writer.write_event(Event::Empty(outline)).map_err(write_error)?;
            } else {
                writer.write_event(Event::Start(outline)).map_err(write_error)?;
                for child in entry.children() {
                    write_entry(writer, tree, *child)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new("outline")))
                    .map_err(write_error)?;
            }
        }
        EntryKind::Feed => {
            let Some(feed) = entry.feed() else {
                return Ok(());
            };
            let Some(url) = feed.url() else {
                tracing::warn!(identifier = entry.identifier(), "Not saving feed without a URL");
                return Ok(());
            };

            outline.push_attribute(("type", "rss"));
            outline.push_attribute(("xmlUrl", url.as_str()));
            if let Some(icon) = feed.icon() {
                outline.push_attribute(("icon", icon.to_data_uri().as_str()));
            }
            if let Some(interval) = feed.update_interval() {
                outline.push_attribute(("updateInterval", interval.to_string().as_str()));
            }
            push_common(&mut outline, entry.identifier(), entry.description());

            writer.write_event(Event::Empty(outline)).map_err(write_error)?;
        }
        EntryKind::Root | EntryKind::Trash => {}
    }

    Ok(())
}

fn push_common(outline: &mut BytesStart<'_>, identifier: u64, description: Option<&str>) {
    outline.push_attribute(("identifier", identifier.to_string().as_str()));
    if let Some(description) = description {
        outline.push_attribute(("description", description));
    }
}

/// Writes the tree to `path` atomically.
///
/// Nothing is written when `read_only` is set. The document goes to a
/// temporary sibling file first, so the destination is either the old file
/// or the complete new one.
pub fn save(tree: &FeedTree, path: &Path, read_only: bool) -> Result<(), OpmlError> {
    if read_only {
        tracing::warn!(path = %path.display(), "Refusing to save feeds in read-only mode");
        return Err(OpmlError::ReadOnly);
    }

    let content = to_string(tree)?;
    atomic_write(path, content.as_bytes())?;

    tracing::info!(path = %path.display(), entries = tree.len(), "Saved feeds file");
    Ok(())
}
