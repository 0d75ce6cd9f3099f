use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use feedtree::config::Config;
use feedtree::console::TracingConsole;
use feedtree::feed::{self, LoadSummary};
use feedtree::model::{EntryAttributes, EntryId, EntryKind, FeedTree, ModelEvent};
use feedtree::util::{atomic_write, parse_feed_url, HostPolicy};

/// Get the config directory path (~/.config/feedtree/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home).join(".config").join("feedtree");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(name = "feedtree", about = "Manage a tree of feed subscriptions")]
struct Args {
    /// Feeds file to use instead of the configured one
    #[arg(long, value_name = "FILE", global = true)]
    feeds: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the subscription tree
    List,

    /// Create a folder
    AddFolder {
        title: String,
        /// Identifier of the parent folder (Root when omitted)
        #[arg(long, value_name = "ID")]
        parent: Option<u64>,
    },

    /// Subscribe to a feed URL
    AddFeed {
        url: String,
        #[arg(long)]
        title: Option<String>,
        /// Identifier of the parent folder (Root when omitted)
        #[arg(long, value_name = "ID")]
        parent: Option<u64>,
        /// Refresh interval in minutes
        #[arg(long, value_name = "MINUTES")]
        interval: Option<u32>,
    },

    /// Move an entry to another folder
    Move {
        id: u64,
        /// Identifier of the new parent folder (Root when omitted)
        #[arg(long, value_name = "ID")]
        parent: Option<u64>,
        /// Row within the new parent (appended when omitted)
        #[arg(long)]
        row: Option<usize>,
    },

    /// Delete an entry and everything below it
    Remove { id: u64 },

    /// Check whether a URL is subscribed
    Has { url: String },

    /// Append the outlines of another OPML file under Root
    Import { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Set up config directory
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config = Config::load(&config_dir.join("config.toml")).context("Failed to load config")?;
    let policy = config.host_policy();
    let feeds_path = args
        .feeds
        .clone()
        .unwrap_or_else(|| config.feeds_path(&config_dir));

    let (mut tree, summary) = load_tree(feeds_path.clone(), policy)
        .await
        .with_context(|| format!("Failed to load feeds from {}", feeds_path.display()))?;
    tracing::debug!(feeds = summary.feeds, folders = summary.folders, "Feeds loaded");
    // Loading queues an event per entry; only changes made below matter.
    tree.drain_events();

    match args.command {
        Command::List => {
            print_tree(&tree);
            return Ok(());
        }
        Command::Has { url } => {
            if tree.has_feed(&url) {
                for id in tree.get_entries(&url) {
                    if let Some(entry) = tree.entry(id) {
                        let title = tree.display_title(id).unwrap_or_default();
                        println!("#{} {}", entry.identifier(), title);
                    }
                }
            } else {
                println!("Not subscribed: {}", url);
                std::process::exit(1);
            }
            return Ok(());
        }
        Command::AddFolder { title, parent } => {
            let parent = resolve_parent(&tree, parent)?;
            let id = tree
                .add_entry(EntryKind::Folder, EntryAttributes::folder(title), Some(parent), None)
                .context("Cannot add a folder there")?;
            println!("Added folder #{}", identifier_of(&tree, id));
        }
        Command::AddFeed {
            url,
            title,
            parent,
            interval,
        } => {
            let url = parse_feed_url(&url, policy).context("Invalid feed URL")?;
            if tree.has_feed(url.as_str()) {
                eprintln!("Warning: already subscribed to {}", url);
            }
            let parent = resolve_parent(&tree, parent)?;
            let attributes = EntryAttributes {
                update_interval: interval.filter(|m| *m > 0),
                ..EntryAttributes::feed(url, title)
            };
            let id = tree
                .add_entry(EntryKind::Feed, attributes, Some(parent), None)
                .context("Cannot add a feed there")?;
            println!("Added feed #{}", identifier_of(&tree, id));
        }
        Command::Move { id, parent, row } => {
            let entry = resolve_entry(&tree, id)?;
            let parent = resolve_parent(&tree, parent)?;
            if !tree.move_entry(entry, parent, row) {
                anyhow::bail!("Cannot move #{} there", id);
            }
            println!("Moved #{}", id);
        }
        Command::Remove { id } => {
            let entry = resolve_entry(&tree, id)?;
            tree.remove_entry(entry);
            println!("Removed #{}", id);
        }
        Command::Import { file } => {
            let summary = import(&mut tree, &file, policy)?;
            println!(
                "Imported {} feeds in {} folders ({} skipped)",
                summary.feeds, summary.folders, summary.skipped
            );
            if !config.read_only {
                backup(&feeds_path)?;
            }
        }
    }

    let events = tree.drain_events();
    for event in &events {
        tracing::debug!(?event, "Model event");
    }

    if events.contains(&ModelEvent::ModelModified) {
        save_tree(tree, feeds_path.clone(), config.read_only)
            .await
            .with_context(|| format!("Failed to save feeds to {}", feeds_path.display()))?;
    }

    Ok(())
}

async fn load_tree(path: PathBuf, policy: HostPolicy) -> Result<(FeedTree, LoadSummary)> {
    let (tree, result) = tokio::task::spawn_blocking(move || {
        let mut tree = FeedTree::new();
        let result = feed::load(&mut tree, &path, policy, &TracingConsole);
        (tree, result)
    })
    .await
    .context("Feed loading task panicked")?;

    Ok((tree, result?))
}

async fn save_tree(tree: FeedTree, path: PathBuf, read_only: bool) -> Result<()> {
    tokio::task::spawn_blocking(move || feed::save(&tree, &path, read_only))
        .await
        .context("Feed saving task panicked")??;
    Ok(())
}

/// Loads another OPML file on top of the current tree.
fn import(tree: &mut FeedTree, file: &Path, policy: HostPolicy) -> Result<LoadSummary> {
    // SEC-008: Canonicalize to resolve symlinks and prevent path traversal
    let canonical_import = file
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", file.display()))?;

    // Verify it's a regular file (not a directory, device, etc.)
    let metadata = std::fs::metadata(&canonical_import)?;
    if !metadata.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }

    let content = std::fs::read_to_string(&canonical_import).with_context(|| {
        format!("Failed to read import file: {}", canonical_import.display())
    })?;

    feed::load_str(tree, &content, policy)
        .with_context(|| format!("Failed to import {}", canonical_import.display()))
}

/// SEC-006: Keep a timestamped copy of the feeds file before an import rewrites it.
fn backup(feeds_path: &Path) -> Result<()> {
    let content = match std::fs::read(feeds_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).context("Failed to read feeds file for backup"),
    };

    let backup_name = format!(
        "{}.backup.{}",
        feeds_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "feeds.opml".to_owned()),
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    let backup_path = feeds_path.with_file_name(backup_name);

    atomic_write(&backup_path, &content).with_context(|| {
        format!(
            "Failed to create backup at '{}'. Original file is unchanged.",
            backup_path.display()
        )
    })?;
    println!("Backed up existing feeds to: {}", backup_path.display());
    Ok(())
}

/// Maps a user-facing parent identifier to a handle. 0 or none means Root.
fn resolve_parent(tree: &FeedTree, identifier: Option<u64>) -> Result<EntryId> {
    match identifier {
        None | Some(0) => Ok(tree.root()),
        Some(identifier) => resolve_entry(tree, identifier),
    }
}

fn resolve_entry(tree: &FeedTree, identifier: u64) -> Result<EntryId> {
    tree.get_entry(identifier)
        .with_context(|| format!("No entry with identifier {}", identifier))
}

fn identifier_of(tree: &FeedTree, id: EntryId) -> u64 {
    tree.entry(id).map_or(0, |entry| entry.identifier())
}

fn print_tree(tree: &FeedTree) {
    if tree.is_empty() {
        println!("No feeds yet. Add one with: feedtree add-feed <URL>");
        return;
    }

    for id in tree.children(tree.root()) {
        print_entry(tree, *id, 0);
    }
}

fn print_entry(tree: &FeedTree, id: EntryId, depth: usize) {
    let Some(entry) = tree.entry(id) else {
        return;
    };
    let title = tree.display_title(id).unwrap_or_default();
    let indent = "  ".repeat(depth);

    match entry.url() {
        Some(url) if title != url.as_str() => {
            println!("{}#{} {} <{}>", indent, entry.identifier(), title, url)
        }
        _ => println!("{}#{} {}", indent, entry.identifier(), title),
    }

    for child in entry.children() {
        print_entry(tree, *child, depth + 1);
    }
}
