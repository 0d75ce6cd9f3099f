//! Message sink for failures the model reports instead of returning.
//!
//! Loading a feeds file can fail halfway through; the tree keeps what was
//! parsed and the failure goes to a [`Console`]. The default
//! [`TracingConsole`] forwards every message to `tracing`.

use std::fmt;

/// Broad origin of a console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCategory {
    Network,
    Security,
    Other,
}

/// Severity of a console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageLevel::Info => "info",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        };
        f.write_str(label)
    }
}

/// Logging collaborator used for file-open and parse failures.
pub trait Console {
    /// Records one message. `source` names the file or URL the message is about.
    fn add_message(
        &self,
        message: &str,
        category: MessageCategory,
        level: MessageLevel,
        source: &str,
    );
}

/// Forwards console messages to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsole;

impl Console for TracingConsole {
    fn add_message(
        &self,
        message: &str,
        category: MessageCategory,
        level: MessageLevel,
        source: &str,
    ) {
        match level {
            MessageLevel::Info => {
                tracing::info!(?category, source = %source, "{}", message)
            }
            MessageLevel::Warning => {
                tracing::warn!(?category, source = %source, "{}", message)
            }
            MessageLevel::Error => {
                tracing::error!(?category, source = %source, "{}", message)
            }
        }
    }
}
