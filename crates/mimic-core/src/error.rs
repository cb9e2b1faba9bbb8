//! Error kinds for capture, persistence and playback

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable, serializable classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    HookInstall,
    CaptureAborted,
    Persistence,
    MalformedRecord,
    UnknownIdentifier,
    Synthesis,
    Playback,
}

/// Input device a hook or recorder is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Mouse,
    Keyboard,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Mouse => f.write_str("mouse"),
            Device::Keyboard => f.write_str("keyboard"),
        }
    }
}

/// What an unresolved identifier was supposed to name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Key,
    Button,
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierKind::Key => f.write_str("key"),
            IdentifierKind::Button => f.write_str("button"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot install {device} hook: {reason}")]
    HookInstall { device: Device, reason: String },

    #[error("{device} capture aborted: {reason}")]
    CaptureAborted { device: Device, reason: String },

    #[error("cannot {op} {}: {source}", .path.display())]
    Persistence {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed recording{}{}: {reason}", fmt_path(.path), fmt_index(.index))]
    MalformedRecord {
        path: Option<PathBuf>,
        index: Option<usize>,
        reason: String,
    },

    #[error("unknown {kind} identifier '{name}'")]
    UnknownIdentifier { kind: IdentifierKind, name: String },

    #[error("input synthesis failed: {0}")]
    Synthesis(String),

    #[error("playback stopped at event {index}: {source}")]
    Playback {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" {}", p.display()))
        .unwrap_or_default()
}

fn fmt_index(index: &Option<usize>) -> String {
    index.map(|i| format!(" (record {})", i)).unwrap_or_default()
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::HookInstall { .. } => ErrorCode::HookInstall,
            Error::CaptureAborted { .. } => ErrorCode::CaptureAborted,
            Error::Persistence { .. } => ErrorCode::Persistence,
            Error::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            Error::UnknownIdentifier { .. } => ErrorCode::UnknownIdentifier,
            Error::Synthesis(_) => ErrorCode::Synthesis,
            Error::Playback { .. } => ErrorCode::Playback,
        }
    }

    /// Whether playback must stop on this error. Unknown identifiers only
    /// cost the single event they belong to.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::UnknownIdentifier { .. })
    }

    pub fn hook_install(device: Device, reason: impl Into<String>) -> Self {
        Error::HookInstall {
            device,
            reason: reason.into(),
        }
    }

    pub fn capture_aborted(device: Device, reason: impl Into<String>) -> Self {
        Error::CaptureAborted {
            device,
            reason: reason.into(),
        }
    }

    pub fn persistence(op: &'static str, path: &Path, source: io::Error) -> Self {
        Error::Persistence {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn malformed(index: Option<usize>, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            path: None,
            index,
            reason: reason.into(),
        }
    }

    pub fn unknown_key(name: &str) -> Self {
        Error::UnknownIdentifier {
            kind: IdentifierKind::Key,
            name: name.to_string(),
        }
    }

    pub fn unknown_button(name: &str) -> Self {
        Error::UnknownIdentifier {
            kind: IdentifierKind::Button,
            name: name.to_string(),
        }
    }

    /// Attach the document path to a malformed-record error
    pub fn at_path(self, at: &Path) -> Self {
        match self {
            Error::MalformedRecord { index, reason, .. } => Error::MalformedRecord {
                path: Some(at.to_path_buf()),
                index,
                reason,
            },
            other => other,
        }
    }

    /// The innermost error, looking through [`Error::Playback`]
    pub fn root(&self) -> &Error {
        match self {
            Error::Playback { source, .. } => source.root(),
            other => other,
        }
    }
}
