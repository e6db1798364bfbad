//! Error taxonomy for the acquisition pipeline.
//!
//! Each step of the save/share workflow has its own variant so callers (and
//! logs) can tell which stage of the remote conversation failed. Only
//! [`DriveError::Auth`] is fatal to a run; everything else is logged and the
//! pipeline moves on to the next candidate.

use thiserror::Error;

/// Failures from the remote drive client and task poller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriveError {
    #[error("invalid share link: {0}")]
    InvalidLink(String),

    #[error("share token error: {0}")]
    Token(String),

    /// The share link itself is dead (expired or removed upstream).
    #[error("share link expired or removed: {0}")]
    Expired(String),

    #[error("share listing error: {0}")]
    List(String),

    #[error("save request failed: {0}")]
    Save(String),

    #[error("remote task failed: {0}")]
    Task(String),

    #[error("share creation failed: {0}")]
    Share(String),

    #[error("share password request failed: {0}")]
    Password(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("credential rejected: {0}")]
    Auth(String),
}

impl DriveError {
    pub fn is_expired_link(&self) -> bool {
        matches!(self, DriveError::Expired(_))
    }
}

/// Cache persistence failures. Logged by the cache, never returned from it.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while opening or reading a message group.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("permission denied for group {0}")]
    PermissionDenied(String),

    #[error("account restricted, cannot read group {0}")]
    Restricted(String),

    #[error("I/O error reading group: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed group export: {0}")]
    Parse(#[from] serde_json::Error),
}
