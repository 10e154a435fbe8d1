//! Catalog Write Paths
//!
//! The album and media write operations consumed by sync tasks. Both are
//! expected to be idempotent and to provide their own transactional
//! isolation; the sync core treats every call as an atomic black box.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{BridgeError, Result};

/// Identity of an album in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlbumId(Uuid);

impl AlbumId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| BridgeError::OperationFailed(format!("invalid album id: {}", e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for AlbumId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlbumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a media item in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaId(Uuid);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| BridgeError::OperationFailed(format!("invalid media id: {}", e)))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an ingest call did with the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestOutcome {
    /// File was not in the catalog and has been added
    Created,
    /// File was known but its content changed
    Updated,
    /// File is known with identical content; nothing was reprocessed
    Unchanged,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Created => "created",
            IngestOutcome::Updated => "updated",
            IngestOutcome::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a successful ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub media_id: MediaId,
    pub outcome: IngestOutcome,
}

/// Album write path.
///
/// # Idempotence
///
/// Calling `ensure_album` twice with the same path must return the same
/// [`AlbumId`] both times.
#[async_trait]
pub trait AlbumWriter: Send + Sync {
    /// Return the album stored at `path`, creating it under `parent` if absent.
    async fn ensure_album(&self, path: &str, parent: Option<AlbumId>) -> Result<AlbumId>;
}

/// Media write path.
///
/// Idempotent on content hash: ingesting an unchanged file reports
/// [`IngestOutcome::Unchanged`] and does no further processing.
#[async_trait]
pub trait MediaWriter: Send + Sync {
    /// Ingest the file at `path` (relative to the data root) into `album`.
    async fn ingest_media(&self, path: &str, album: AlbumId) -> Result<IngestReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_id_round_trip() {
        let id = AlbumId::new();
        let parsed = AlbumId::from_string(&id.as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(AlbumId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_ingest_outcome_serialization() {
        let json = serde_json::to_string(&IngestOutcome::Unchanged).unwrap();
        assert_eq!(json, "\"unchanged\"");
        assert_eq!(IngestOutcome::Created.to_string(), "created");
    }
}
