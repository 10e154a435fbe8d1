//! Domain models for the photo catalog
//!
//! Rows are keyed by a UUID string id and by the path relative to the data
//! root. Timestamps are Unix seconds.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Display name used for an album at the data root itself.
pub const ROOT_ALBUM_NAME: &str = "Library";

/// Album mirroring one folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Album {
    pub id: String,
    /// Folder path relative to the data root (`""` for the root)
    pub path: String,
    /// Last path segment
    pub name: String,
    pub parent_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Album {
    pub fn new(path: impl Into<String>, parent_id: Option<String>) -> Self {
        let path = path.into();
        let name = Self::name_for(&path);
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            name,
            parent_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the display name from a folder path
    pub fn name_for(path: &str) -> String {
        match path.rsplit('/').next() {
            Some(segment) if !segment.is_empty() => segment.to_string(),
            _ => ROOT_ALBUM_NAME.to_string(),
        }
    }

    /// Validate album data
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Album name cannot be empty".to_string());
        }

        if self.path.starts_with('/') {
            return Err(format!("Album path must be relative: {}", self.path));
        }

        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err("Album cannot be its own parent".to_string());
        }

        Ok(())
    }
}

/// Media file stored in an album
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Media {
    pub id: String,
    pub album_id: String,
    /// File path relative to the data root
    pub path: String,
    /// Lowercase hex SHA-256 of the file content
    pub content_hash: String,
    pub size_bytes: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Media {
    pub fn new(
        album_id: impl Into<String>,
        path: impl Into<String>,
        content_hash: impl Into<String>,
        size_bytes: i64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            album_id: album_id.into(),
            path: path.into(),
            content_hash: content_hash.into(),
            size_bytes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("Media path cannot be empty".to_string());
        }

        if self.size_bytes < 0 {
            return Err("Media size cannot be negative".to_string());
        }

        if self.content_hash.len() != 64
            || !self.content_hash.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(format!("Invalid content hash: {}", self.content_hash));
        }

        Ok(())
    }

    /// File name without its folder
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_name_from_path() {
        assert_eq!(Album::new("2024/summer", None).name, "summer");
        assert_eq!(Album::new("2024", None).name, "2024");
        assert_eq!(Album::new("", None).name, ROOT_ALBUM_NAME);
    }

    #[test]
    fn test_album_validation() {
        let album = Album::new("2024", None);
        assert!(album.validate().is_ok());

        let mut absolute = Album::new("2024", None);
        absolute.path = "/2024".to_string();
        assert!(absolute.validate().is_err());

        let mut cyclic = Album::new("2024", None);
        cyclic.parent_id = Some(cyclic.id.clone());
        assert!(cyclic.validate().is_err());
    }

    #[test]
    fn test_media_validation() {
        let hash = "a".repeat(64);
        let media = Media::new("album", "2024/a.jpg", hash.clone(), 10);
        assert!(media.validate().is_ok());
        assert_eq!(media.file_name(), "a.jpg");

        let bad_hash = Media::new("album", "2024/a.jpg", "xyz", 10);
        assert!(bad_hash.validate().is_err());

        let negative = Media::new("album", "2024/a.jpg", hash, -1);
        assert!(negative.validate().is_err());
    }
}
