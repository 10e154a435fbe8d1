//! SQLite-backed album and media catalog
//!
//! Implements the [`AlbumWriter`] and [`MediaWriter`] write paths on top of the
//! `albums` and `media` tables. Albums are idempotent on their folder path;
//! media are idempotent on file path plus SHA-256 content hash.

use crate::error::{LibraryError, Result};
use crate::models::{Album, Media};
use async_trait::async_trait;
use bridge_traits::catalog::{
    AlbumId, AlbumWriter, IngestOutcome, IngestReport, MediaId, MediaWriter,
};
use bridge_traits::error::Result as BridgeResult;
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use core_runtime::logging::strip_path;
use sha2::{Digest, Sha256};
use sqlx::{query, query_as, SqlitePool};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Read size used while hashing media files.
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Catalog over a SQLite pool, reading media bytes from `data_root`.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
    data_root: PathBuf,
    event_bus: Option<EventBus>,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool, data_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            data_root: data_root.into(),
            event_bus: None,
        }
    }

    /// Publish `LibraryEvent`s for newly written rows.
    pub fn with_events(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub async fn find_album_by_path(&self, path: &str) -> Result<Option<Album>> {
        let album = query_as::<_, Album>("SELECT * FROM albums WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(album)
    }

    pub async fn find_album(&self, id: &str) -> Result<Album> {
        query_as::<_, Album>("SELECT * FROM albums WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Album".to_string(),
                id: id.to_string(),
            })
    }

    /// All albums ordered by path
    pub async fn list_albums(&self) -> Result<Vec<Album>> {
        let albums = query_as::<_, Album>("SELECT * FROM albums ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(albums)
    }

    pub async fn find_media_by_path(&self, path: &str) -> Result<Option<Media>> {
        let media = query_as::<_, Media>("SELECT * FROM media WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(media)
    }

    /// Media stored in one album, ordered by path
    pub async fn media_in_album(&self, album_id: &str) -> Result<Vec<Media>> {
        let media = query_as::<_, Media>("SELECT * FROM media WHERE album_id = ? ORDER BY path")
            .bind(album_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(media)
    }

    pub async fn count_media(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM media")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn emit(&self, event: LibraryEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is fine
            let _ = bus.emit(CoreEvent::Library(event));
        }
    }

    fn parse_album_id(id: &str) -> Result<AlbumId> {
        AlbumId::from_string(id).map_err(LibraryError::from)
    }

    fn parse_media_id(id: &str) -> Result<MediaId> {
        MediaId::from_string(id).map_err(LibraryError::from)
    }

    /// SHA-256 hex digest and byte length of a file below the data root.
    async fn hash_media(&self, path: &str) -> Result<(String, i64)> {
        let full = self.data_root.join(path);
        let io_error = |source| LibraryError::Io {
            path: full.display().to_string(),
            source,
        };

        let mut file = tokio::fs::File::open(&full).await.map_err(io_error)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
        let mut size: u64 = 0;
        loop {
            let read = file.read(&mut buffer).await.map_err(io_error)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            size += read as u64;
        }

        Ok((format!("{:x}", hasher.finalize()), size as i64))
    }

    async fn ensure_album_row(&self, path: &str, parent: Option<AlbumId>) -> Result<AlbumId> {
        if let Some(existing) = self.find_album_by_path(path).await? {
            return Self::parse_album_id(&existing.id);
        }

        let album = Album::new(path, parent.map(|p| p.to_string()));
        album.validate().map_err(|message| LibraryError::InvalidInput {
            field: "Album".to_string(),
            message,
        })?;

        // A concurrent writer may have inserted the same path in between.
        let inserted = query(
            r#"
            INSERT INTO albums (id, path, name, parent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO NOTHING
            "#,
        )
        .bind(&album.id)
        .bind(&album.path)
        .bind(&album.name)
        .bind(&album.parent_id)
        .bind(album.created_at)
        .bind(album.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            let existing = self
                .find_album_by_path(path)
                .await?
                .ok_or_else(|| LibraryError::NotFound {
                    entity_type: "Album".to_string(),
                    id: path.to_string(),
                })?;
            return Self::parse_album_id(&existing.id);
        }

        info!(album_id = %album.id, path = %album.path, "Created album");
        self.emit(LibraryEvent::AlbumCreated {
            album_id: album.id.clone(),
            path: album.path.clone(),
        });

        Self::parse_album_id(&album.id)
    }

    async fn ingest_file(&self, path: &str, album: AlbumId) -> Result<IngestReport> {
        let (hash, size) = self.hash_media(path).await?;
        let album_id = album.to_string();

        if let Some(existing) = self.find_media_by_path(path).await? {
            if existing.content_hash == hash && existing.album_id == album_id {
                debug!(file = %strip_path(path), "Media unchanged, skipped");
                return Ok(IngestReport {
                    media_id: Self::parse_media_id(&existing.id)?,
                    outcome: IngestOutcome::Unchanged,
                });
            }

            query(
                r#"
                UPDATE media
                SET album_id = ?, content_hash = ?, size_bytes = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&album_id)
            .bind(&hash)
            .bind(size)
            .bind(chrono::Utc::now().timestamp())
            .bind(&existing.id)
            .execute(&self.pool)
            .await?;

            debug!(file = %strip_path(path), "Media updated");
            self.emit(LibraryEvent::MediaIngested {
                media_id: existing.id.clone(),
                path: path.to_string(),
                outcome: IngestOutcome::Updated.to_string(),
            });
            return Ok(IngestReport {
                media_id: Self::parse_media_id(&existing.id)?,
                outcome: IngestOutcome::Updated,
            });
        }

        let media = Media::new(album_id, path, hash, size);
        media.validate().map_err(|message| LibraryError::InvalidInput {
            field: "Media".to_string(),
            message,
        })?;

        let inserted = query(
            r#"
            INSERT INTO media (id, album_id, path, content_hash, size_bytes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO NOTHING
            "#,
        )
        .bind(&media.id)
        .bind(&media.album_id)
        .bind(&media.path)
        .bind(&media.content_hash)
        .bind(media.size_bytes)
        .bind(media.created_at)
        .bind(media.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 0 {
            let existing =
                self.find_media_by_path(path)
                    .await?
                    .ok_or_else(|| LibraryError::NotFound {
                        entity_type: "Media".to_string(),
                        id: path.to_string(),
                    })?;
            return Ok(IngestReport {
                media_id: Self::parse_media_id(&existing.id)?,
                outcome: IngestOutcome::Unchanged,
            });
        }

        debug!(file = %strip_path(path), size_bytes = size, "Media created");
        self.emit(LibraryEvent::MediaIngested {
            media_id: media.id.clone(),
            path: media.path.clone(),
            outcome: IngestOutcome::Created.to_string(),
        });

        Ok(IngestReport {
            media_id: Self::parse_media_id(&media.id)?,
            outcome: IngestOutcome::Created,
        })
    }
}

#[async_trait]
impl AlbumWriter for SqliteCatalog {
    async fn ensure_album(&self, path: &str, parent: Option<AlbumId>) -> BridgeResult<AlbumId> {
        Ok(self.ensure_album_row(path, parent).await?)
    }
}

#[async_trait]
impl MediaWriter for SqliteCatalog {
    async fn ingest_media(&self, path: &str, album: AlbumId) -> BridgeResult<IngestReport> {
        Ok(self.ingest_file(path, album).await?)
    }
}
