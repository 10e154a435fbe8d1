//! # Host Bridge Traits
//!
//! Contract between the sync core and the collaborators it drives.
//!
//! ## Overview
//!
//! The sync core never walks directories or writes catalog rows itself. It
//! consumes the capabilities below through trait objects so that the desktop
//! adapters, a database-backed catalog, or test fakes can be swapped freely.
//!
//! ## Traits
//!
//! ### Discovery
//! - [`TreeDiscoverer`](discovery::TreeDiscoverer) - Returns the [`FolderNode`](discovery::FolderNode) tree below a path
//!
//! ### Catalog
//! - [`AlbumWriter`](catalog::AlbumWriter) - Idempotent "ensure album exists"
//! - [`MediaWriter`](catalog::MediaWriter) - Idempotent "ingest media file"
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the offending path in the
//! message.
//!
//! ## Thread Safety
//!
//! Every trait requires `Send + Sync`; implementations are shared across the
//! scheduler's job tasks behind `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::catalog::{AlbumId, AlbumWriter};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct NullAlbums;
//!
//! #[async_trait]
//! impl AlbumWriter for NullAlbums {
//!     async fn ensure_album(&self, _path: &str, _parent: Option<AlbumId>) -> Result<AlbumId> {
//!         Ok(AlbumId::new())
//!     }
//! }
//! ```

pub mod catalog;
pub mod discovery;
pub mod error;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{AlbumId, AlbumWriter, IngestOutcome, IngestReport, MediaId, MediaWriter};
pub use discovery::{FolderNode, TreeDiscoverer};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
