//! # Photo Catalog Module
//!
//! Owns the album/media catalog database and the default implementations of
//! the catalog write paths used by sync tasks.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite connection pooling and embedded migrations ([`db`])
//! - Album and media row models ([`models`])
//! - [`SqliteCatalog`], an idempotent `AlbumWriter` + `MediaWriter`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//! use core_library::SqliteCatalog;
//!
//! let pool = create_pool(DatabaseConfig::new("catalog.db")).await?;
//! let catalog = SqliteCatalog::new(pool, "/srv/photos");
//! let album = catalog.ensure_album("2024", None).await?;
//! ```

pub mod catalog;
pub mod db;
pub mod error;
pub mod models;

pub use catalog::SqliteCatalog;
pub use error::{LibraryError, Result};
