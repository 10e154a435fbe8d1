//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts
//! (macOS, Windows, Linux) where the photo library lives on a mounted
//! filesystem.
//!
//! ## Overview
//!
//! - `TreeDiscoverer` using `tokio::fs` ([`LocalTreeDiscoverer`])
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::LocalTreeDiscoverer;
//! use bridge_traits::TreeDiscoverer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let discoverer = LocalTreeDiscoverer::new("/srv/photos");
//!     let tree = discoverer.discover("2024").await.unwrap();
//!     println!("{} folders", tree.folder_count());
//! }
//! ```

mod discovery;

pub use discovery::{LocalTreeDiscoverer, DEFAULT_MEDIA_EXTENSIONS};
