//! Folder Tree Discovery
//!
//! Describes the directory structure found under the data root. The core never
//! touches the filesystem directly; it asks a [`TreeDiscoverer`] for a tree of
//! [`FolderNode`]s and works from that snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A folder found during discovery.
///
/// Paths are relative to the data root and use `/` as separator. The bare data
/// root itself has an empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderNode {
    /// Path of this folder relative to the data root
    pub path: String,
    /// Sub-folders, in discovery order
    pub children: Vec<FolderNode>,
    /// Media files directly inside this folder (relative to the data root)
    pub media: Vec<String>,
}

impl FolderNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            children: Vec::new(),
            media: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: FolderNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_media(mut self, file: impl Into<String>) -> Self {
        self.media.push(file.into());
        self
    }

    /// Path of the enclosing folder, or `None` for the data root.
    ///
    /// Top-level folders report `Some("")`.
    pub fn parent_path(&self) -> Option<&str> {
        parent_of(&self.path)
    }

    /// Last path segment, used as the display name of the album.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// True for the data root when it holds no media of its own.
    pub fn is_bare_root(&self) -> bool {
        self.path.is_empty() && self.media.is_empty()
    }

    /// Number of folders in this subtree, including `self`.
    pub fn folder_count(&self) -> usize {
        1 + self.children.iter().map(FolderNode::folder_count).sum::<usize>()
    }
}

/// Parent of a relative `/`-separated path. The root (`""`) has no parent.
pub fn parent_of(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(idx) => Some(&path[..idx]),
        None => Some(""),
    }
}

/// Discovers the folder structure below a path of the data root.
///
/// Implementations must resolve `root` relative to their configured data
/// directory and fail if it cannot be turned into a directory.
#[async_trait]
pub trait TreeDiscoverer: Send + Sync {
    /// Walk `root` and return the folder tree rooted at it.
    async fn discover(&self, root: &str) -> Result<FolderNode>;
}
