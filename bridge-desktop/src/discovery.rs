//! Folder tree discovery over a mounted data directory using Tokio

use async_trait::async_trait;
use bridge_traits::{
    discovery::{FolderNode, TreeDiscoverer},
    error::{BridgeError, Result},
};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tracing::{debug, warn};

/// File extensions treated as photo or video media by default
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "heic", "heif", "tif", "tiff", "bmp", "dng", "cr2",
    "nef", "arw", "mp4", "mov", "m4v", "avi", "mkv", "webm", "3gp",
];

type WalkFuture<'a> = Pin<Box<dyn Future<Output = Result<FolderNode>> + Send + 'a>>;

/// Tokio-based discoverer rooted at the data directory
///
/// Hidden entries (names starting with `.`) are skipped, symlinks are not
/// followed, and children and media are sorted by name so repeated walks of
/// an unchanged tree produce identical output.
pub struct LocalTreeDiscoverer {
    root: PathBuf,
    extensions: Vec<String>,
}

impl LocalTreeDiscoverer {
    /// Create a discoverer with the default media extensions
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }

    /// Replace the recognised media extensions (matched case-insensitively)
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn is_media(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.extensions.iter().any(|known| *known == ext)
            })
            .unwrap_or(false)
    }

    /// Normalise a relative path and refuse anything escaping the data root.
    fn normalize(relative: &str) -> Result<String> {
        let trimmed = relative.trim_matches('/');
        let path = Path::new(trimmed);

        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(BridgeError::OperationFailed(format!(
                        "path escapes data root: {}",
                        relative
                    )))
                }
            }
        }

        Ok(trimmed
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/"))
    }

    fn join(parent: &str, name: &str) -> String {
        if parent.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent, name)
        }
    }

    fn walk(&self, relative: String) -> WalkFuture<'_> {
        Box::pin(async move {
            let dir = self.root.join(&relative);
            let mut read_dir = fs::read_dir(&dir).await.map_err(Self::map_io_error)?;

            let mut folders = Vec::new();
            let mut media = Vec::new();

            while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(raw) => {
                        warn!(folder = %relative, name = ?raw, "Skipping entry with non-UTF-8 name");
                        continue;
                    }
                };
                if name.starts_with('.') {
                    continue;
                }

                let file_type = entry.file_type().await.map_err(Self::map_io_error)?;
                if file_type.is_dir() {
                    folders.push(name);
                } else if file_type.is_file() && self.is_media(&name) {
                    media.push(Self::join(&relative, &name));
                }
            }

            folders.sort();
            media.sort();

            let mut node = FolderNode::new(relative.clone());
            node.media = media;

            for folder in folders {
                let child = self.walk(Self::join(&relative, &folder)).await?;
                node.children.push(child);
            }

            debug!(
                path = %relative,
                children = node.children.len(),
                media = node.media.len(),
                "Walked folder"
            );
            Ok(node)
        })
    }
}

#[async_trait]
impl TreeDiscoverer for LocalTreeDiscoverer {
    async fn discover(&self, root: &str) -> Result<FolderNode> {
        let relative = Self::normalize(root)?;
        let dir = self.root.join(&relative);

        match fs::metadata(&dir).await {
            Ok(metadata) if !metadata.is_dir() => {
                return Err(BridgeError::NotADirectory(dir.display().to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&dir).await.map_err(Self::map_io_error)?;
                debug!(path = ?dir, "Created missing sync directory");
            }
            Err(e) => return Err(Self::map_io_error(e)),
        }

        let tree = self.walk(relative).await?;
        debug!(
            root = %tree.path,
            folders = tree.folder_count(),
            "Discovered folder tree"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as stdfs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            stdfs::create_dir_all(parent).unwrap();
        }
        stdfs::write(path, b"data").unwrap();
    }

    #[tokio::test]
    async fn test_discover_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("2024/a.jpg"));
        touch(&dir.path().join("2024/b.MOV"));
        touch(&dir.path().join("2024/notes.txt"));
        touch(&dir.path().join("2024/summer/c.png"));
        touch(&dir.path().join("2023/.hidden.jpg"));
        stdfs::create_dir_all(dir.path().join(".thumbnails")).unwrap();

        let discoverer = LocalTreeDiscoverer::new(dir.path());
        let tree = discoverer.discover("").await.unwrap();

        assert_eq!(tree.path, "");
        assert!(tree.media.is_empty());
        let names: Vec<_> = tree.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(names, vec!["2023", "2024"]);

        let y2024 = &tree.children[1];
        assert_eq!(y2024.media, vec!["2024/a.jpg", "2024/b.MOV"]);
        assert_eq!(y2024.children.len(), 1);
        assert_eq!(y2024.children[0].path, "2024/summer");
        assert_eq!(y2024.children[0].media, vec!["2024/summer/c.png"]);

        assert!(tree.children[0].media.is_empty());
    }

    #[tokio::test]
    async fn test_discover_subtree_keeps_paths_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("2024/summer/c.png"));

        let discoverer = LocalTreeDiscoverer::new(dir.path());
        let tree = discoverer.discover("/2024/").await.unwrap();

        assert_eq!(tree.path, "2024");
        assert_eq!(tree.children[0].media, vec!["2024/summer/c.png"]);
    }

    #[tokio::test]
    async fn test_discover_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let discoverer = LocalTreeDiscoverer::new(dir.path());

        let tree = discoverer.discover("new/album").await.unwrap();

        assert_eq!(tree.path, "new/album");
        assert!(tree.children.is_empty());
        assert!(dir.path().join("new/album").is_dir());
    }

    #[tokio::test]
    async fn test_discover_rejects_file_and_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("photo.jpg"));
        let discoverer = LocalTreeDiscoverer::new(dir.path());

        assert!(matches!(
            discoverer.discover("photo.jpg").await,
            Err(BridgeError::NotADirectory(_))
        ));
        assert!(discoverer.discover("../outside").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ok.jpg"));
        let raw = OsStr::from_bytes(b"bad\xff.jpg");
        if stdfs::write(dir.path().join(raw), b"data").is_err() {
            // Filesystem refuses non-UTF-8 names; nothing to walk over
            return;
        }

        let discoverer = LocalTreeDiscoverer::new(dir.path());
        let tree = discoverer.discover("").await.unwrap();

        assert_eq!(tree.media, vec!["ok.jpg"]);
    }

    #[tokio::test]
    async fn test_custom_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("b.raf"));

        let discoverer = LocalTreeDiscoverer::new(dir.path()).with_extensions([".RAF"]);
        let tree = discoverer.discover("").await.unwrap();

        assert_eq!(tree.media, vec!["b.raf"]);
    }
}
