//! # Job Generator
//!
//! Turns a discovered folder tree into one [`Job`] per folder.
//!
//! ## Overview
//!
//! The tree is walked depth-first in pre-order, so a folder's job is always
//! emitted before the jobs of its sub-folders. Each job holds:
//!
//! 1. one album task ensuring the folder's album exists (skipped for the bare
//!    data root, which is not an album unless it holds media), then
//! 2. one media task per file directly inside the folder.
//!
//! Album identities only exist once tasks run, so parent linkage goes through
//! a shared [`AlbumResolver`]: the walk records which album path is the parent
//! of which, and at execution time the resolver ensures the parent chain
//! before the album itself. Sibling jobs may therefore interleave freely.
//!
//! Nothing touches the catalog during generation; a discovery failure yields
//! an error and no jobs.

use crate::job::Job;
use crate::task::{Task, TaskKind};
use crate::{Result, SyncError};
use bridge_traits::catalog::{AlbumId, AlbumWriter, IngestOutcome, MediaWriter};
use bridge_traits::discovery::{parent_of, FolderNode, TreeDiscoverer};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Resolves album paths to catalog ids, parents first.
///
/// Shared by every job generated from one discovery pass.
pub struct AlbumResolver {
    writer: Arc<dyn AlbumWriter>,
    /// album path -> parent album path
    lineage: HashMap<String, Option<String>>,
    resolved: Mutex<HashMap<String, AlbumId>>,
}

impl AlbumResolver {
    pub fn new(writer: Arc<dyn AlbumWriter>, lineage: HashMap<String, Option<String>>) -> Self {
        Self {
            writer,
            lineage,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Parent album path recorded for `path`
    pub fn parent_of(&self, path: &str) -> Option<&str> {
        self.lineage.get(path).and_then(|parent| parent.as_deref())
    }

    pub fn is_album(&self, path: &str) -> bool {
        self.lineage.contains_key(path)
    }

    /// Return the album id for `path`, ensuring its ancestors first.
    pub fn resolve<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<AlbumId>> {
        async move {
            if let Some(id) = self.cached(path) {
                return Ok(id);
            }

            let parent = match self.parent_of(path) {
                Some(parent_path) => Some(self.resolve(parent_path).await?),
                None => None,
            };

            let id = self.writer.ensure_album(path, parent).await?;
            self.resolved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(path.to_string(), id);
            Ok(id)
        }
        .boxed()
    }

    fn cached(&self, path: &str) -> Option<AlbumId> {
        self.resolved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied()
    }
}

/// Builds per-folder jobs from a discovered tree
pub struct JobGenerator {
    discoverer: Arc<dyn TreeDiscoverer>,
    albums: Arc<dyn AlbumWriter>,
    media: Arc<dyn MediaWriter>,
}

impl JobGenerator {
    pub fn new(
        discoverer: Arc<dyn TreeDiscoverer>,
        albums: Arc<dyn AlbumWriter>,
        media: Arc<dyn MediaWriter>,
    ) -> Self {
        Self {
            discoverer,
            albums,
            media,
        }
    }

    /// Discover the tree below `root` and build its jobs.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Discovery`] if the discoverer fails; no jobs are
    /// produced in that case.
    pub async fn generate(&self, root: &str) -> Result<Vec<Job>> {
        let tree = self.discoverer.discover(root).await.map_err(|e| {
            warn!(root = %root, error = %e, "Folder discovery failed");
            SyncError::Discovery(e.to_string())
        })?;

        let jobs = self.jobs_for_tree(&tree);
        info!(
            root = %tree.path,
            jobs = jobs.len(),
            tasks = jobs.iter().map(Job::total).sum::<usize>(),
            "Generated sync jobs"
        );
        Ok(jobs)
    }

    /// Build jobs for an already discovered tree, parents before children.
    pub fn jobs_for_tree(&self, tree: &FolderNode) -> Vec<Job> {
        let resolver = Arc::new(AlbumResolver::new(
            Arc::clone(&self.albums),
            build_lineage(tree),
        ));

        let mut jobs = Vec::with_capacity(tree.folder_count());
        let mut stack = vec![tree];
        while let Some(node) = stack.pop() {
            jobs.push(self.job_for_node(node, &resolver));
            // Reversed so children pop in discovery order
            stack.extend(node.children.iter().rev());
        }
        jobs
    }

    fn job_for_node(&self, node: &FolderNode, resolver: &Arc<AlbumResolver>) -> Job {
        let mut tasks = Vec::with_capacity(node.media.len() + 1);

        if resolver.is_album(&node.path) {
            tasks.push(album_task(node.path.clone(), Arc::clone(resolver)));
        }

        for file in &node.media {
            tasks.push(media_task(
                file.clone(),
                node.path.clone(),
                Arc::clone(resolver),
                Arc::clone(&self.media),
            ));
        }

        debug!(path = %node.path, tasks = tasks.len(), "Built folder job");
        Job::new(node.path.clone(), tasks)
    }
}

/// Map every album in `tree` to its parent album path.
///
/// The bare data root is not an album. When `tree` is a subtree, the folders
/// above it are recorded too, so the subtree's album is linked to an existing
/// parent rather than created as an orphan.
pub fn build_lineage(tree: &FolderNode) -> HashMap<String, Option<String>> {
    let mut lineage = HashMap::new();

    if !tree.is_bare_root() {
        let mut current = tree.path.clone();
        loop {
            let parent = parent_of(&current)
                .filter(|p| !p.is_empty())
                .map(str::to_string);
            lineage.insert(current, parent.clone());
            match parent {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        let parent = if node.is_bare_root() {
            None
        } else {
            Some(node.path.clone())
        };
        for child in &node.children {
            lineage.insert(child.path.clone(), parent.clone());
            stack.push(child);
        }
    }

    lineage
}

fn album_task(path: String, resolver: Arc<AlbumResolver>) -> Task {
    Task::new(TaskKind::Album, path.clone(), move |_ctx| async move {
        let id = resolver.resolve(&path).await?;
        Ok(format!("album {}", id))
    })
}

fn media_task(
    file: String,
    folder: String,
    resolver: Arc<AlbumResolver>,
    writer: Arc<dyn MediaWriter>,
) -> Task {
    Task::new(TaskKind::Media, file.clone(), move |_ctx| async move {
        let album = resolver.resolve(&folder).await?;
        let report = writer.ingest_media(&file, album).await?;
        Ok(match report.outcome {
            IngestOutcome::Unchanged => "unchanged, skipped".to_string(),
            outcome => format!("{} {}", outcome, report.media_id),
        })
    })
}
