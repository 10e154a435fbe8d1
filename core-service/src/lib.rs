//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (tree discovery,
//! album and media writers) into the sync core. Desktop and server hosts
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) and call [`bootstrap_desktop`], which pairs the local
//! filesystem discoverer with the SQLite catalog from `core-library`.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    catalog::{AlbumWriter, MediaWriter},
    discovery::TreeDiscoverer,
};
use core_runtime::config::SchedulerConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream};
use core_sync::{JobId, JobSnapshot, JobStatus, SyncBatch, SyncCoordinator};
use tracing::info;

#[cfg(feature = "desktop-shims")]
use bridge_desktop::LocalTreeDiscoverer;
#[cfg(feature = "desktop-shims")]
use core_library::{
    db::{create_pool, DatabaseConfig},
    SqliteCatalog,
};
#[cfg(feature = "desktop-shims")]
use core_runtime::config::CoreConfig;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub discoverer: Arc<dyn TreeDiscoverer>,
    pub album_writer: Arc<dyn AlbumWriter>,
    pub media_writer: Arc<dyn MediaWriter>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        discoverer: Arc<dyn TreeDiscoverer>,
        album_writer: Arc<dyn AlbumWriter>,
        media_writer: Arc<dyn MediaWriter>,
    ) -> Self {
        Self {
            discoverer,
            album_writer,
            media_writer,
        }
    }

    /// Use one catalog for both write paths.
    pub fn with_catalog<C>(discoverer: Arc<dyn TreeDiscoverer>, catalog: Arc<C>) -> Self
    where
        C: AlbumWriter + MediaWriter + 'static,
    {
        Self {
            discoverer,
            album_writer: catalog.clone(),
            media_writer: catalog,
        }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    deps: Arc<CoreDependencies>,
    coordinator: Arc<SyncCoordinator>,
    event_bus: EventBus,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    ///
    /// The scheduler does not tick until [`CoreService::start`] is called.
    pub fn new(deps: CoreDependencies, scheduler: SchedulerConfig, event_bus: EventBus) -> Self {
        let coordinator = SyncCoordinator::new(
            scheduler,
            Arc::clone(&deps.discoverer),
            Arc::clone(&deps.album_writer),
            Arc::clone(&deps.media_writer),
            event_bus.clone(),
        );
        Self {
            deps: Arc::new(deps),
            coordinator: Arc::new(coordinator),
            event_bus,
        }
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Stream of sync and catalog events.
    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Raw receiver for hosts that fan events out themselves.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Start the scheduler tick.
    pub fn start(&self) -> Result<()> {
        self.coordinator.start()?;
        Ok(())
    }

    pub async fn start_sync(&self, path: &str) -> Result<SyncBatch> {
        Ok(self.coordinator.start_sync(path).await?)
    }

    pub fn get_status(&self, job_id: JobId) -> Result<JobSnapshot> {
        Ok(self.coordinator.get_status(job_id)?)
    }

    pub fn list_statuses(&self, filter: Option<JobStatus>) -> Vec<JobSnapshot> {
        self.coordinator.list_statuses(filter)
    }

    pub fn pause(&self, job_id: JobId) -> Result<()> {
        Ok(self.coordinator.pause(job_id)?)
    }

    pub fn resume(&self, job_id: JobId) -> Result<()> {
        Ok(self.coordinator.resume(job_id)?)
    }

    pub async fn stop(&self, job_id: JobId) -> Result<()> {
        Ok(self.coordinator.stop(job_id).await?)
    }

    pub async fn stop_all(&self) -> Result<()> {
        Ok(self.coordinator.stop_all().await?)
    }

    pub fn clear_finished(&self) -> usize {
        self.coordinator.clear_finished()
    }

    pub fn is_path_syncing(&self, path: &str) -> bool {
        self.coordinator.is_path_syncing(path)
    }

    /// Stop running jobs and the scheduler. Blocks until both are done.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
    }
}

/// Convenience bootstrapper for desktop and server hosts.
///
/// Validates `config`, opens (and migrates) the catalog database, walks the
/// data root with [`LocalTreeDiscoverer`] and starts the scheduler tick.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_runtime::config::CoreConfig;
/// use core_service::bootstrap_desktop;
///
/// let config = CoreConfig::builder()
///     .data_root("/srv/photos")
///     .database_path("/var/lib/album-sync/catalog.db")
///     .build()?;
/// let core = bootstrap_desktop(config).await?;
/// let batch = core.start_sync("2024").await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: CoreConfig) -> Result<CoreService> {
    config.validate()?;

    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                CoreError::InitializationFailed(format!(
                    "cannot create database directory {}: {}",
                    parent.display(),
                    err
                ))
            })?;
        }
    }

    let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
    let event_bus = EventBus::new(config.event_buffer_size);

    let mut discoverer = LocalTreeDiscoverer::new(&config.data_root);
    if let Some(extensions) = &config.media_extensions {
        discoverer = discoverer.with_extensions(extensions.iter().cloned());
    }
    let catalog =
        Arc::new(SqliteCatalog::new(pool, &config.data_root).with_events(event_bus.clone()));

    let deps = CoreDependencies::with_catalog(Arc::new(discoverer), catalog);
    let service = CoreService::new(deps, config.scheduler, event_bus);
    service.start()?;

    info!(
        data_root = %config.data_root.display(),
        database = %config.database_path.display(),
        "Core service bootstrapped"
    );
    Ok(service)
}
