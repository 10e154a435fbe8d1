//! # Job Scheduler
//!
//! Holds every registered [`Job`] in FIFO order and, on a fixed tick, admits
//! pending jobs up to a concurrency ceiling and evicts finished jobs past
//! their retention window.
//!
//! ## Overview
//!
//! - Jobs occupy a slot while `Running`, `Paused` or `Stopping`.
//! - Admission calls [`Job::begin`] under the queue lock, then spawns the job
//!   loop on a child of the scheduler's cancellation token.
//! - The tick never waits on a job.
//! - [`Scheduler::stop`] stops active jobs, then cancels the ticker and waits
//!   for it to exit.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_runtime::config::SchedulerConfig;
//! use core_sync::scheduler::Scheduler;
//!
//! let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default()));
//! scheduler.start()?;
//! scheduler.add(job)?;
//! // ...
//! scheduler.stop().await;
//! ```

use crate::job::{Job, JobId, JobStatus};
use crate::{Result, SyncError};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::config::SchedulerConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Jobs touched by one tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub promoted: Vec<JobId>,
    pub evicted: Vec<JobId>,
}

struct Ticker {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

/// Process-wide coordinator for sync jobs
pub struct Scheduler {
    config: SchedulerConfig,
    jobs: RwLock<Vec<Arc<Job>>>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    /// Parent of every job loop's token
    cancel: CancellationToken,
    ticker: Mutex<Option<Ticker>>,
    stopped: AtomicBool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            jobs: RwLock::new(Vec::new()),
            clock: Arc::new(SystemClock),
            event_bus: None,
            cancel: CancellationToken::new(),
            ticker: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Use `clock` for retention checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Spawn the periodic tick. Calling it again while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SchedulerStopped`] after [`Scheduler::stop`].
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_stopped() {
            return Err(SyncError::SchedulerStopped);
        }

        let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
        if ticker.is_some() {
            return Ok(());
        }

        let stop = CancellationToken::new();
        let token = stop.clone();
        let scheduler = Arc::downgrade(self);
        let period = self.config.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(scheduler) = scheduler.upgrade() else {
                            break;
                        };
                        scheduler.tick();
                    }
                }
            }
            debug!("Scheduler ticker exited");
        });

        info!(
            tick_ms = period.as_millis() as u64,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Scheduler started"
        );
        *ticker = Some(Ticker { stop, handle });
        Ok(())
    }

    /// Whether the periodic tick is running
    pub fn is_running(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Run one admission and eviction pass.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        if self.is_stopped() {
            return report;
        }

        let now = self.clock.now();
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));

        let admitted = {
            let mut jobs = self.jobs_mut();

            jobs.retain(|job| {
                let expired = job.status().is_terminal()
                    && job
                        .completed_at()
                        .is_some_and(|completed| completed + retention < now);
                if expired {
                    report.evicted.push(job.id());
                }
                !expired
            });

            let mut active = jobs.iter().filter(|job| job.status().is_active()).count();
            let mut admitted = Vec::new();
            for job in jobs.iter() {
                if active >= self.config.max_concurrent_jobs {
                    break;
                }
                if job.status() != JobStatus::Pending {
                    continue;
                }
                match job.begin() {
                    Ok(()) => {
                        active += 1;
                        admitted.push(Arc::clone(job));
                    }
                    // Stopped between the status read and begin()
                    Err(e) => debug!(job_id = %job.id(), error = %e, "Skipped admission"),
                }
            }
            admitted
        };

        for job in admitted {
            report.promoted.push(job.id());
            let token = self.cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = job.run(token).await {
                    warn!(job_id = %job.id(), error = %e, "Job loop ended with error");
                }
            });
        }

        for id in &report.evicted {
            debug!(job_id = %id, "Evicted finished job");
            self.emit(SyncEvent::JobEvicted {
                job_id: id.to_string(),
            });
        }

        if !report.promoted.is_empty() || !report.evicted.is_empty() {
            debug!(
                promoted = report.promoted.len(),
                evicted = report.evicted.len(),
                "Scheduler tick"
            );
        }
        report
    }

    /// Append a job to the tail of the queue.
    pub fn add(&self, job: Job) -> Result<Arc<Job>> {
        if self.is_stopped() {
            return Err(SyncError::SchedulerStopped);
        }
        let job = Arc::new(job);
        self.jobs_mut().push(Arc::clone(&job));
        debug!(job_id = %job.id(), path = %job.path(), "Job registered");
        Ok(job)
    }

    /// Register several jobs, preserving their order.
    pub fn add_all(&self, jobs: Vec<Job>) -> Result<Vec<Arc<Job>>> {
        if self.is_stopped() {
            return Err(SyncError::SchedulerStopped);
        }
        let jobs: Vec<Arc<Job>> = jobs.into_iter().map(Arc::new).collect();
        self.jobs_mut().extend(jobs.iter().cloned());
        debug!(count = jobs.len(), "Jobs registered");
        Ok(jobs)
    }

    pub fn get(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs().iter().find(|job| job.id() == id).cloned()
    }

    pub fn get_all(&self) -> Vec<Arc<Job>> {
        self.jobs().clone()
    }

    pub fn get_by_status(&self, status: JobStatus) -> Vec<Arc<Job>> {
        self.jobs()
            .iter()
            .filter(|job| job.status() == status)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Drop a finished job from the queue.
    ///
    /// # Errors
    ///
    /// [`SyncError::JobNotFound`] for an unknown id, and
    /// [`SyncError::InvalidStateTransition`] if the job has not finished.
    pub fn remove(&self, id: JobId) -> Result<Arc<Job>> {
        let mut jobs = self.jobs_mut();
        let index = jobs
            .iter()
            .position(|job| job.id() == id)
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: id.to_string(),
            })?;

        let status = jobs[index].status();
        if !status.is_terminal() {
            return Err(SyncError::InvalidStateTransition {
                from: status.to_string(),
                to: "removed".to_string(),
                reason: "only finished jobs can be removed".to_string(),
            });
        }
        Ok(jobs.remove(index))
    }

    /// Remove every terminal job regardless of age. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.jobs_mut();
        let before = jobs.len();
        jobs.retain(|job| !job.status().is_terminal());
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "Cleared finished jobs");
        }
        removed
    }

    /// Stop one job and wait for its loop to acknowledge.
    pub async fn stop_job(&self, id: JobId) -> Result<()> {
        let job = self.get(id).ok_or_else(|| SyncError::JobNotFound {
            job_id: id.to_string(),
        })?;
        job.stop().await;
        Ok(())
    }

    /// Stop every pending and active job.
    pub async fn stop_all(&self) {
        let targets: Vec<Arc<Job>> = self
            .jobs()
            .iter()
            .filter(|job| !job.status().is_terminal())
            .cloned()
            .collect();

        info!(count = targets.len(), "Stopping all jobs");
        join_all(targets.iter().map(|job| job.stop())).await;
    }

    /// Shut the scheduler down.
    ///
    /// Active jobs are stopped and awaited, then the ticker is cancelled and
    /// joined. Pending jobs stay pending and are never admitted afterwards.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let active: Vec<Arc<Job>> = self
            .jobs()
            .iter()
            .filter(|job| job.status().is_active())
            .cloned()
            .collect();
        join_all(active.iter().map(|job| job.stop())).await;
        self.cancel.cancel();

        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(ticker) = ticker {
            ticker.stop.cancel();
            if let Err(e) = ticker.handle.await {
                warn!(error = %e, "Scheduler ticker did not exit cleanly");
            }
        }

        info!(stopped_jobs = active.len(), "Scheduler stopped");
    }

    fn jobs(&self) -> RwLockReadGuard<'_, Vec<Arc<Job>>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn jobs_mut(&self) -> RwLockWriteGuard<'_, Vec<Arc<Job>>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("jobs", &self.len())
            .field("running", &self.is_running())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskKind};
    use std::time::Duration;

    fn quick_job(path: &str) -> Job {
        Job::new(
            path,
            vec![Task::new(TaskKind::Album, path, |_| async { Ok("ok".to_string()) })],
        )
    }

    async fn wait_for_status(job: &Job, status: JobStatus) {
        for _ in 0..200 {
            if job.status() == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached {status}, stuck at {}", job.status());
    }

    #[tokio::test]
    async fn test_add_and_lookup() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let a = scheduler.add(quick_job("a")).unwrap();
        let b = scheduler.add(quick_job("b")).unwrap();

        assert_eq!(scheduler.len(), 2);
        assert_eq!(scheduler.get(a.id()).unwrap().path(), "a");
        assert!(scheduler.get(JobId::new()).is_none());

        let order: Vec<_> = scheduler.get_all().iter().map(|j| j.id()).collect();
        assert_eq!(order, vec![a.id(), b.id()]);
        assert_eq!(scheduler.get_by_status(JobStatus::Pending).len(), 2);
    }

    #[tokio::test]
    async fn test_tick_promotes_in_fifo_order_up_to_ceiling() {
        let scheduler = Scheduler::new(SchedulerConfig::default().with_max_concurrent_jobs(1));
        let first = scheduler.add(quick_job("a")).unwrap();
        let second = scheduler.add(quick_job("b")).unwrap();

        let report = scheduler.tick();
        assert_eq!(report.promoted, vec![first.id()]);
        assert_eq!(second.status(), JobStatus::Pending);

        wait_for_status(&first, JobStatus::Completed).await;
        let report = scheduler.tick();
        assert_eq!(report.promoted, vec![second.id()]);
        wait_for_status(&second, JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_remove_requires_terminal_job() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let job = scheduler.add(quick_job("a")).unwrap();

        assert!(matches!(
            scheduler.remove(job.id()),
            Err(SyncError::InvalidStateTransition { .. })
        ));
        assert!(matches!(
            scheduler.remove(JobId::new()),
            Err(SyncError::JobNotFound { .. })
        ));

        job.stop().await;
        assert!(scheduler.remove(job.id()).is_ok());
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_clear_finished_keeps_pending() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let done = scheduler.add(quick_job("a")).unwrap();
        scheduler.add(quick_job("b")).unwrap();
        done.stop().await;

        assert_eq!(scheduler.clear_finished(), 1);
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_job_unknown_id() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        assert!(matches!(
            scheduler.stop_job(JobId::new()).await,
            Err(SyncError::JobNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_and_stop_ticker() {
        let config = SchedulerConfig::default().with_tick_interval(Duration::from_millis(10));
        let scheduler = Arc::new(Scheduler::new(config));
        scheduler.start().unwrap();
        scheduler.start().unwrap();
        assert!(scheduler.is_running());

        let job = scheduler.add(quick_job("a")).unwrap();
        wait_for_status(&job, JobStatus::Completed).await;

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert!(scheduler.is_stopped());
        assert!(matches!(
            scheduler.add(quick_job("b")),
            Err(SyncError::SchedulerStopped)
        ));
        assert!(matches!(scheduler.start(), Err(SyncError::SchedulerStopped)));
        assert_eq!(scheduler.tick(), TickReport::default());
    }
}
