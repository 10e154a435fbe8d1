//! # Event Bus System
//!
//! Provides an event-driven architecture for the album sync core using
//! `tokio::sync::broadcast`. Jobs, the scheduler and the catalog publish typed
//! events; hosts subscribe to drive progress UIs or audit logs.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for sync and library domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Job/Scheduler├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//! ┌──────────────┐     emit      │ (broadcast│                  └────────────┘
//! │ Catalog      ├──────────────>│  channel) │
//! └──────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::JobStarted {
//!         job_id: "job-1".to_string(),
//!         path: "2024".to_string(),
//!         total: 3,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Job started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishing without subscribers returns `Err`; emitters treat that as a
//! no-op.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Job and scheduler lifecycle events
    Sync(SyncEvent),
    /// Catalog write events
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::JobFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::JobCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::TaskFinished { success: false, .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::BatchQueued { .. })
            | CoreEvent::Sync(SyncEvent::JobCompleted { .. })
            | CoreEvent::Sync(SyncEvent::JobStopped { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted while jobs move through the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A sync request produced a batch of jobs.
    BatchQueued {
        batch_id: String,
        /// Folder the sync was requested for, relative to the data root.
        path: String,
        job_count: usize,
    },
    /// A job was admitted and began draining its queue.
    JobStarted {
        job_id: String,
        path: String,
        total: usize,
    },
    /// A single task finished, successfully or not.
    TaskFinished {
        job_id: String,
        /// File or folder path the task operated on.
        item: String,
        /// `"album"` or `"media"`.
        kind: String,
        success: bool,
        remaining: usize,
    },
    JobPaused {
        job_id: String,
    },
    JobResumed {
        job_id: String,
    },
    /// The job drained its queue.
    JobCompleted {
        job_id: String,
        total: usize,
        /// Tasks whose result carries an error.
        failed: usize,
    },
    /// The job honoured a stop request or a cancellation.
    JobStopped {
        job_id: String,
        reason: Option<String>,
    },
    /// The job loop crashed.
    JobFailed {
        job_id: String,
        reason: String,
    },
    /// A finished job outlived its retention and was dropped.
    JobEvicted {
        job_id: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::BatchQueued { .. } => "Sync batch queued",
            SyncEvent::JobStarted { .. } => "Job started",
            SyncEvent::TaskFinished { .. } => "Task finished",
            SyncEvent::JobPaused { .. } => "Job paused",
            SyncEvent::JobResumed { .. } => "Job resumed",
            SyncEvent::JobCompleted { .. } => "Job completed",
            SyncEvent::JobStopped { .. } => "Job stopped",
            SyncEvent::JobFailed { .. } => "Job failed",
            SyncEvent::JobEvicted { .. } => "Job evicted",
        }
    }

    /// Job the event belongs to, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            SyncEvent::BatchQueued { .. } => None,
            SyncEvent::JobStarted { job_id, .. }
            | SyncEvent::TaskFinished { job_id, .. }
            | SyncEvent::JobPaused { job_id }
            | SyncEvent::JobResumed { job_id }
            | SyncEvent::JobCompleted { job_id, .. }
            | SyncEvent::JobStopped { job_id, .. }
            | SyncEvent::JobFailed { job_id, .. }
            | SyncEvent::JobEvicted { job_id } => Some(job_id),
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to catalog content changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A folder was recorded as an album for the first time.
    AlbumCreated { album_id: String, path: String },
    /// A media file was written to the catalog.
    MediaIngested {
        media_id: String,
        path: String,
        /// `"created"` or `"updated"`.
        outcome: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::AlbumCreated { .. } => "Album created",
            LibraryEvent::MediaIngested { .. } => "Media ingested",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream, SyncEvent};
///
/// let event_bus = EventBus::new(100);
/// let job_events = EventStream::new(event_bus.subscribe()).filter(|event| {
///     matches!(event, CoreEvent::Sync(e) if e.job_id() == Some("job-1"))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started(job_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::JobStarted {
            job_id: job_id.to_string(),
            path: "2024".to_string(),
            total: 3,
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::default();
        assert!(bus.emit(started("job-1")).is_err());
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let sent = bus.emit(started("job-1")).unwrap();
        assert_eq!(sent, 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received, started("job-1"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.emit(started("job-1")).unwrap();

        assert_eq!(sub1.recv().await.unwrap(), started("job-1"));
        assert_eq!(sub2.recv().await.unwrap(), started("job-1"));
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).filter(|event| {
            matches!(event, CoreEvent::Sync(e) if e.job_id() == Some("job-2"))
        });

        bus.emit(started("job-1")).unwrap();
        bus.emit(CoreEvent::Library(LibraryEvent::AlbumCreated {
            album_id: "a".to_string(),
            path: "2024".to_string(),
        }))
        .unwrap();
        bus.emit(started("job-2")).unwrap();

        assert_eq!(stream.recv().await.unwrap(), started("job-2"));
    }

    #[tokio::test]
    async fn test_event_stream_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        assert!(stream.try_recv().is_none());

        bus.emit(started("job-1")).unwrap();
        assert!(matches!(stream.try_recv(), Some(Ok(_))));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(started(&format!("job-{i}"))).unwrap();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
        assert!(sub.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_when_bus_dropped() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();
        drop(bus);

        assert!(matches!(sub.recv().await, Err(RecvError::Closed)));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::JobFailed {
            job_id: "j".to_string(),
            reason: "panic".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let partial = CoreEvent::Sync(SyncEvent::JobCompleted {
            job_id: "j".to_string(),
            total: 3,
            failed: 1,
        });
        assert_eq!(partial.severity(), EventSeverity::Warning);

        let clean = CoreEvent::Sync(SyncEvent::JobCompleted {
            job_id: "j".to_string(),
            total: 3,
            failed: 0,
        });
        assert_eq!(clean.severity(), EventSeverity::Info);

        assert_eq!(started("j").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Sync(SyncEvent::JobEvicted {
            job_id: "job-9".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Sync");
        assert_eq!(json["payload"]["event"], "JobEvicted");
        assert_eq!(json["payload"]["job_id"], "job-9");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(started("j").description(), "Job started");
        let media = CoreEvent::Library(LibraryEvent::MediaIngested {
            media_id: "m".to_string(),
            path: "2024/a.jpg".to_string(),
            outcome: "created".to_string(),
        });
        assert_eq!(media.description(), "Media ingested");
    }
}
