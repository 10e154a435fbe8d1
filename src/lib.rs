//! Workspace placeholder crate.
//!
//! Exposes the feature flags that map to the individual workspace crates
//! (`core-service`, `core-sync`). Hosts can depend on `album-sync-workspace`
//! and enable `desktop-shims` to get the desktop bootstrap without wiring each
//! crate by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreDependencies, CoreService};
#[cfg(feature = "desktop-shims")]
pub use core_sync::{JobSnapshot, JobStatus, SyncBatch};
