//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the album sync core:
//! - Logging and tracing infrastructure
//! - Configuration management (data root, catalog database, scheduler tuning)
//! - Event bus system for job lifecycle and catalog notifications
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes the logging conventions, configuration validation and event
//! broadcasting used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
