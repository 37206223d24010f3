//! Fluxwatch Core - Platform-independent abstractions and configurations
//!
//! This crate provides the shared types for the sidecar service: the
//! configuration, error taxonomy, the captured-log data model and the
//! traits implemented by the platform-specific watcher process managers.

mod config;
mod error;
mod log;
mod process;

pub use config::*;
pub use error::*;
pub use log::*;
pub use process::*;
