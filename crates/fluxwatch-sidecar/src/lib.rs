//! Fluxwatch sidecar - supervises the watcher process and relays its
//! console output to any number of connected observers.
//!
//! The HTTP control surface lives in [`server`]; the process supervision
//! core is [`supervisor::WatcherSupervisor`] feeding a [`LogBroadcaster`].

mod broadcast;
mod changes;
mod control;
mod paths;
pub mod server;
pub mod supervisor;

pub use broadcast::{LogBroadcaster, SubscriberId, Subscription};
pub use changes::read_changes;
pub use control::{ControlChannel, ControlCommand, SHUTDOWN_COMMAND};
pub use paths::ensure_data_dir;

// Re-export core functionality
pub use fluxwatch_core::*;
