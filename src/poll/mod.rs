//! Readiness multiplexing
//!
//! - Watch Set: bus descriptors registered/toggled/removed by the transport
//! - Pollable Registry: the `pollfd` array derived from device + Watch Set

pub mod registry;
pub mod watch;

pub use registry::PollableRegistry;
pub use watch::{WatchId, WatchKey, WatchSet};
