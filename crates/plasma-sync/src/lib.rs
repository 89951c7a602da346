//! # plasma-sync
//!
//! The event-to-state pipeline:
//! - [`EventWatcher`]: finality-delayed, deduplicated polling of anchor
//!   contract events, fanned out to subscribers per event name
//! - [`EventHandler`]: lifts raw anchor events into domain events and
//!   applies them to the chain service
//! - [`SyncPipeline`]: imports received transactions from the operator,
//!   proof-checking each one and queueing failures for retry
//!
//! All loops are cooperative: a started flag is checked every iteration
//! and the surrounding service's `stop` flips it, so the tasks wind down
//! at their next wake-up.

mod error;
mod events;
mod handler;
mod pipeline;
mod watcher;

pub use error::{SyncError, SyncResult};
pub use events::{ChainEvent, EventFanout};
pub use handler::EventHandler;
pub use pipeline::SyncPipeline;
pub use watcher::EventWatcher;

/// Raw anchor event names the client watches.
pub const WATCHED_EVENTS: [&str; 4] = [
    events::DEPOSIT_EVENT,
    events::BLOCK_SUBMITTED_EVENT,
    events::EXIT_STARTED_EVENT,
    events::EXIT_FINALIZED_EVENT,
];
