//! # plasma-services
//!
//! Named service registry with a dependency-ordered lifecycle.
//!
//! Every long-lived part of the client implements [`Service`]; the
//! [`ServiceGraph`] owns the set, derives a stable topological start
//! order from the declared dependencies, starts dependencies first and
//! stops in reverse. Consumers reach sibling services through the graph,
//! which refuses to hand out services that have not started - init-order
//! bugs fail fast at the lookup site instead of surfacing later as
//! half-wired calls.

mod error;
mod graph;

pub use error::{ServiceError, ServiceResult};
pub use graph::ServiceGraph;

use std::any::Any;
use std::sync::Arc;

/// Lifecycle phases broadcast by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// The service is about to start.
    Initialized,
    /// The service started successfully.
    Started,
    /// The service stopped.
    Stopped,
}

/// A lifecycle event for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Service name.
    pub service: String,
    /// Phase entered.
    pub phase: LifecyclePhase,
}

/// A long-lived, startable part of the client.
///
/// `start` and `stop` are synchronous entry points in the style of a
/// spawned-task lifecycle: `start` flips the started flag and spawns any
/// background loops, `stop` clears the flag so cooperative loops wind
/// down at their next iteration.
pub trait Service: Send + Sync + 'static {
    /// Unique service name.
    fn name(&self) -> &'static str;

    /// Names of services that must be started before this one.
    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    /// Start the service.
    fn start(&self) -> ServiceResult<()>;

    /// Stop the service.
    fn stop(&self) -> ServiceResult<()>;

    /// Whether the service is currently started.
    fn started(&self) -> bool;

    /// Upcast for typed registry lookups.
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}
