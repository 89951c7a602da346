//! Service registry and dependency DAG.

use crate::{LifecycleEvent, LifecyclePhase, Service, ServiceError, ServiceResult};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Capacity of the lifecycle event channel.
const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// Registry of named services with topological start/stop.
pub struct ServiceGraph {
    /// Registered services in registration order.
    services: RwLock<Vec<Arc<dyn Service>>>,
    /// Names in the order services were started, for reverse-order stop.
    start_order: RwLock<Vec<String>>,
    /// Lifecycle event fan-out.
    events: broadcast::Sender<LifecycleEvent>,
}

impl ServiceGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
        Self {
            services: RwLock::new(Vec::new()),
            start_order: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Register a service instance under its own name.
    pub fn register(&self, service: Arc<dyn Service>) -> ServiceResult<()> {
        let mut services = self.services.write();
        if services.iter().any(|s| s.name() == service.name()) {
            return Err(ServiceError::AlreadyRegistered(service.name().to_string()));
        }
        services.push(service);
        Ok(())
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Names of all registered services, in registration order.
    pub fn service_names(&self) -> Vec<String> {
        self.services
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Resolve the stable start order.
    ///
    /// Dependencies come before their dependents; within one level,
    /// registration order breaks ties, so the same registrations always
    /// produce the same list. Fails with [`ServiceError::DependencyCycle`]
    /// before anything starts when the declarations are cyclic.
    pub fn ordered_services(&self) -> ServiceResult<Vec<Arc<dyn Service>>> {
        let services = self.services.read().clone();

        let known: HashSet<&str> = services.iter().map(|s| s.name()).collect();
        for service in &services {
            for dependency in service.dependencies() {
                if !known.contains(dependency) {
                    return Err(ServiceError::UnknownDependency {
                        service: service.name().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }
        }

        let mut ordered: Vec<Arc<dyn Service>> = Vec::with_capacity(services.len());
        let mut placed: HashSet<&str> = HashSet::with_capacity(services.len());
        while ordered.len() < services.len() {
            let mut progressed = false;
            for service in &services {
                if placed.contains(service.name()) {
                    continue;
                }
                if service
                    .dependencies()
                    .iter()
                    .all(|dep| placed.contains(dep))
                {
                    placed.insert(service.name());
                    ordered.push(Arc::clone(service));
                    progressed = true;
                }
            }
            if !progressed {
                let stuck: Vec<&str> = services
                    .iter()
                    .map(|s| s.name())
                    .filter(|name| !placed.contains(name))
                    .collect();
                return Err(ServiceError::DependencyCycle(stuck.join(", ")));
            }
        }
        Ok(ordered)
    }

    /// Start every registered service, dependencies first.
    ///
    /// A service whose declared dependencies are not started by the time
    /// its turn comes fails the whole startup with
    /// [`ServiceError::DependencyNotStarted`]; services started earlier
    /// in the same call are left running.
    pub fn start(&self) -> ServiceResult<()> {
        let ordered = self.ordered_services()?;

        for service in ordered {
            for dependency in service.dependencies() {
                let dep = self.lookup(dependency)?;
                if !dep.started() {
                    return Err(ServiceError::DependencyNotStarted {
                        service: service.name().to_string(),
                        dependency: dependency.to_string(),
                    });
                }
            }

            self.emit(service.name(), LifecyclePhase::Initialized);
            service.start()?;
            info!(service = service.name(), "Service started");
            self.emit(service.name(), LifecyclePhase::Started);
            self.start_order.write().push(service.name().to_string());
        }
        Ok(())
    }

    /// Stop started services in reverse start order.
    ///
    /// Stop errors are logged and do not abort the sequence.
    pub fn stop(&self) {
        let order = std::mem::take(&mut *self.start_order.write());
        for name in order.iter().rev() {
            let Ok(service) = self.lookup(name) else {
                continue;
            };
            if let Err(e) = service.stop() {
                warn!(service = name.as_str(), error = %e, "Service stop failed");
            } else {
                info!(service = name.as_str(), "Service stopped");
            }
            self.emit(name, LifecyclePhase::Stopped);
        }
    }

    /// Fetch a started service by name.
    ///
    /// Rejects services that exist but have not started, so consumers
    /// cannot accidentally wire themselves to a half-initialised sibling.
    pub fn get(&self, name: &str) -> ServiceResult<Arc<dyn Service>> {
        let service = self.lookup(name)?;
        if !service.started() {
            return Err(ServiceError::NotStarted(name.to_string()));
        }
        Ok(service)
    }

    /// Fetch a started service by name, downcast to its concrete type.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> ServiceResult<Arc<T>> {
        let service = self.get(name)?;
        service
            .as_any_arc()
            .downcast::<T>()
            .map_err(|_| ServiceError::TypeMismatch(name.to_string()))
    }

    fn lookup(&self, name: &str) -> ServiceResult<Arc<dyn Service>> {
        self.services
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    fn emit(&self, service: &str, phase: LifecyclePhase) {
        let _ = self.events.send(LifecycleEvent {
            service: service.to_string(),
            phase,
        });
    }
}

impl Default for ServiceGraph {
    fn default() -> Self {
        Self::new()
    }
}
