//! Error types for service lifecycle management.

use thiserror::Error;

/// Service registry and lifecycle errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The dependency declarations contain a cycle.
    #[error("Dependency cycle among services: {0}")]
    DependencyCycle(String),

    /// A service was asked to start before one of its dependencies.
    #[error("Service {service} depends on {dependency}, which is not started")]
    DependencyNotStarted {
        service: String,
        dependency: String,
    },

    /// A declared dependency is not registered.
    #[error("Service {service} depends on unknown service {dependency}")]
    UnknownDependency {
        service: String,
        dependency: String,
    },

    /// A service name was registered twice.
    #[error("Service already registered: {0}")]
    AlreadyRegistered(String),

    /// A consumer asked for a service that was never registered.
    #[error("Service not found: {0}")]
    NotFound(String),

    /// A consumer asked for a service that has not started yet.
    #[error("Service not started: {0}")]
    NotStarted(String),

    /// A typed lookup named the wrong concrete type.
    #[error("Service {0} has a different concrete type")]
    TypeMismatch(String),

    /// A service failed internally while starting or stopping.
    #[error("Service {service} failed: {message}")]
    Internal { service: String, message: String },
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
