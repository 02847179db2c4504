//! Orchestrator error types.
//!
//! Every failure mode the boundary layer needs to distinguish gets its own
//! variant; it maps these to HTTP status codes.

use std::time::Duration;

use scalegrid_registry::RegistryError;
use thiserror::Error;

/// Errors that can occur during scale operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("invalid scale-down magnitude {requested} (running instances: {running})")]
    InvalidMagnitude { requested: u32, running: u32 },

    #[error("service {service_id} is at its capacity of {max} instances")]
    CapacityExceeded { service_id: String, max: u32 },

    #[error("{operation} timed out for service {service_id} after {timeout:?}")]
    Timeout {
        service_id: String,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("another scale operation is in flight for service {0}")]
    ConcurrentOperation(String),

    #[error("provisioner error: {0}")]
    Provisioner(#[source] anyhow::Error),

    #[error("registry error: {0}")]
    Registry(#[source] RegistryError),
}

/// An unknown service surfaces as `ServiceNotFound` no matter which layer
/// noticed it; everything else from the registry is wrapped.
impl From<RegistryError> for OrchestratorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ServiceNotFound(id) => Self::ServiceNotFound(id),
            other => Self::Registry(other),
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
