//! Registry error types.

use scalegrid_state::InstanceStatus;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid service id {0:?}: must be non-empty and must not contain ':'")]
    InvalidServiceId(String),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("no instance with ordinal {ordinal} in service {service_id}")]
    InvalidIndex { service_id: String, ordinal: u32 },

    #[error("illegal lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: InstanceStatus,
        to: InstanceStatus,
    },

    #[error("state store error: {0}")]
    State(#[from] scalegrid_state::StateError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
