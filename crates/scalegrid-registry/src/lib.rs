//! scalegrid-registry — per-service instance bookkeeping.
//!
//! The `InstanceRegistry` owns all mutation of a service's instance set:
//! ordinal allocation, lifecycle transitions, and removal. Callers above it
//! (the orchestrator) decide *what* to change; the registry guarantees the
//! records stay well-formed:
//!
//! - Ordinals are unique per service and allocated monotonically (an
//!   ordinal is never reused, even after its instance is removed).
//! - `list_instances` returns instances ordered by ordinal.
//! - Status changes go through the lifecycle transition table; illegal
//!   transitions are rejected.

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::{InstanceRegistry, RecoverySummary, ServiceCounts};
