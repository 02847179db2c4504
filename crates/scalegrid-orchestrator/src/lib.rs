//! scalegrid-orchestrator — the scaling orchestrator.
//!
//! Accepts scale-up/scale-down requests from a boundary layer (which has
//! already authenticated the caller) and drives the instance registry toward
//! the requested size.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator<P: Provisioner>
//!   ├── InstanceRegistry (owns instance records, lifecycle, counts)
//!   ├── LockMap          (per-service mutual exclusion)
//!   └── Provisioner      (starts/stops the actual instances)
//! ```
//!
//! # Guarantees
//!
//! - At most one scale operation is in flight per service. Conflicting
//!   requests are rejected with `ConcurrentOperation` rather than queued,
//!   so no request waits behind another service's slow provisioner.
//!   Operations on distinct services run concurrently.
//! - Provisioning and teardown run under bounded timeouts. On timeout or
//!   provisioner failure the registry is rolled back to a consistent state
//!   and the error is surfaced; nothing is fatal to the process.
//! - The requesting principal is an explicit parameter on every call, never
//!   ambient state.

pub mod error;
pub mod lock_map;
pub mod orchestrator;
pub mod provisioner;

pub use error::{OrchestratorError, OrchestratorResult};
pub use lock_map::LockMap;
pub use orchestrator::{Orchestrator, OrchestratorConfig, ScaleDirection, ScaleRequest};
pub use provisioner::{NoopProvisioner, Provisioner};
