//! scalegrid-state — embedded state store for scalegrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for service specs and instance records.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Instance keys are `{service_id}:{ordinal}` with the ordinal zero-padded,
//! so a prefix scan over the instances table yields a service's instances
//! already ordered by ordinal.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
