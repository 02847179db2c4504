//! redb table definitions for the scalegrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Instance keys embed a zero-padded ordinal so lexicographic key
//! order equals ordinal order.

use redb::TableDefinition;

/// Service specs keyed by `{service_id}`.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Instance records keyed by `{service_id}:{ordinal:010}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
