//! Domain types for the scalegrid state store.
//!
//! These types represent the persisted state of services and their
//! instances. All types are serializable to/from JSON for storage in redb
//! tables.

use serde::{Deserialize, Serialize};

/// Unique identifier for a service.
pub type ServiceId = String;

// ── Service ───────────────────────────────────────────────────────

/// Specification and desired state for a scalable service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    pub id: ServiceId,
    /// Number of instances the service should converge toward.
    pub desired_count: u32,
    /// Capacity ceiling; scale-up past this fails.
    pub max_instances: u32,
    /// Next ordinal to hand out. Ordinals are never reused, so an
    /// instance's ordinal is a stable identity for its whole lifetime.
    pub next_ordinal: u32,
    /// Unix timestamp (seconds) when this spec was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this spec was last updated.
    pub updated_at: u64,
}

// ── Instance ──────────────────────────────────────────────────────

/// One replica of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceRecord {
    pub service_id: ServiceId,
    /// Unique within the service, allocated monotonically.
    pub ordinal: u32,
    pub status: InstanceStatus,
    /// Unix timestamp when this instance was created.
    pub started_at: u64,
    /// Unix timestamp of last status change.
    pub updated_at: u64,
}

/// Lifecycle status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Provisioning,
    Running,
    Terminating,
    Terminated,
}

impl InstanceStatus {
    /// Whether the instance counts toward a service's current size.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Provisioning | Self::Running)
    }

    /// Legal lifecycle transitions.
    ///
    /// `Terminating → Running` is the teardown-abort path: a scale-down
    /// whose teardown deadline expired puts the instance back in service.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Provisioning, Self::Running)
                | (Self::Provisioning, Self::Terminated)
                | (Self::Running, Self::Terminating)
                | (Self::Terminating, Self::Terminated)
                | (Self::Terminating, Self::Running)
        )
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Provisioning => "provisioning",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

impl InstanceRecord {
    /// Build the composite key for the instances table.
    pub fn table_key(&self) -> String {
        instance_key(&self.service_id, self.ordinal)
    }
}

/// Composite instances-table key: `{service_id}:{ordinal:010}`.
///
/// The ordinal is zero-padded to the full `u32` width so lexicographic key
/// order is ordinal order, which makes prefix scans return instances
/// oldest-first. Service ids must not contain `:` (the registry rejects
/// them at registration); otherwise the encoding is not injective.
pub fn instance_key(service_id: &str, ordinal: u32) -> String {
    format!("{service_id}:{ordinal:010}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_key_orders_lexicographically() {
        // Includes ordinals past the 8- and 9-digit boundaries.
        let ordinals = [2u32, 10, 100, 99_999_999, 100_000_000, 1_000_000_000, u32::MAX];
        let keys: Vec<String> = ordinals.iter().map(|&o| instance_key("svc1", o)).collect();

        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn live_statuses() {
        assert!(InstanceStatus::Provisioning.is_live());
        assert!(InstanceStatus::Running.is_live());
        assert!(!InstanceStatus::Terminating.is_live());
        assert!(!InstanceStatus::Terminated.is_live());
    }

    #[test]
    fn lifecycle_transitions() {
        use InstanceStatus::*;
        assert!(Provisioning.can_transition_to(Running));
        assert!(Provisioning.can_transition_to(Terminated));
        assert!(Running.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Terminated));
        assert!(Terminating.can_transition_to(Running));

        assert!(!Running.can_transition_to(Provisioning));
        assert!(!Running.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Running));
        assert!(!Provisioning.can_transition_to(Terminating));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&InstanceStatus::Provisioning).unwrap();
        assert_eq!(json, "\"provisioning\"");
    }
}
