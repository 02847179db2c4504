//! InstanceRegistry — the single owner of a service's instance records.
//!
//! Sits directly on the `StateStore`. Every mutation of instance state in
//! the system goes through this type; the orchestrator never touches the
//! store itself.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use scalegrid_state::*;

use crate::error::{RegistryError, RegistryResult};

/// Desired vs. current size of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceCounts {
    /// The count the service should converge toward.
    pub desired: u32,
    /// Instances currently live (Provisioning or Running).
    pub current: u32,
}

/// What a crash-recovery sweep did for one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Half-provisioned instances that were dropped.
    pub removed: u32,
    /// Half-terminated instances that were put back in service.
    pub restored: u32,
}

/// Tracks live instance identities and counts per service.
#[derive(Clone)]
pub struct InstanceRegistry {
    store: StateStore,
}

impl InstanceRegistry {
    /// Create a registry over the given store.
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    // ── Services ───────────────────────────────────────────────────

    /// Register a service, or update its capacity ceiling if it already
    /// exists. Desired count and ordinal allocation survive re-registration.
    ///
    /// Service ids must be non-empty and must not contain `:` — that is the
    /// instance-key separator, and an id containing it would make one
    /// service's prefix scans match another's records.
    pub fn register(&self, service_id: &str, max_instances: u32) -> RegistryResult<ServiceSpec> {
        if service_id.is_empty() || service_id.contains(':') {
            return Err(RegistryError::InvalidServiceId(service_id.to_string()));
        }
        let now = epoch_secs();
        let spec = match self.store.get_service(service_id)? {
            Some(mut existing) => {
                existing.max_instances = max_instances;
                existing.updated_at = now;
                existing
            }
            None => ServiceSpec {
                id: service_id.to_string(),
                desired_count: 0,
                max_instances,
                next_ordinal: 0,
                created_at: now,
                updated_at: now,
            },
        };
        self.store.put_service(&spec)?;
        info!(%service_id, max_instances, "service registered");
        Ok(spec)
    }

    /// Look up a service spec, failing if it is unknown.
    pub fn get_service(&self, service_id: &str) -> RegistryResult<ServiceSpec> {
        self.store
            .get_service(service_id)?
            .ok_or_else(|| RegistryError::ServiceNotFound(service_id.to_string()))
    }

    /// List all registered services.
    pub fn list_services(&self) -> RegistryResult<Vec<ServiceSpec>> {
        Ok(self.store.list_services()?)
    }

    /// Remove a service and all of its instance records.
    ///
    /// Returns the number of instance records removed.
    pub fn deregister(&self, service_id: &str) -> RegistryResult<u32> {
        if !self.store.delete_service(service_id)? {
            return Err(RegistryError::ServiceNotFound(service_id.to_string()));
        }
        let removed = self.store.delete_instances_for_service(service_id)?;
        info!(%service_id, instances_removed = removed, "service deregistered");
        Ok(removed)
    }

    /// Overwrite a service's desired count.
    pub fn set_desired(&self, service_id: &str, desired: u32) -> RegistryResult<()> {
        let mut spec = self.get_service(service_id)?;
        spec.desired_count = desired;
        spec.updated_at = epoch_secs();
        self.store.put_service(&spec)?;
        Ok(())
    }

    /// Desired vs. current instance counts for a service.
    pub fn counts(&self, service_id: &str) -> RegistryResult<ServiceCounts> {
        let spec = self.get_service(service_id)?;
        let current = self
            .store
            .list_instances_for_service(service_id)?
            .iter()
            .filter(|r| r.status.is_live())
            .count() as u32;
        Ok(ServiceCounts {
            desired: spec.desired_count,
            current,
        })
    }

    // ── Instances ──────────────────────────────────────────────────

    /// List a service's instances, ordered by ordinal.
    pub fn list_instances(&self, service_id: &str) -> RegistryResult<Vec<InstanceRecord>> {
        // Distinguish "no instances" from "no such service".
        self.get_service(service_id)?;
        Ok(self.store.list_instances_for_service(service_id)?)
    }

    /// Add an instance to a service in the `Provisioning` state.
    ///
    /// The ordinal comes from the service's allocation counter and is never
    /// handed out twice.
    pub fn add_instance(&self, service_id: &str) -> RegistryResult<InstanceRecord> {
        let mut spec = self.get_service(service_id)?;
        let now = epoch_secs();

        let record = InstanceRecord {
            service_id: service_id.to_string(),
            ordinal: spec.next_ordinal,
            status: InstanceStatus::Provisioning,
            started_at: now,
            updated_at: now,
        };
        self.store.put_instance(&record)?;

        spec.next_ordinal += 1;
        spec.updated_at = now;
        self.store.put_service(&spec)?;

        debug!(%service_id, ordinal = record.ordinal, "instance added");
        Ok(record)
    }

    /// Remove an instance record.
    pub fn remove_instance(&self, service_id: &str, ordinal: u32) -> RegistryResult<()> {
        self.get_service(service_id)?;
        if !self.store.delete_instance(service_id, ordinal)? {
            return Err(RegistryError::InvalidIndex {
                service_id: service_id.to_string(),
                ordinal,
            });
        }
        debug!(%service_id, ordinal, "instance removed");
        Ok(())
    }

    /// Transition an instance to a new lifecycle status.
    ///
    /// Fails with `InvalidTransition` if the step is not in the lifecycle
    /// table, leaving the record untouched.
    pub fn set_status(
        &self,
        service_id: &str,
        ordinal: u32,
        next: InstanceStatus,
    ) -> RegistryResult<InstanceRecord> {
        self.get_service(service_id)?;
        let mut record = self
            .store
            .get_instance(service_id, ordinal)?
            .ok_or_else(|| RegistryError::InvalidIndex {
                service_id: service_id.to_string(),
                ordinal,
            })?;

        if !record.status.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }

        debug!(%service_id, ordinal, from = %record.status, to = %next, "status transition");
        record.status = next;
        record.updated_at = epoch_secs();
        self.store.put_instance(&record)?;
        Ok(record)
    }

    // ── Recovery ───────────────────────────────────────────────────

    /// Sweep one service back to a consistent state after a crash.
    ///
    /// Instances stuck mid-operation are resolved pessimistically: a
    /// `Provisioning` record may never have produced a real instance, so it
    /// is dropped; a `Terminating` record still has one, so it is restored
    /// to `Running`. The desired count is then re-derived from what is
    /// actually live.
    pub fn recover_service(&self, service_id: &str) -> RegistryResult<RecoverySummary> {
        let mut summary = RecoverySummary::default();

        for record in self.list_instances(service_id)? {
            match record.status {
                InstanceStatus::Provisioning => {
                    warn!(%service_id, ordinal = record.ordinal, "dropping half-provisioned instance");
                    self.store.delete_instance(service_id, record.ordinal)?;
                    summary.removed += 1;
                }
                InstanceStatus::Terminating => {
                    warn!(%service_id, ordinal = record.ordinal, "restoring half-terminated instance");
                    self.set_status(service_id, record.ordinal, InstanceStatus::Running)?;
                    summary.restored += 1;
                }
                InstanceStatus::Terminated => {
                    // Finished terminating but not yet deleted.
                    self.store.delete_instance(service_id, record.ordinal)?;
                    summary.removed += 1;
                }
                InstanceStatus::Running => {}
            }
        }

        let counts = self.counts(service_id)?;
        if counts.desired != counts.current {
            self.set_desired(service_id, counts.current)?;
        }

        if summary != RecoverySummary::default() {
            info!(
                %service_id,
                removed = summary.removed,
                restored = summary.restored,
                "service recovered"
            );
        }
        Ok(summary)
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
