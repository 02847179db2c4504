//! Orchestrator — serialized per-service scaling.
//!
//! The orchestrator is the only caller of registry mutations. Each public
//! operation takes the service's lock up front (rejecting if an operation
//! is already in flight), validates against the current registry state,
//! performs the provisioner call under a deadline, and rolls the registry
//! back if the call fails or times out.

use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use scalegrid_registry::{InstanceRegistry, RecoverySummary, ServiceCounts};
use scalegrid_state::{InstanceRecord, InstanceStatus, ServiceSpec};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::lock_map::LockMap;
use crate::provisioner::Provisioner;

/// Deadlines for provisioner calls.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum time to bring one instance up.
    pub provision_timeout: Duration,
    /// Maximum time to take one instance down.
    pub teardown_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provision_timeout: Duration::from_secs(30),
            teardown_timeout: Duration::from_secs(30),
        }
    }
}

/// Direction of a scale request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

impl std::fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
        })
    }
}

/// One scale request, built per call and never persisted.
#[derive(Debug, Clone)]
pub struct ScaleRequest {
    pub service_id: String,
    /// The authenticated caller, passed through from the boundary layer.
    pub principal: String,
    pub direction: ScaleDirection,
    /// Number of instances to add or remove.
    pub magnitude: u32,
}

impl ScaleRequest {
    fn up(service_id: &str, principal: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            principal: principal.to_string(),
            direction: ScaleDirection::Up,
            magnitude: 1,
        }
    }

    fn down(service_id: &str, principal: &str, how_many: u32) -> Self {
        Self {
            service_id: service_id.to_string(),
            principal: principal.to_string(),
            direction: ScaleDirection::Down,
            magnitude: how_many,
        }
    }
}

/// Drives the registry toward requested service sizes.
pub struct Orchestrator<P> {
    registry: InstanceRegistry,
    provisioner: P,
    locks: LockMap,
    config: OrchestratorConfig,
}

impl<P: Provisioner> Orchestrator<P> {
    /// Create an orchestrator with default deadlines.
    pub fn new(registry: InstanceRegistry, provisioner: P) -> Self {
        Self {
            registry,
            provisioner,
            locks: LockMap::new(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Override the deadline configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry this orchestrator drives.
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    // ── Service management ─────────────────────────────────────────

    /// Register a service (or update its capacity ceiling).
    ///
    /// Rejected while a scale operation is in flight for the service:
    /// registration rewrites the whole service record, and doing so
    /// mid-scale could persist stale counters.
    pub fn register_service(
        &self,
        service_id: &str,
        max_instances: u32,
    ) -> OrchestratorResult<ServiceSpec> {
        let _guard = self.lock(service_id)?;
        Ok(self.registry.register(service_id, max_instances)?)
    }

    /// Remove a service and its instance records.
    ///
    /// Rejected while a scale operation is in flight for the service.
    pub fn deregister_service(&self, service_id: &str) -> OrchestratorResult<u32> {
        let _guard = self.lock(service_id)?;
        let removed = self.registry.deregister(service_id)?;
        self.locks.remove(service_id);
        Ok(removed)
    }

    /// Desired vs. current counts for a service.
    pub fn counts(&self, service_id: &str) -> OrchestratorResult<ServiceCounts> {
        Ok(self.registry.counts(service_id)?)
    }

    /// Sweep every registered service back to a consistent state.
    ///
    /// Run once at startup before accepting requests: instances left
    /// mid-provision or mid-teardown by a crash are resolved and desired
    /// counts re-derived.
    pub fn recover(&self) -> OrchestratorResult<Vec<(String, RecoverySummary)>> {
        let mut summaries = Vec::new();
        for spec in self.registry.list_services()? {
            let summary = self.registry.recover_service(&spec.id)?;
            summaries.push((spec.id, summary));
        }
        Ok(summaries)
    }

    // ── Scaling ────────────────────────────────────────────────────

    /// Add one instance to a service.
    ///
    /// Increments the desired count, provisions an instance under the
    /// provision deadline, and marks it Running. On provisioner failure or
    /// timeout the instance record and desired count are rolled back.
    pub async fn request_scale_up(
        &self,
        service_id: &str,
        principal: &str,
    ) -> OrchestratorResult<InstanceRecord> {
        let _guard = self.lock(service_id)?;
        let request = ScaleRequest::up(service_id, principal);
        self.scale_up_locked(&request).await
    }

    /// Remove `how_many` instances from a service, highest ordinal first.
    ///
    /// Returns the removed ordinals. Fails with `InvalidMagnitude` if
    /// `how_many` is zero or exceeds the number of running instances; on
    /// teardown failure or timeout the affected instance is restored to
    /// Running and the desired count re-derived.
    pub async fn request_scale_down(
        &self,
        service_id: &str,
        principal: &str,
        how_many: u32,
    ) -> OrchestratorResult<Vec<u32>> {
        let _guard = self.lock(service_id)?;
        let request = ScaleRequest::down(service_id, principal, how_many);
        self.scale_down_locked(&request).await
    }

    /// Scale a service to an absolute target size.
    ///
    /// Dispatches to the up/down primitives under a single hold of the
    /// service lock. Not transactional across steps: if the n-th step
    /// fails, the n-1 completed steps stand and the error is returned.
    pub async fn scale_to(
        &self,
        service_id: &str,
        principal: &str,
        target: u32,
    ) -> OrchestratorResult<u32> {
        let _guard = self.lock(service_id)?;
        let current = self.registry.counts(service_id)?.current;

        if target > current {
            for _ in 0..(target - current) {
                let request = ScaleRequest::up(service_id, principal);
                self.scale_up_locked(&request).await?;
            }
        } else if target < current {
            let request = ScaleRequest::down(service_id, principal, current - target);
            self.scale_down_locked(&request).await?;
        } else {
            debug!(%service_id, target, "already at target, no scaling needed");
        }

        Ok(self.registry.counts(service_id)?.current)
    }

    // ── Internal ───────────────────────────────────────────────────

    fn lock(&self, service_id: &str) -> OrchestratorResult<OwnedMutexGuard<()>> {
        self.locks
            .try_acquire(service_id)
            .ok_or_else(|| OrchestratorError::ConcurrentOperation(service_id.to_string()))
    }

    async fn scale_up_locked(&self, request: &ScaleRequest) -> OrchestratorResult<InstanceRecord> {
        let service_id = request.service_id.as_str();
        let spec = self.registry.get_service(service_id)?;
        let counts = self.registry.counts(service_id)?;

        if counts.current >= spec.max_instances {
            return Err(OrchestratorError::CapacityExceeded {
                service_id: service_id.to_string(),
                max: spec.max_instances,
            });
        }

        info!(
            %service_id,
            principal = %request.principal,
            direction = %request.direction,
            current = counts.current,
            "scale request accepted"
        );

        let prev_desired = spec.desired_count;
        self.registry.set_desired(service_id, prev_desired + 1)?;
        let inst = self.registry.add_instance(service_id)?;

        match timeout(
            self.config.provision_timeout,
            self.provisioner.provision(service_id, inst.ordinal),
        )
        .await
        {
            Ok(Ok(())) => {
                let inst =
                    self.registry
                        .set_status(service_id, inst.ordinal, InstanceStatus::Running)?;
                info!(%service_id, ordinal = inst.ordinal, "instance running");
                Ok(inst)
            }
            Ok(Err(e)) => {
                warn!(%service_id, ordinal = inst.ordinal, error = %e, "provision failed");
                self.rollback_provision(service_id, inst.ordinal, prev_desired);
                Err(OrchestratorError::Provisioner(e))
            }
            Err(_elapsed) => {
                warn!(
                    %service_id,
                    ordinal = inst.ordinal,
                    timeout = ?self.config.provision_timeout,
                    "provision timed out"
                );
                self.rollback_provision(service_id, inst.ordinal, prev_desired);
                Err(OrchestratorError::Timeout {
                    service_id: service_id.to_string(),
                    operation: "provision",
                    timeout: self.config.provision_timeout,
                })
            }
        }
    }

    async fn scale_down_locked(&self, request: &ScaleRequest) -> OrchestratorResult<Vec<u32>> {
        let service_id = request.service_id.as_str();
        let spec = self.registry.get_service(service_id)?;

        let running: Vec<u32> = self
            .registry
            .list_instances(service_id)?
            .iter()
            .filter(|r| r.status == InstanceStatus::Running)
            .map(|r| r.ordinal)
            .collect();

        if request.magnitude == 0 || request.magnitude as usize > running.len() {
            return Err(OrchestratorError::InvalidMagnitude {
                requested: request.magnitude,
                running: running.len() as u32,
            });
        }

        info!(
            %service_id,
            principal = %request.principal,
            direction = %request.direction,
            how_many = request.magnitude,
            running = running.len(),
            "scale request accepted"
        );

        self.registry.set_desired(
            service_id,
            spec.desired_count.saturating_sub(request.magnitude),
        )?;

        // Victims: highest ordinal first (most recently added).
        let victims = running
            .into_iter()
            .rev()
            .take(request.magnitude as usize);

        let mut removed = Vec::new();
        for ordinal in victims {
            self.registry
                .set_status(service_id, ordinal, InstanceStatus::Terminating)?;

            match timeout(
                self.config.teardown_timeout,
                self.provisioner.teardown(service_id, ordinal),
            )
            .await
            {
                Ok(Ok(())) => {
                    self.registry
                        .set_status(service_id, ordinal, InstanceStatus::Terminated)?;
                    self.registry.remove_instance(service_id, ordinal)?;
                    debug!(%service_id, ordinal, "instance terminated");
                    removed.push(ordinal);
                }
                Ok(Err(e)) => {
                    warn!(%service_id, ordinal, error = %e, "teardown failed");
                    self.rollback_teardown(service_id, ordinal);
                    return Err(OrchestratorError::Provisioner(e));
                }
                Err(_elapsed) => {
                    warn!(
                        %service_id,
                        ordinal,
                        timeout = ?self.config.teardown_timeout,
                        "teardown timed out"
                    );
                    self.rollback_teardown(service_id, ordinal);
                    return Err(OrchestratorError::Timeout {
                        service_id: service_id.to_string(),
                        operation: "teardown",
                        timeout: self.config.teardown_timeout,
                    });
                }
            }
        }

        info!(%service_id, removed = removed.len(), "scaled down");
        Ok(removed)
    }

    /// Undo a failed scale-up: drop the pending instance, restore desired.
    ///
    /// Rollback failures are logged, not returned — the original error is
    /// the one the caller needs, and `recover()` sweeps up any residue.
    fn rollback_provision(&self, service_id: &str, ordinal: u32, prev_desired: u32) {
        if let Err(e) = self.registry.remove_instance(service_id, ordinal) {
            error!(%service_id, ordinal, error = %e, "provision rollback failed");
        }
        if let Err(e) = self.registry.set_desired(service_id, prev_desired) {
            error!(%service_id, error = %e, "desired-count rollback failed");
        }
    }

    /// Undo a failed teardown: put the instance back in service, re-derive
    /// desired from what is actually live.
    fn rollback_teardown(&self, service_id: &str, ordinal: u32) {
        if let Err(e) = self
            .registry
            .set_status(service_id, ordinal, InstanceStatus::Running)
        {
            error!(%service_id, ordinal, error = %e, "teardown rollback failed");
        }
        match self.registry.counts(service_id) {
            Ok(counts) => {
                if let Err(e) = self.registry.set_desired(service_id, counts.current) {
                    error!(%service_id, error = %e, "desired-count rollback failed");
                }
            }
            Err(e) => error!(%service_id, error = %e, "desired-count rollback failed"),
        }
    }
}
