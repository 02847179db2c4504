//! Provisioner — the seam between the orchestrator and real instances.
//!
//! The orchestrator decides *which* instance to start or stop; the
//! provisioner does the actual work (spawn a container, call a cloud API,
//! warm a pool slot). Implementations may take arbitrarily long — the
//! orchestrator wraps every call in a deadline and rolls back on expiry.

use std::future::Future;

use tracing::debug;

/// Starts and stops the real instances behind registry records.
///
/// Both operations should be idempotent per `(service_id, ordinal)`: a
/// provision cut short by the orchestrator's deadline may leave work behind
/// that a later provision of the same service must tolerate, and a teardown
/// may be re-issued for an instance that is already gone.
pub trait Provisioner: Send + Sync {
    /// Bring up the instance with the given ordinal.
    fn provision(
        &self,
        service_id: &str,
        ordinal: u32,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Tear down the instance with the given ordinal.
    fn teardown(
        &self,
        service_id: &str,
        ordinal: u32,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// A provisioner that does nothing, instantly.
///
/// Useful for wiring tests and for deployments where instance lifecycles
/// are managed entirely out-of-band.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvisioner;

impl Provisioner for NoopProvisioner {
    async fn provision(&self, service_id: &str, ordinal: u32) -> anyhow::Result<()> {
        debug!(%service_id, ordinal, "noop provision");
        Ok(())
    }

    async fn teardown(&self, service_id: &str, ordinal: u32) -> anyhow::Result<()> {
        debug!(%service_id, ordinal, "noop teardown");
        Ok(())
    }
}
