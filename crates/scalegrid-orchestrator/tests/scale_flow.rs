//! End-to-end scaling flow over an on-disk store, including restart.

use std::time::Duration;

use scalegrid_orchestrator::{
    NoopProvisioner, Orchestrator, OrchestratorConfig, OrchestratorError,
};
use scalegrid_registry::InstanceRegistry;
use scalegrid_state::{InstanceStatus, StateStore};

fn orchestrator(store: StateStore) -> Orchestrator<NoopProvisioner> {
    Orchestrator::new(InstanceRegistry::new(store), NoopProvisioner).with_config(
        OrchestratorConfig {
            provision_timeout: Duration::from_secs(1),
            teardown_timeout: Duration::from_secs(1),
        },
    )
}

#[tokio::test]
async fn scale_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("scalegrid.redb");

    {
        let orch = orchestrator(StateStore::open(&db_path).unwrap());
        orch.register_service("svc1", 5).unwrap();
        orch.request_scale_up("svc1", "alice").await.unwrap();
        orch.request_scale_up("svc1", "alice").await.unwrap();
    }

    // "Restart": reopen the database, rebuild the orchestrator, recover.
    let orch = orchestrator(StateStore::open(&db_path).unwrap());
    let summaries = orch.recover().unwrap();
    assert_eq!(summaries.len(), 1);

    let counts = orch.counts("svc1").unwrap();
    assert_eq!(counts.current, 2);
    assert_eq!(counts.desired, 2);

    // Scaling continues where it left off; ordinals are not reused.
    let removed = orch.request_scale_down("svc1", "alice", 1).await.unwrap();
    assert_eq!(removed, vec![1]);
    let inst = orch.request_scale_up("svc1", "alice").await.unwrap();
    assert_eq!(inst.ordinal, 2);
}

#[tokio::test]
async fn recover_resolves_interrupted_operations() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("scalegrid.redb");

    {
        // Simulate a crash mid-operation by writing registry state directly.
        let registry = InstanceRegistry::new(StateStore::open(&db_path).unwrap());
        registry.register("svc1", 5).unwrap();
        let a = registry.add_instance("svc1").unwrap();
        registry
            .set_status("svc1", a.ordinal, InstanceStatus::Running)
            .unwrap();
        // Stuck mid-provision.
        registry.add_instance("svc1").unwrap();
        registry.set_desired("svc1", 2).unwrap();
    }

    let orch = orchestrator(StateStore::open(&db_path).unwrap());
    orch.recover().unwrap();

    let counts = orch.counts("svc1").unwrap();
    assert_eq!(counts.current, 1);
    assert_eq!(counts.desired, 1);

    // The swept service accepts new work immediately.
    orch.request_scale_up("svc1", "alice").await.unwrap();
    assert_eq!(orch.counts("svc1").unwrap().current, 2);
}

#[tokio::test]
async fn full_scenario_matches_expected_counts() {
    let store = StateStore::open_in_memory().unwrap();
    let orch = orchestrator(store);
    orch.register_service("svc1", 10).unwrap();

    // 0 -> 1 -> 2 -> down(1) -> 1, higher ordinal removed.
    assert_eq!(orch.counts("svc1").unwrap().current, 0);
    orch.request_scale_up("svc1", "alice").await.unwrap();
    orch.request_scale_up("svc1", "alice").await.unwrap();
    assert_eq!(orch.counts("svc1").unwrap().current, 2);

    let removed = orch.request_scale_down("svc1", "alice", 1).await.unwrap();
    assert_eq!(removed, vec![1]);
    assert_eq!(orch.counts("svc1").unwrap().current, 1);

    // Scaling down below zero is impossible: the last instance can go, but
    // asking for more than exists is rejected outright.
    let result = orch.request_scale_down("svc1", "alice", 2).await;
    assert!(matches!(
        result,
        Err(OrchestratorError::InvalidMagnitude { .. })
    ));
    assert_eq!(orch.counts("svc1").unwrap().current, 1);
}
