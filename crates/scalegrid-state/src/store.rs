//! StateStore — redb-backed state persistence for scalegrid.
//!
//! Provides typed CRUD operations over services and instances. All values
//! are JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Services ───────────────────────────────────────────────────

    /// Insert or update a service spec.
    pub fn put_service(&self, spec: &ServiceSpec) -> StateResult<()> {
        let value = serde_json::to_vec(spec).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            table
                .insert(spec.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(service_id = %spec.id, "service stored");
        Ok(())
    }

    /// Get a service by ID.
    pub fn get_service(&self, service_id: &str) -> StateResult<Option<ServiceSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        match table.get(service_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let spec: ServiceSpec =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(spec))
            }
            None => Ok(None),
        }
    }

    /// List all services.
    pub fn list_services(&self) -> StateResult<Vec<ServiceSpec>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let spec: ServiceSpec =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(spec);
        }
        Ok(results)
    }

    /// Delete a service by ID. Returns true if it existed.
    pub fn delete_service(&self, service_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SERVICES).map_err(map_err!(Table))?;
            existed = table.remove(service_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%service_id, existed, "service deleted");
        Ok(existed)
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update an instance record.
    pub fn put_instance(&self, record: &InstanceRecord) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an instance by service ID and ordinal.
    pub fn get_instance(
        &self,
        service_id: &str,
        ordinal: u32,
    ) -> StateResult<Option<InstanceRecord>> {
        let key = instance_key(service_id, ordinal);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: InstanceRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all instances for a service, ordered by ordinal.
    ///
    /// Ordering falls out of the zero-padded key encoding; no sort needed.
    pub fn list_instances_for_service(
        &self,
        service_id: &str,
    ) -> StateResult<Vec<InstanceRecord>> {
        let prefix = format!("{service_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: InstanceRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Delete an instance by service ID and ordinal. Returns true if it existed.
    pub fn delete_instance(&self, service_id: &str, ordinal: u32) -> StateResult<bool> {
        let key = instance_key(service_id, ordinal);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    /// Delete all instances for a service. Returns number deleted.
    pub fn delete_instances_for_service(&self, service_id: &str) -> StateResult<u32> {
        let prefix = format!("{service_id}:");
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect()
        };
        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service(id: &str) -> ServiceSpec {
        ServiceSpec {
            id: id.to_string(),
            desired_count: 0,
            max_instances: 10,
            next_ordinal: 0,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_instance(service_id: &str, ordinal: u32) -> InstanceRecord {
        InstanceRecord {
            service_id: service_id.to_string(),
            ordinal,
            status: InstanceStatus::Running,
            started_at: 1000,
            updated_at: 1000,
        }
    }

    // ── Service CRUD ───────────────────────────────────────────────

    #[test]
    fn service_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let spec = test_service("svc1");

        store.put_service(&spec).unwrap();
        let retrieved = store.get_service("svc1").unwrap();

        assert_eq!(retrieved, Some(spec));
    }

    #[test]
    fn service_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        let result = store.get_service("nope").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn service_list_all() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_service(&test_service("a")).unwrap();
        store.put_service(&test_service("b")).unwrap();
        store.put_service(&test_service("c")).unwrap();

        let all = store.list_services().unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn service_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        let mut spec = test_service("svc1");
        store.put_service(&spec).unwrap();

        spec.desired_count = 3;
        spec.updated_at = 2000;
        store.put_service(&spec).unwrap();

        let retrieved = store.get_service("svc1").unwrap().unwrap();
        assert_eq!(retrieved.desired_count, 3);
        assert_eq!(retrieved.updated_at, 2000);
    }

    #[test]
    fn service_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_service(&test_service("svc1")).unwrap();

        assert!(store.delete_service("svc1").unwrap());
        assert!(!store.delete_service("svc1").unwrap());
        assert!(store.get_service("svc1").unwrap().is_none());
    }

    // ── Instance CRUD ──────────────────────────────────────────────

    #[test]
    fn instance_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let inst = test_instance("svc1", 0);

        store.put_instance(&inst).unwrap();
        let retrieved = store.get_instance("svc1", 0).unwrap();

        assert_eq!(retrieved, Some(inst));
    }

    #[test]
    fn instance_list_for_service() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&test_instance("svc1", 0)).unwrap();
        store.put_instance(&test_instance("svc1", 1)).unwrap();
        store.put_instance(&test_instance("svc2", 0)).unwrap();

        let svc1 = store.list_instances_for_service("svc1").unwrap();
        assert_eq!(svc1.len(), 2);

        let svc2 = store.list_instances_for_service("svc2").unwrap();
        assert_eq!(svc2.len(), 1);
    }

    #[test]
    fn instance_list_is_ordinal_ordered() {
        let store = StateStore::open_in_memory().unwrap();
        // Insert out of order, including ordinals past single digits.
        for ordinal in [12, 0, 3, 100, 7] {
            store.put_instance(&test_instance("svc1", ordinal)).unwrap();
        }

        let ordinals: Vec<u32> = store
            .list_instances_for_service("svc1")
            .unwrap()
            .iter()
            .map(|r| r.ordinal)
            .collect();
        assert_eq!(ordinals, vec![0, 3, 7, 12, 100]);
    }

    #[test]
    fn instance_delete_single() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&test_instance("svc1", 0)).unwrap();

        assert!(store.delete_instance("svc1", 0).unwrap());
        assert!(store.get_instance("svc1", 0).unwrap().is_none());
    }

    #[test]
    fn instance_delete_all_for_service() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_instance(&test_instance("svc1", 0)).unwrap();
        store.put_instance(&test_instance("svc1", 1)).unwrap();
        store.put_instance(&test_instance("svc2", 0)).unwrap();

        let deleted = store.delete_instances_for_service("svc1").unwrap();
        assert_eq!(deleted, 2);
        assert!(store.list_instances_for_service("svc1").unwrap().is_empty());
        // svc2 untouched
        assert_eq!(store.list_instances_for_service("svc2").unwrap().len(), 1);
    }

    #[test]
    fn prefix_scan_does_not_leak_across_services() {
        let store = StateStore::open_in_memory().unwrap();
        // "svc" is a key prefix of "svc1" but the separator keeps scans apart.
        store.put_instance(&test_instance("svc", 0)).unwrap();
        store.put_instance(&test_instance("svc1", 0)).unwrap();

        assert_eq!(store.list_instances_for_service("svc").unwrap().len(), 1);
        assert_eq!(store.list_instances_for_service("svc1").unwrap().len(), 1);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_service(&test_service("svc1")).unwrap();
            store.put_instance(&test_instance("svc1", 0)).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_service("svc1").unwrap().is_some());
        assert_eq!(store.list_instances_for_service("svc1").unwrap().len(), 1);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_services().unwrap().is_empty());
        assert!(store.list_instances_for_service("any").unwrap().is_empty());
        assert!(!store.delete_service("nope").unwrap());
        assert!(!store.delete_instance("nope", 0).unwrap());
        assert_eq!(store.delete_instances_for_service("nope").unwrap(), 0);
    }
}
