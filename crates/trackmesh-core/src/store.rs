use std::collections::BTreeSet;
use std::sync::Mutex;

use thiserror::Error;

use crate::record::{FieldMap, Filter, RemoteRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse store snapshot: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("No {0} record with id {1}")]
    UnknownRecord(String, String),
    #[error("Store rejected request: {0}")]
    Rejected(String),
}

/// Boundary over the remote flat record service. Lookups take simple
/// equality filters; the reserved field name `id` matches the record id.
pub trait RemoteStore {
    fn find_one(
        &self,
        record_type: &str,
        filters: &[Filter],
    ) -> Result<Option<RemoteRecord>, StoreError>;

    fn find(&self, record_type: &str, filters: &[Filter]) -> Result<Vec<RemoteRecord>, StoreError>;

    fn create(&self, record_type: &str, fields: FieldMap) -> Result<RemoteRecord, StoreError>;

    fn update(
        &self,
        record_type: &str,
        id: &str,
        fields: FieldMap,
    ) -> Result<RemoteRecord, StoreError>;
}

/// In-memory store. Doubles as the test double for the engine: it records a
/// call log so ordering assertions do not need output capture, and specific
/// record ids can be armed to reject updates.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    records: Vec<RemoteRecord>,
    next_id: u64,
    calls: Vec<String>,
    failing_update_ids: BTreeSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, keeping its id. Not logged.
    pub fn seed(&self, record: RemoteRecord) {
        let mut inner = self.lock();
        inner.records.push(record);
    }

    pub fn records(&self) -> Vec<RemoteRecord> {
        self.lock().records.clone()
    }

    pub fn record(&self, id: &str) -> Option<RemoteRecord> {
        self.lock().records.iter().find(|record| record.id == id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Make every subsequent update of the given record id fail.
    pub fn fail_updates_of(&self, id: &str) {
        self.lock().failing_update_ids.insert(id.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RemoteStore for MemoryStore {
    fn find_one(
        &self,
        record_type: &str,
        filters: &[Filter],
    ) -> Result<Option<RemoteRecord>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(format!("find_one {record_type}"));
        Ok(inner
            .records
            .iter()
            .find(|record| {
                record.record_type == record_type
                    && filters.iter().all(|filter| filter.matches(record))
            })
            .cloned())
    }

    fn find(&self, record_type: &str, filters: &[Filter]) -> Result<Vec<RemoteRecord>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(format!("find {record_type}"));
        Ok(inner
            .records
            .iter()
            .filter(|record| {
                record.record_type == record_type
                    && filters.iter().all(|filter| filter.matches(record))
            })
            .cloned()
            .collect())
    }

    fn create(&self, record_type: &str, fields: FieldMap) -> Result<RemoteRecord, StoreError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("rec-{:04}", inner.next_id);
        inner.calls.push(format!("create {record_type} {id}"));
        let record = RemoteRecord::new(id, record_type, fields);
        inner.records.push(record.clone());
        Ok(record)
    }

    fn update(
        &self,
        record_type: &str,
        id: &str,
        fields: FieldMap,
    ) -> Result<RemoteRecord, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(format!("update {record_type} {id}"));
        if inner.failing_update_ids.contains(id) {
            return Err(StoreError::Rejected(format!(
                "update of {record_type} {id} refused"
            )));
        }
        let record = inner
            .records
            .iter_mut()
            .find(|record| record.record_type == record_type && record.id == id)
            .ok_or_else(|| StoreError::UnknownRecord(record_type.to_string(), id.to_string()))?;
        for (key, value) in fields {
            record.fields.insert(key, value);
        }
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, CODE_FIELD};
    use pretty_assertions::assert_eq;

    fn fields(code: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(CODE_FIELD.to_string(), FieldValue::text(code));
        fields
    }

    #[test]
    fn create_then_find_by_filter() {
        let store = MemoryStore::new();
        let created = store.create("Asset", fields("heroA")).expect("create");
        store.create("Asset", fields("heroB")).expect("create");

        let found = store
            .find_one("Asset", &[Filter::eq(CODE_FIELD, FieldValue::text("heroA"))])
            .expect("find_one")
            .expect("record");
        assert_eq!(found.id, created.id);

        let all = store.find("Asset", &[]).expect("find");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn find_respects_record_type() {
        let store = MemoryStore::new();
        store.create("Asset", fields("heroA")).expect("create");
        let tasks = store.find("Task", &[]).expect("find");
        assert!(tasks.is_empty());
    }

    #[test]
    fn update_merges_fields() {
        let store = MemoryStore::new();
        let created = store.create("Asset", fields("heroA")).expect("create");

        let mut change = FieldMap::new();
        change.insert("link_id".to_string(), FieldValue::text("f1"));
        let updated = store.update("Asset", &created.id, change).expect("update");
        assert_eq!(updated.field_text(CODE_FIELD), Some("heroA"));
        assert_eq!(updated.field_text("link_id"), Some("f1"));
    }

    #[test]
    fn update_of_unknown_record_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update("Asset", "ghost", FieldMap::new()),
            Err(StoreError::UnknownRecord(_, _))
        ));
    }

    #[test]
    fn armed_update_failure_fires() {
        let store = MemoryStore::new();
        let created = store.create("Asset", fields("heroA")).expect("create");
        store.fail_updates_of(&created.id);
        assert!(matches!(
            store.update("Asset", &created.id, FieldMap::new()),
            Err(StoreError::Rejected(_))
        ));
    }

    #[test]
    fn call_log_preserves_order() {
        let store = MemoryStore::new();
        store.create("Asset", fields("heroA")).expect("create");
        store.find_one("Asset", &[]).expect("find_one");
        let calls = store.calls();
        assert_eq!(calls[0], "create Asset rec-0001");
        assert_eq!(calls[1], "find_one Asset");
    }
}
