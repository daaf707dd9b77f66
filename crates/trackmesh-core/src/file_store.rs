use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::record::{FieldMap, Filter, RemoteRecord};
use crate::store::{RemoteStore, StoreError};

/// Remote store backed by a JSON snapshot file. A missing file reads as an
/// empty store. Mutations take an exclusive lock on a sidecar file so
/// concurrent invocations do not interleave read-modify-write cycles.
pub struct JsonStore {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    records: Vec<StoredRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    record_type: String,
    #[serde(default)]
    fields: FieldMap,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    updated_at: String,
}

impl StoredRecord {
    fn to_record(&self) -> RemoteRecord {
        RemoteRecord::new(&self.id, &self.record_type, self.fields.clone())
    }
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_snapshot(&self) -> Result<Snapshot, StoreError> {
        if !self.path.is_file() {
            return Ok(Snapshot::default());
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Snapshot::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn lock(&self) -> Result<File, StoreError> {
        let lock_path = self.path.with_extension("lock");
        let lock_file = File::create(lock_path)?;
        lock_file.lock_exclusive()?;
        Ok(lock_file)
    }

    fn matching<'a>(
        snapshot: &'a Snapshot,
        record_type: &str,
        filters: &[Filter],
    ) -> impl Iterator<Item = &'a StoredRecord> + 'a {
        let filters = filters.to_vec();
        let record_type = record_type.to_string();
        snapshot.records.iter().filter(move |stored| {
            stored.record_type == record_type
                && filters
                    .iter()
                    .all(|filter| filter.matches(&stored.to_record()))
        })
    }
}

impl RemoteStore for JsonStore {
    fn find_one(
        &self,
        record_type: &str,
        filters: &[Filter],
    ) -> Result<Option<RemoteRecord>, StoreError> {
        let snapshot = self.read_snapshot()?;
        let found = Self::matching(&snapshot, record_type, filters)
            .next()
            .map(StoredRecord::to_record);
        Ok(found)
    }

    fn find(&self, record_type: &str, filters: &[Filter]) -> Result<Vec<RemoteRecord>, StoreError> {
        let snapshot = self.read_snapshot()?;
        Ok(Self::matching(&snapshot, record_type, filters)
            .map(StoredRecord::to_record)
            .collect())
    }

    fn create(&self, record_type: &str, fields: FieldMap) -> Result<RemoteRecord, StoreError> {
        let _lock = self.lock()?;
        let mut snapshot = self.read_snapshot()?;
        let now = Utc::now().to_rfc3339();
        let stored = StoredRecord {
            id: Ulid::new().to_string().to_lowercase(),
            record_type: record_type.to_string(),
            fields,
            created_at: now.clone(),
            updated_at: now,
        };
        let record = stored.to_record();
        snapshot.records.push(stored);
        self.write_snapshot(&snapshot)?;
        Ok(record)
    }

    fn update(
        &self,
        record_type: &str,
        id: &str,
        fields: FieldMap,
    ) -> Result<RemoteRecord, StoreError> {
        let _lock = self.lock()?;
        let mut snapshot = self.read_snapshot()?;
        let stored = snapshot
            .records
            .iter_mut()
            .find(|stored| stored.record_type == record_type && stored.id == id)
            .ok_or_else(|| StoreError::UnknownRecord(record_type.to_string(), id.to_string()))?;
        for (key, value) in fields {
            stored.fields.insert(key, value);
        }
        stored.updated_at = Utc::now().to_rfc3339();
        let record = stored.to_record();
        self.write_snapshot(&snapshot)?;
        Ok(record)
    }
}
