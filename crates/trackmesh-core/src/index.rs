use std::collections::BTreeMap;

use tracing::debug;

use crate::record::{
    Filter, FieldValue, RecordRef, RemoteRecord, ENTITY_FIELD, PROJECT_FIELD, TASK_RECORD_TYPE,
};
use crate::schema::{ParentField, RemoteSchema};
use crate::store::{RemoteStore, StoreError};

/// Per-run identity index over the remote records of one project: record by
/// id and children by parent id. Built once from the live remote state, then
/// kept in sync in memory as the run creates records. Never re-queried after
/// the initial scan, so just-created records stay visible regardless of
/// remote read visibility.
#[derive(Debug, Default)]
pub struct RemoteIndex {
    by_id: BTreeMap<String, RemoteRecord>,
    by_parent: BTreeMap<String, Vec<String>>,
}

impl RemoteIndex {
    /// Full scan of the project's linked records: every known folder record
    /// type plus tasks, filtered to records referencing the project and
    /// carrying a link id.
    pub fn scan(
        store: &dyn RemoteStore,
        schema: &RemoteSchema,
        project: &RemoteRecord,
    ) -> Result<Self, StoreError> {
        let mut index = Self::default();
        let project_filter = Filter::eq(
            PROJECT_FIELD,
            FieldValue::Reference(project.reference()),
        );
        let record_types: Vec<String> = schema
            .trackable_types()
            .map(str::to_string)
            .chain(std::iter::once(TASK_RECORD_TYPE.to_string()))
            .collect();
        for record_type in record_types {
            for record in store.find(&record_type, std::slice::from_ref(&project_filter))? {
                if record.link_id().is_none() {
                    continue;
                }
                let parent_id = scanned_parent_id(&record, schema, project);
                index.insert(record, &parent_id);
            }
        }
        debug!(records = index.len(), "remote index built");
        Ok(index)
    }

    pub fn lookup(&self, id: &str) -> Option<&RemoteRecord> {
        self.by_id.get(id)
    }

    pub fn lookup_children(&self, parent_id: &str) -> Vec<&RemoteRecord> {
        self.by_parent
            .get(parent_id)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Register a record under its parent so later lookups in the same run
    /// see it.
    pub fn insert(&mut self, record: RemoteRecord, parent_id: &str) {
        self.by_parent
            .entry(parent_id.to_string())
            .or_default()
            .push(record.id.clone());
        self.by_id.insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Best-effort parent resolution for scanned records: tasks hang off their
/// entity reference, folders off their schema parent field, everything else
/// off the project.
fn scanned_parent_id(
    record: &RemoteRecord,
    schema: &RemoteSchema,
    project: &RemoteRecord,
) -> String {
    if record.record_type == TASK_RECORD_TYPE {
        if let Some(RecordRef { id, .. }) = record.field_reference(ENTITY_FIELD) {
            return id.clone();
        }
    } else if let ParentField::Field(field) = schema.parent_field(&record.record_type) {
        if let Some(RecordRef { id, .. }) = record.field_reference(&field) {
            return id.clone();
        }
    }
    project.id.clone()
}
