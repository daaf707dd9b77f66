use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Custom field on remote records holding the linked local node id.
pub const LINK_ID_FIELD: &str = "link_id";
/// Custom field on remote records holding the link status.
pub const LINK_STATUS_FIELD: &str = "link_status";

pub const PROJECT_FIELD: &str = "project";
pub const ENTITY_FIELD: &str = "entity";
pub const STEP_FIELD: &str = "step";
pub const CODE_FIELD: &str = "code";
pub const CONTENT_FIELD: &str = "content";
pub const ENTITY_TYPE_FIELD: &str = "entity_type";

pub const PROJECT_RECORD_TYPE: &str = "Project";
pub const TASK_RECORD_TYPE: &str = "Task";
pub const STEP_RECORD_TYPE: &str = "Step";

/// Reference to another remote record through a typed relationship field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_type: String,
    pub id: String,
}

impl RecordRef {
    pub fn new(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            id: id.into(),
        }
    }
}

/// Value of a remote record field: plain text or a typed reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Reference(RecordRef),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn reference(record_type: impl Into<String>, id: impl Into<String>) -> Self {
        FieldValue::Reference(RecordRef::new(record_type, id))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            FieldValue::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&RecordRef> {
        match self {
            FieldValue::Reference(reference) => Some(reference),
            FieldValue::Text(_) => None,
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

/// Flat, type-tagged record in the remote production-tracking store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    pub record_type: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl RemoteRecord {
    pub fn new(id: impl Into<String>, record_type: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            fields,
        }
    }

    pub fn field_text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|value| value.as_text())
    }

    pub fn field_reference(&self, name: &str) -> Option<&RecordRef> {
        self.fields.get(name).and_then(|value| value.as_reference())
    }

    /// Local node id recorded on this record, if any. An empty value counts
    /// as unlinked.
    pub fn link_id(&self) -> Option<&str> {
        self.field_text(LINK_ID_FIELD).filter(|value| !value.is_empty())
    }

    pub fn link_status(&self) -> Option<SyncStatus> {
        self.field_text(LINK_STATUS_FIELD).and_then(SyncStatus::parse)
    }

    pub fn reference(&self) -> RecordRef {
        RecordRef::new(&self.record_type, &self.id)
    }
}

/// Whether the local/remote correspondence recorded on a record is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "Synced",
            SyncStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<SyncStatus> {
        match value {
            "Synced" => Some(SyncStatus::Synced),
            "Failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality constraint used by store lookups. The reserved field name `id`
/// matches against the record id rather than the field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: FieldValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    pub fn id_is(id: &str) -> Self {
        Self::eq("id", FieldValue::text(id))
    }

    pub fn matches(&self, record: &RemoteRecord) -> bool {
        if self.field == "id" {
            return self.value.as_text() == Some(record.id.as_str());
        }
        record.fields.get(&self.field) == Some(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record_with(fields: FieldMap) -> RemoteRecord {
        RemoteRecord::new("rec-1", "Asset", fields)
    }

    #[test]
    fn field_value_serializes_text_and_references() {
        let text = serde_json::to_value(FieldValue::text("Model")).expect("text");
        assert_eq!(text, serde_json::json!("Model"));

        let reference = serde_json::to_value(FieldValue::reference("Asset", "rec-2")).expect("ref");
        assert_eq!(
            reference,
            serde_json::json!({"record_type": "Asset", "id": "rec-2"})
        );

        let parsed: FieldValue =
            serde_json::from_value(serde_json::json!({"record_type": "Asset", "id": "rec-2"}))
                .expect("parse");
        assert_eq!(parsed, FieldValue::reference("Asset", "rec-2"));
    }

    #[test]
    fn link_id_treats_empty_as_unlinked() {
        let mut fields = FieldMap::new();
        fields.insert(LINK_ID_FIELD.to_string(), FieldValue::text(""));
        assert_eq!(record_with(fields).link_id(), None);

        let mut fields = FieldMap::new();
        fields.insert(LINK_ID_FIELD.to_string(), FieldValue::text("node-1"));
        assert_eq!(record_with(fields).link_id(), Some("node-1"));
    }

    #[test]
    fn sync_status_round_trips_exact_strings() {
        assert_eq!(SyncStatus::parse("Synced"), Some(SyncStatus::Synced));
        assert_eq!(SyncStatus::parse("Failed"), Some(SyncStatus::Failed));
        assert_eq!(SyncStatus::parse("failed"), None);
        assert_eq!(SyncStatus::Synced.to_string(), "Synced");
    }

    #[test]
    fn filter_matches_id_and_fields() {
        let mut fields = FieldMap::new();
        fields.insert(CODE_FIELD.to_string(), FieldValue::text("heroA"));
        let record = record_with(fields);

        assert!(Filter::id_is("rec-1").matches(&record));
        assert!(!Filter::id_is("rec-2").matches(&record));
        assert!(Filter::eq(CODE_FIELD, FieldValue::text("heroA")).matches(&record));
        assert!(!Filter::eq(CODE_FIELD, FieldValue::text("heroB")).matches(&record));
        assert!(!Filter::eq("missing", FieldValue::text("x")).matches(&record));
    }
}
