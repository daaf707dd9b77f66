use std::collections::{BTreeMap, BTreeSet};

use crate::config::SchemaConfig;

/// How a trackable folder type links to its parent on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentField {
    /// No parent-linking field; the record hangs directly off the project.
    ProjectScoped,
    /// Name of the relationship field that holds the parent reference.
    Field(String),
}

/// Per-folder-type metadata over the remote schema: which relationship field
/// links a record to its parent, and which record types scope their pipeline
/// steps by parent entity type.
#[derive(Debug, Clone)]
pub struct RemoteSchema {
    parent_fields: BTreeMap<String, ParentField>,
    step_scoped_types: BTreeSet<String>,
}

impl Default for RemoteSchema {
    fn default() -> Self {
        let mut parent_fields = BTreeMap::new();
        parent_fields.insert("Asset".to_string(), ParentField::ProjectScoped);
        parent_fields.insert("Episode".to_string(), ParentField::ProjectScoped);
        parent_fields.insert(
            "Sequence".to_string(),
            ParentField::Field("episode".to_string()),
        );
        parent_fields.insert(
            "Shot".to_string(),
            ParentField::Field("sequence".to_string()),
        );

        let mut step_scoped_types = BTreeSet::new();
        step_scoped_types.insert("Asset".to_string());
        step_scoped_types.insert("Shot".to_string());

        Self {
            parent_fields,
            step_scoped_types,
        }
    }
}

impl RemoteSchema {
    /// Parent-linking field for a folder type. Unknown types fall back to
    /// project-scoped.
    pub fn parent_field(&self, folder_type: &str) -> ParentField {
        self.parent_fields
            .get(folder_type)
            .cloned()
            .unwrap_or(ParentField::ProjectScoped)
    }

    pub fn set_parent_field(&mut self, folder_type: impl Into<String>, field: ParentField) {
        self.parent_fields.insert(folder_type.into(), field);
    }

    /// Whether pipeline steps for tasks under this record type are narrowed
    /// by `entity_type`.
    pub fn scopes_steps(&self, record_type: &str) -> bool {
        self.step_scoped_types.contains(record_type)
    }

    pub fn set_step_scoped(&mut self, record_type: impl Into<String>) {
        self.step_scoped_types.insert(record_type.into());
    }

    /// Folder record types known to the schema, in name order.
    pub fn trackable_types(&self) -> impl Iterator<Item = &str> {
        self.parent_fields.keys().map(String::as_str)
    }

    /// Apply configuration overrides on top of the defaults. The reserved
    /// value `project` marks a type as project-scoped.
    pub fn with_overrides(mut self, overrides: &SchemaConfig) -> Self {
        if let Some(parent_fields) = &overrides.parent_fields {
            for (folder_type, field) in parent_fields {
                let parent = if field == "project" {
                    ParentField::ProjectScoped
                } else {
                    ParentField::Field(field.clone())
                };
                self.parent_fields.insert(folder_type.clone(), parent);
            }
        }
        if let Some(step_scoped) = &overrides.step_scoped_types {
            self.step_scoped_types = step_scoped.iter().cloned().collect();
        }
        self
    }
}
