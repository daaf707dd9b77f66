use tracing::debug;

use crate::engine::SyncError;
use crate::node::{LocalNode, NodeKind};
use crate::record::{
    FieldMap, FieldValue, Filter, RemoteRecord, CODE_FIELD, CONTENT_FIELD, ENTITY_FIELD,
    ENTITY_TYPE_FIELD, LINK_ID_FIELD, LINK_STATUS_FIELD, PROJECT_FIELD, PROJECT_RECORD_TYPE,
    STEP_FIELD, STEP_RECORD_TYPE, SyncStatus, TASK_RECORD_TYPE,
};
use crate::schema::{ParentField, RemoteSchema};
use crate::store::{RemoteStore, StoreError};

/// Type-specific creation rules for remote records: tasks need a resolved
/// pipeline step, typed folders need the right parent-linking field.
pub struct EntityFactory<'a> {
    store: &'a dyn RemoteStore,
    schema: &'a RemoteSchema,
    project: &'a RemoteRecord,
}

impl<'a> EntityFactory<'a> {
    pub fn new(
        store: &'a dyn RemoteStore,
        schema: &'a RemoteSchema,
        project: &'a RemoteRecord,
    ) -> Self {
        Self {
            store,
            schema,
            project,
        }
    }

    /// Create the remote record for a trackable node under an already
    /// persisted remote parent. The created record is re-read from the store
    /// so callers see the store's field representation, not the creation
    /// response's.
    pub fn create(
        &self,
        node: &LocalNode,
        parent: &RemoteRecord,
    ) -> Result<RemoteRecord, SyncError> {
        let created = match node.kind {
            NodeKind::Task => self.create_task(node, parent)?,
            _ => self.create_folder(node, parent)?,
        };
        debug!(record = %created.id, record_type = %created.record_type, parent = %parent.id,
            "created remote record");
        self.store
            .find_one(&created.record_type, &[Filter::id_is(&created.id)])?
            .ok_or_else(|| {
                SyncError::Store(StoreError::UnknownRecord(
                    created.record_type.clone(),
                    created.id.clone(),
                ))
            })
    }

    fn create_task(
        &self,
        node: &LocalNode,
        parent: &RemoteRecord,
    ) -> Result<RemoteRecord, SyncError> {
        let task_type = node
            .task_type
            .as_deref()
            .ok_or_else(|| SyncError::MissingTaskType(node.id.clone()))?;
        let step = self.resolve_step(task_type, &node.id, parent)?;

        let mut fields = FieldMap::new();
        fields.insert(
            PROJECT_FIELD.to_string(),
            FieldValue::Reference(self.project.reference()),
        );
        fields.insert(
            CONTENT_FIELD.to_string(),
            FieldValue::text(node.display_label()),
        );
        fields.insert(LINK_ID_FIELD.to_string(), FieldValue::text(&node.id));
        fields.insert(
            LINK_STATUS_FIELD.to_string(),
            FieldValue::text(SyncStatus::Synced.as_str()),
        );
        fields.insert(
            ENTITY_FIELD.to_string(),
            FieldValue::Reference(parent.reference()),
        );
        fields.insert(
            STEP_FIELD.to_string(),
            FieldValue::Reference(step.reference()),
        );
        Ok(self.store.create(TASK_RECORD_TYPE, fields)?)
    }

    /// A task cannot exist without a step; resolution failure is fatal for
    /// the run.
    fn resolve_step(
        &self,
        task_type: &str,
        node_id: &str,
        parent: &RemoteRecord,
    ) -> Result<RemoteRecord, SyncError> {
        let mut filters = vec![Filter::eq(CODE_FIELD, FieldValue::text(task_type))];
        if self.schema.scopes_steps(&parent.record_type) {
            filters.push(Filter::eq(
                ENTITY_TYPE_FIELD,
                FieldValue::text(&parent.record_type),
            ));
        }
        self.store
            .find_one(STEP_RECORD_TYPE, &filters)?
            .ok_or_else(|| SyncError::MissingStep {
                task_type: task_type.to_string(),
                node_id: node_id.to_string(),
            })
    }

    fn create_folder(
        &self,
        node: &LocalNode,
        parent: &RemoteRecord,
    ) -> Result<RemoteRecord, SyncError> {
        let folder_type = node
            .folder_type
            .as_deref()
            .ok_or_else(|| SyncError::MissingFolderType(node.id.clone()))?;

        let mut fields = FieldMap::new();
        fields.insert(
            PROJECT_FIELD.to_string(),
            FieldValue::Reference(self.project.reference()),
        );
        fields.insert(CODE_FIELD.to_string(), FieldValue::text(&node.name));
        fields.insert(LINK_ID_FIELD.to_string(), FieldValue::text(&node.id));
        fields.insert(
            LINK_STATUS_FIELD.to_string(),
            FieldValue::text(SyncStatus::Synced.as_str()),
        );

        match self.schema.parent_field(folder_type) {
            ParentField::ProjectScoped => {}
            ParentField::Field(_) if parent.record_type == PROJECT_RECORD_TYPE => {}
            ParentField::Field(field) => {
                fields.insert(field, FieldValue::Reference(parent.reference()));
            }
        }
        Ok(self.store.create(folder_type, fields)?)
    }
}
