use std::collections::VecDeque;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::factory::EntityFactory;
use crate::index::RemoteIndex;
use crate::node::{LocalNode, REMOTE_ID_ATTRIB, REMOTE_TYPE_ATTRIB};
use crate::record::{
    FieldMap, FieldValue, Filter, RemoteRecord, SyncStatus, LINK_ID_FIELD, LINK_STATUS_FIELD,
    PROJECT_RECORD_TYPE,
};
use crate::schema::RemoteSchema;
use crate::store::{RemoteStore, StoreError};
use crate::tree::{LocalTreeSource, TreeError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No pipeline step matching task type {task_type} for node {node_id}")]
    MissingStep { task_type: String, node_id: String },
    #[error("Node {0} is a task without a task type")]
    MissingTaskType(String),
    #[error("Node {0} is a folder without a folder type")]
    MissingFolderType(String),
    #[error("Remote parent {record_type} {id} disappeared from the store")]
    MissingParentRecord { record_type: String, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// How a single node ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Already linked to a valid remote record.
    Linked,
    /// A new remote record was created and linked.
    Created,
    /// The stored remote id pointed at a record linked to a different node;
    /// the record's link fields were cleared and the run degraded to Failed.
    ConflictFlagged,
    /// Organizational node with no remote counterpart; children attach to
    /// the resolved remote parent instead.
    PassedThrough,
}

/// Queue entry pairing a local node with its resolved remote parent. The
/// parent is always fully persisted before the node is processed.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub remote_parent: RemoteRecord,
    pub node_id: String,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub created: usize,
    pub linked: usize,
    pub conflicts: usize,
    pub passed_through: usize,
    pub status: SyncStatus,
    pub finished_at: String,
}

/// Breadth-first reconciliation of a local project tree into the remote
/// store. Every trackable node ends the run linked to a valid remote record
/// or flagged as a conflict; each node's link commits independently, so an
/// aborted run leaves a durable, re-runnable prefix.
pub struct SyncEngine<'a> {
    source: &'a dyn LocalTreeSource,
    store: &'a dyn RemoteStore,
    schema: &'a RemoteSchema,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn LocalTreeSource,
        store: &'a dyn RemoteStore,
        schema: &'a RemoteSchema,
    ) -> Self {
        Self {
            source,
            store,
            schema,
        }
    }

    pub fn run(&self, project_record: &RemoteRecord) -> Result<SyncReport, SyncError> {
        info!("loading local project tree");
        let mut tree = self.source.load()?;

        info!(project_record = %project_record.id, "scanning remote records");
        let mut index = RemoteIndex::scan(self.store, self.schema, project_record)?;
        let factory = EntityFactory::new(self.store, self.schema, project_record);

        let root_id = tree.root_id().to_string();
        let mut queue: VecDeque<WorkItem> = VecDeque::new();
        for child_id in tree.children_of(&root_id) {
            queue.push_back(WorkItem {
                remote_parent: project_record.clone(),
                node_id: child_id.clone(),
            });
        }

        let mut created = 0;
        let mut linked = 0;
        let mut conflicts = 0;
        let mut passed_through = 0;
        let mut status = SyncStatus::Synced;

        while let Some(WorkItem {
            remote_parent,
            node_id,
        }) = queue.pop_front()
        {
            let node = tree
                .node(&node_id)
                .ok_or_else(|| TreeError::UnknownNode(node_id.clone()))?
                .clone();
            debug!(node = %node.id, name = %node.name, "processing node");

            let (outcome, record) = if node.is_trackable() {
                self.sync_node(&node, &remote_parent, &mut index, &factory)?
            } else {
                (Outcome::PassedThrough, None)
            };

            match outcome {
                Outcome::Linked => linked += 1,
                Outcome::Created => created += 1,
                Outcome::ConflictFlagged => {
                    conflicts += 1;
                    status = SyncStatus::Failed;
                }
                Outcome::PassedThrough => passed_through += 1,
            }

            if let Some(record) = &record {
                tree.set_attrib(&node.id, REMOTE_ID_ATTRIB, record.id.clone())?;
                tree.set_attrib(&node.id, REMOTE_TYPE_ATTRIB, record.record_type.clone())?;
                self.source.persist(&tree)?;
            }

            // Pass-through and conflicted nodes hand their resolved parent
            // down to their children.
            let next_parent = record.unwrap_or(remote_parent);
            for child_id in tree.children_of(&node.id) {
                queue.push_back(WorkItem {
                    remote_parent: next_parent.clone(),
                    node_id: child_id.clone(),
                });
            }
        }

        let mut fields = FieldMap::new();
        fields.insert(LINK_ID_FIELD.to_string(), FieldValue::text(&root_id));
        fields.insert(
            LINK_STATUS_FIELD.to_string(),
            FieldValue::text(status.as_str()),
        );
        self.store
            .update(&project_record.record_type, &project_record.id, fields)?;

        tree.set_attrib(&root_id, REMOTE_ID_ATTRIB, project_record.id.clone())?;
        tree.set_attrib(&root_id, REMOTE_TYPE_ATTRIB, PROJECT_RECORD_TYPE)?;
        self.source.persist(&tree)?;

        info!(created, linked, conflicts, status = %status, "sync finished");
        Ok(SyncReport {
            created,
            linked,
            conflicts,
            passed_through,
            status,
            finished_at: Utc::now().to_rfc3339(),
        })
    }

    fn sync_node(
        &self,
        node: &LocalNode,
        remote_parent: &RemoteRecord,
        index: &mut RemoteIndex,
        factory: &EntityFactory<'_>,
    ) -> Result<(Outcome, Option<RemoteRecord>), SyncError> {
        if let Some(remote_id) = node.remote_id() {
            if let Some(existing) = index.lookup(remote_id) {
                if existing.link_id() == Some(node.id.as_str()) {
                    debug!(node = %node.id, record = %existing.id, "already linked");
                    return Ok((Outcome::Linked, Some(existing.clone())));
                }

                warn!(
                    node = %node.id,
                    record = %existing.id,
                    record_link = existing.link_id().unwrap_or(""),
                    "remote record is linked to a different node, clearing its link"
                );
                let mut fields = FieldMap::new();
                fields.insert(LINK_ID_FIELD.to_string(), FieldValue::text(""));
                fields.insert(
                    LINK_STATUS_FIELD.to_string(),
                    FieldValue::text(SyncStatus::Failed.as_str()),
                );
                // No fallback exists here: a failed clearing update aborts
                // the whole run.
                self.store
                    .update(&existing.record_type, &existing.id, fields)?;
                return Ok((Outcome::ConflictFlagged, None));
            }
        }

        // Re-fetch the parent by exact type and id so creation never links
        // against a stale snapshot.
        let parent = self
            .store
            .find_one(&remote_parent.record_type, &[Filter::id_is(&remote_parent.id)])?
            .ok_or_else(|| SyncError::MissingParentRecord {
                record_type: remote_parent.record_type.clone(),
                id: remote_parent.id.clone(),
            })?;

        let record = factory.create(node, &parent)?;
        index.insert(record.clone(), &parent.id);
        Ok((Outcome::Created, Some(record)))
    }
}
