use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Local attribute holding the id of the linked remote record.
pub const REMOTE_ID_ATTRIB: &str = "remote_id";
/// Local attribute holding the type of the linked remote record.
pub const REMOTE_TYPE_ATTRIB: &str = "remote_type";

/// Folder subtype reserved for purely organizational folders. The remote
/// store has no counterpart for these; their children attach to the nearest
/// trackable ancestor instead.
pub const ORGANIZATIONAL_FOLDER_TYPE: &str = "Folder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Project,
    Folder,
    Task,
}

/// Node in the local hierarchical project model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attribs: BTreeMap<String, String>,
}

impl LocalNode {
    pub fn project(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            kind: NodeKind::Project,
            folder_type: None,
            task_type: None,
            name: name.into(),
            label: None,
            attribs: BTreeMap::new(),
        }
    }

    pub fn folder(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        folder_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(parent_id.into()),
            kind: NodeKind::Folder,
            folder_type: Some(folder_type.into()),
            task_type: None,
            name: name.into(),
            label: None,
            attribs: BTreeMap::new(),
        }
    }

    pub fn task(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        task_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(parent_id.into()),
            kind: NodeKind::Task,
            folder_type: None,
            task_type: Some(task_type.into()),
            name: name.into(),
            label: None,
            attribs: BTreeMap::new(),
        }
    }

    /// Whether this node requires a remote counterpart: tasks always do,
    /// folders only when their subtype is not the organizational one.
    pub fn is_trackable(&self) -> bool {
        match self.kind {
            NodeKind::Task => true,
            NodeKind::Folder => matches!(
                self.folder_type.as_deref(),
                Some(folder_type) if folder_type != ORGANIZATIONAL_FOLDER_TYPE
            ),
            NodeKind::Project => false,
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn attrib(&self, key: &str) -> Option<&str> {
        self.attribs.get(key).map(String::as_str)
    }

    pub fn set_attrib(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attribs.insert(key.into(), value.into());
    }

    /// Id of the linked remote record, if any. An empty value counts as
    /// unlinked.
    pub fn remote_id(&self) -> Option<&str> {
        self.attrib(REMOTE_ID_ATTRIB).filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_are_always_trackable() {
        assert!(LocalNode::task("t1", "p1", "Model", "modeling").is_trackable());
    }

    #[test]
    fn organizational_folders_are_not_trackable() {
        assert!(!LocalNode::folder("f1", "p1", ORGANIZATIONAL_FOLDER_TYPE, "assets").is_trackable());
        assert!(LocalNode::folder("f2", "p1", "Asset", "heroA").is_trackable());
    }

    #[test]
    fn folders_without_subtype_are_not_trackable() {
        let mut folder = LocalNode::folder("f1", "p1", "Asset", "heroA");
        folder.folder_type = None;
        assert!(!folder.is_trackable());
    }

    #[test]
    fn project_root_is_not_trackable() {
        assert!(!LocalNode::project("p1", "demo").is_trackable());
    }

    #[test]
    fn display_label_falls_back_to_name() {
        let mut task = LocalNode::task("t1", "p1", "Model", "modeling");
        assert_eq!(task.display_label(), "modeling");
        task.label = Some("Modeling".to_string());
        assert_eq!(task.display_label(), "Modeling");
    }

    #[test]
    fn remote_id_ignores_empty_attrib() {
        let mut task = LocalNode::task("t1", "p1", "Model", "modeling");
        assert_eq!(task.remote_id(), None);
        task.set_attrib(REMOTE_ID_ATTRIB, "");
        assert_eq!(task.remote_id(), None);
        task.set_attrib(REMOTE_ID_ATTRIB, "rec-1");
        assert_eq!(task.remote_id(), Some("rec-1"));
    }
}
