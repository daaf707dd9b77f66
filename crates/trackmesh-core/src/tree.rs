use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;

use crate::node::{LocalNode, NodeKind};

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Tree IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse project file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Project root is missing")]
    MissingRoot,
    #[error("More than one project root: {0} and {1}")]
    MultipleRoots(String, String),
    #[error("Duplicate node id: {0}")]
    DuplicateId(String),
    #[error("Node {0} has no parent")]
    OrphanNode(String),
    #[error("Node {0} references missing parent {1}")]
    MissingParent(String, String),
    #[error("Node {0} is not reachable from the project root")]
    Unreachable(String),
    #[error("Unknown node id: {0}")]
    UnknownNode(String),
}

/// Fully-materialized local project tree: a single project root, folders and
/// tasks, with children kept in listing order.
#[derive(Debug, Clone)]
pub struct ProjectTree {
    root_id: String,
    nodes: BTreeMap<String, LocalNode>,
    children: BTreeMap<String, Vec<String>>,
    order: Vec<String>,
}

impl ProjectTree {
    /// Build and validate a tree from a flat node listing. Child order per
    /// parent follows the listing order.
    pub fn from_nodes(listing: Vec<LocalNode>) -> Result<Self, TreeError> {
        let mut root_id: Option<String> = None;
        let mut nodes = BTreeMap::new();
        let mut children: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut order = Vec::with_capacity(listing.len());

        for node in listing {
            if nodes.contains_key(&node.id) {
                return Err(TreeError::DuplicateId(node.id));
            }
            if node.kind == NodeKind::Project {
                if let Some(existing) = &root_id {
                    return Err(TreeError::MultipleRoots(existing.clone(), node.id));
                }
                root_id = Some(node.id.clone());
            } else {
                let parent_id = node
                    .parent_id
                    .clone()
                    .ok_or_else(|| TreeError::OrphanNode(node.id.clone()))?;
                children.entry(parent_id).or_default().push(node.id.clone());
            }
            order.push(node.id.clone());
            nodes.insert(node.id.clone(), node);
        }

        let root_id = root_id.ok_or(TreeError::MissingRoot)?;

        for node in nodes.values() {
            if let Some(parent_id) = &node.parent_id {
                if !nodes.contains_key(parent_id) {
                    return Err(TreeError::MissingParent(node.id.clone(), parent_id.clone()));
                }
            }
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        seen.insert(&root_id);
        queue.push_back(&root_id);
        while let Some(id) = queue.pop_front() {
            if let Some(child_ids) = children.get(id) {
                for child_id in child_ids {
                    if seen.insert(child_id) {
                        queue.push_back(child_id);
                    }
                }
            }
        }
        if let Some(unreachable) = nodes.keys().find(|id| !seen.contains(id.as_str())) {
            return Err(TreeError::Unreachable(unreachable.clone()));
        }

        Ok(Self {
            root_id,
            nodes,
            children,
            order,
        })
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn node(&self, id: &str) -> Option<&LocalNode> {
        self.nodes.get(id)
    }

    pub fn children_of(&self, parent_id: &str) -> &[String] {
        self.children
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn attrib(&self, node_id: &str, key: &str) -> Option<&str> {
        self.nodes.get(node_id).and_then(|node| node.attrib(key))
    }

    pub fn set_attrib(
        &mut self,
        node_id: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| TreeError::UnknownNode(node_id.to_string()))?;
        node.set_attrib(key, value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in the original listing order, for persistence.
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &LocalNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }
}

/// Boundary over the system of record for the local project model.
pub trait LocalTreeSource {
    /// Bulk materialization of the full project tree.
    fn load(&self) -> Result<ProjectTree, TreeError>;

    /// Durable flush of attribute writes back to the system of record.
    fn persist(&self, tree: &ProjectTree) -> Result<(), TreeError>;
}
