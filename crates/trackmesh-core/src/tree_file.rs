use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::node::LocalNode;
use crate::tree::{LocalTreeSource, ProjectTree, TreeError};

/// File-backed local tree: one YAML document listing nodes flat, with
/// `parent_id` references. Writes go through a temp file and a rename so an
/// interrupted persist never truncates the project file.
pub struct YamlTreeSource {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProjectFile {
    nodes: Vec<LocalNode>,
}

impl YamlTreeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LocalTreeSource for YamlTreeSource {
    fn load(&self) -> Result<ProjectTree, TreeError> {
        let text = fs::read_to_string(&self.path)?;
        let file: ProjectFile = serde_yaml::from_str(&text)?;
        ProjectTree::from_nodes(file.nodes)
    }

    fn persist(&self, tree: &ProjectTree) -> Result<(), TreeError> {
        let file = ProjectFile {
            nodes: tree.nodes_in_order().cloned().collect(),
        };
        let body = serde_yaml::to_string(&file)?;
        let tmp_path = self.path.with_extension("yaml.tmp");
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
