use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{error::AssetError, Result};

/// What a scene node carries. Stored as a single byte in the cache.
#[derive(Serialize_repr, Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum NodeAttribute {
    #[default]
    Unknown = 0,
    Null = 1,
    Skeleton = 2,
    Mesh = 3,
    Camera = 4,
    Light = 5,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub unique_id: u64,
    pub name: String,
    pub attribute: NodeAttribute,
    /// -1 for roots
    pub parent_index: i64,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_index < 0
    }
}

/// Flat node list of an imported asset. Everything else in the asset refers
/// to nodes by their position in this list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SceneGraph {
    pub nodes: Vec<Node>,
}

impl SceneGraph {
    /// Linear scan; -1 when no node has `unique_id`.
    pub fn index_of(&self, unique_id: u64) -> i64 {
        self.nodes
            .iter()
            .position(|node| node.unique_id == unique_id)
            .map_or(-1, |index| index as i64)
    }

    pub fn node(&self, index: i64) -> Option<&Node> {
        usize::try_from(index).ok().and_then(|index| self.nodes.get(index))
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name == name)
    }

    /// Appends a node whose parent is resolved later by [`SceneGraph::resolve_parents`].
    pub fn push(&mut self, unique_id: u64, name: impl Into<String>, attribute: NodeAttribute) -> usize {
        self.nodes.push(Node {
            unique_id,
            name: name.into(),
            attribute,
            parent_index: -1,
        });
        self.nodes.len() - 1
    }

    /// Second pass of scene construction: resolve every node's parent id to an
    /// index once all nodes are present.
    ///
    /// `parent_ids[i]` is the parent of node `i` (`None` for roots). A parent
    /// has to precede its children in the list, which also rules out cycles;
    /// pose evaluation relies on that order.
    pub fn resolve_parents(&mut self, parent_ids: &[Option<u64>]) -> Result<()> {
        if parent_ids.len() != self.nodes.len() {
            return Err(AssetError::malformed(format!(
                "{} parent ids given for {} nodes",
                parent_ids.len(),
                self.nodes.len()
            )));
        }
        for (index, parent_id) in parent_ids.iter().enumerate() {
            let parent_index = match parent_id {
                Some(parent_id) => {
                    let parent_index = self.index_of(*parent_id);
                    if parent_index < 0 {
                        return Err(AssetError::malformed(format!(
                            "node '{}' references missing parent {}",
                            self.nodes[index].name, parent_id
                        )));
                    }
                    if parent_index as usize >= index {
                        return Err(AssetError::malformed(format!(
                            "node '{}' is listed before its parent",
                            self.nodes[index].name
                        )));
                    }
                    parent_index
                }
                None => -1,
            };
            self.nodes[index].parent_index = parent_index;
        }
        Ok(())
    }
}
