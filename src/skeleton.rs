use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::{error::AssetError, scene::SceneGraph, source::SourceMesh, Result};

/// Size of the per-draw bone palette.
pub const MAX_BONES: usize = 256;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Bone {
    pub unique_id: u64,
    pub name: String,
    /// Position of the parent bone in the same skeleton, -1 for orphans
    pub parent_index: i64,
    /// Position of the bone's node in the scene graph
    pub node_index: i64,
    /// Converts from mesh space to bone space at bind time
    pub offset_transform: Mat4,
}

impl Default for Bone {
    fn default() -> Self {
        Self {
            unique_id: 0,
            name: String::new(),
            parent_index: -1,
            node_index: 0,
            offset_transform: Mat4::IDENTITY,
        }
    }
}

impl Bone {
    pub fn is_orphan(&self) -> bool {
        self.parent_index < 0
    }
}

/// Bind pose of a mesh: one bone per skin cluster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    /// Linear scan; -1 when no bone has `unique_id`.
    pub fn index_of(&self, unique_id: u64) -> i64 {
        self.bones
            .iter()
            .position(|bone| bone.unique_id == unique_id)
            .map_or(-1, |index| index as i64)
    }

    /// Builds the bind pose from every skin cluster of `mesh`, in deformer
    /// order. Parent bones are looked up among the bones of this skeleton
    /// once all of them exist.
    pub fn from_clusters(mesh: &SourceMesh, scene: &SceneGraph) -> Result<Self> {
        let mut skeleton = Skeleton::default();
        let mut parent_ids = vec![];

        for cluster in mesh.skins.iter().flat_map(|skin| skin.clusters.iter()) {
            let node_index = scene.index_of(cluster.link);
            let node = scene.node(node_index).ok_or_else(|| {
                AssetError::malformed(format!("skin cluster links to missing node {}", cluster.link))
            })?;
            parent_ids.push(scene.node(node.parent_index).map(|parent| parent.unique_id));

            skeleton.bones.push(Bone {
                unique_id: cluster.link,
                name: node.name.clone(),
                parent_index: -1,
                node_index,
                offset_transform: cluster.link_transform.inverse() * cluster.reference_transform,
            });
        }

        if skeleton.bones.len() > MAX_BONES {
            return Err(AssetError::malformed(format!(
                "mesh {} has {} bones, at most {} are supported",
                mesh.node,
                skeleton.bones.len(),
                MAX_BONES
            )));
        }

        for (index, parent_id) in parent_ids.into_iter().enumerate() {
            if let Some(parent_id) = parent_id {
                skeleton.bones[index].parent_index = skeleton.index_of(parent_id);
            }
        }
        Ok(skeleton)
    }
}
