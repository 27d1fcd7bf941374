use serde::{Deserialize, Serialize};

use crate::{error::AssetError, source::SourceMesh, Result};

/// Fixed number of (bone, weight) slots per vertex.
pub const MAX_BONE_INFLUENCES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneInfluence {
    pub bone_index: u32,
    pub bone_weight: f32,
}

/// What to do with the fifth and later contributions to a control point.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Overwrite the lightest slot, even if the newcomer is lighter still.
    /// This is how assets have always been imported.
    #[default]
    AlwaysEvictMin,
    /// Overwrite the lightest slot only when the newcomer outweighs it.
    StrictImproveOnly,
}

/// Resolved influences of one vertex. Unused slots have weight 0 and bone 0.
///
/// A control point no cluster touches ends up with four zero weights, which
/// linear-blend skinning collapses onto the origin. [`VertexInfluences::rigid`]
/// binds such a vertex fully to bone 0 instead.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VertexInfluences {
    pub weights: [f32; MAX_BONE_INFLUENCES],
    pub indices: [u32; MAX_BONE_INFLUENCES],
}

impl VertexInfluences {
    pub fn weight_sum(&self) -> f32 {
        self.weights.iter().sum()
    }

    /// Fully weighted to bone 0.
    pub fn rigid() -> Self {
        let mut influences = Self::default();
        influences.weights[0] = 1.0;
        influences
    }

    /// Scales the weights to sum to 1. All-zero weights are left alone.
    pub fn renormalize(&mut self) {
        let sum = self.weight_sum();
        if sum > 0.0 {
            for weight in &mut self.weights {
                *weight /= sum;
            }
        }
    }
}

/// Packs contributions into [`MAX_BONE_INFLUENCES`] slots, in the order given.
///
/// The first four fill the slots in order. Each later one looks for the slot
/// with the smallest weight (lowest slot wins a tie) and, depending on
/// `policy`, replaces it.
pub fn resolve_influences(contributions: &[BoneInfluence], policy: EvictionPolicy) -> VertexInfluences {
    let mut resolved = VertexInfluences::default();
    for (influence_index, influence) in contributions.iter().enumerate() {
        if influence_index < MAX_BONE_INFLUENCES {
            resolved.weights[influence_index] = influence.bone_weight;
            resolved.indices[influence_index] = influence.bone_index;
            continue;
        }

        let mut min_slot = 0;
        let mut min_weight = resolved.weights[0];
        for slot in 1..MAX_BONE_INFLUENCES {
            if resolved.weights[slot] < min_weight {
                min_weight = resolved.weights[slot];
                min_slot = slot;
            }
        }

        let evict = match policy {
            EvictionPolicy::AlwaysEvictMin => true,
            EvictionPolicy::StrictImproveOnly => influence.bone_weight > min_weight,
        };
        if evict {
            resolved.weights[min_slot] = influence.bone_weight;
            resolved.indices[min_slot] = influence.bone_index;
        }
    }
    resolved
}

/// Gathers every skin cluster's contribution per control point.
///
/// Clusters are visited in deformer order and the running cluster index is
/// the bone index, matching the bone order built by
/// [`crate::skeleton::Skeleton::from_clusters`].
pub fn gather_contributions(mesh: &SourceMesh) -> Result<Vec<Vec<BoneInfluence>>> {
    let mut contributions = vec![Vec::new(); mesh.control_points.len()];
    let clusters = mesh.skins.iter().flat_map(|skin| skin.clusters.iter());
    for (bone_index, cluster) in clusters.enumerate() {
        if cluster.control_point_indices.len() != cluster.weights.len() {
            return Err(AssetError::malformed(format!(
                "skin cluster {} has {} control points but {} weights",
                bone_index,
                cluster.control_point_indices.len(),
                cluster.weights.len()
            )));
        }
        for (&control_point, &weight) in cluster.control_point_indices.iter().zip(&cluster.weights) {
            let slot = contributions.get_mut(control_point as usize).ok_or_else(|| {
                AssetError::malformed(format!(
                    "skin cluster {} references control point {} of {}",
                    bone_index,
                    control_point,
                    mesh.control_points.len()
                ))
            })?;
            slot.push(BoneInfluence {
                bone_index: bone_index as u32,
                bone_weight: weight,
            });
        }
    }
    Ok(contributions)
}
