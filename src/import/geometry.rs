use glam::{Mat4, Vec2, Vec3, Vec4};
use gltf::{mesh::Mode, Semantic};
use log::warn;

use super::{
    accessors::{read2f32, read3f32, read4f32, read4u16, read_index_buffer, read_mat4},
    material_unique_id, node_unique_id,
};
use crate::{
    error::AssetError,
    source::{EvaluatedNode, SkinCluster, SourceMesh, SourcePolygon, SourceScene, SourceSkin},
    Result,
};

/// Per-corner attribute gathered across primitives; dropped entirely as soon
/// as one primitive lacks it.
struct CornerAttribute<T> {
    values: Vec<T>,
    complete: bool,
}

impl<T: Copy> CornerAttribute<T> {
    fn new() -> Self {
        Self { values: vec![], complete: true }
    }

    fn extend(&mut self, per_vertex: Option<Vec<T>>, indices: &[u32]) {
        match per_vertex {
            Some(per_vertex) if self.complete => {
                self.values.extend(indices.iter().map(|&index| per_vertex[index as usize]));
            }
            _ => self.complete = false,
        }
    }

    fn finish(self, name: &str, mesh_name: &str) -> Option<Vec<T>> {
        if self.complete {
            Some(self.values)
        } else {
            if !self.values.is_empty() {
                warn!("mesh '{}': {} missing on some primitives, ignoring them", mesh_name, name);
            }
            None
        }
    }
}

fn check_length<T>(values: Option<Vec<T>>, expected: usize, what: &str) -> Result<Option<Vec<T>>> {
    match values {
        Some(values) if values.len() < expected => Err(AssetError::malformed(format!(
            "{} has {} entries for {} vertices",
            what,
            values.len(),
            expected
        ))),
        other => Ok(other),
    }
}

fn read_attribute<T>(
    primitive: &gltf::Primitive,
    semantic: Semantic,
    buffers: &[gltf::buffer::Data],
    read: impl Fn(&gltf::Accessor, &[gltf::buffer::Data]) -> Result<Vec<T>>,
) -> Result<Option<Vec<T>>> {
    primitive.get(&semantic).map(|accessor| read(&accessor, buffers)).transpose()
}

/// One cluster per joint, in joint order, with bind transforms but no
/// control points yet.
fn empty_clusters(
    skin: &gltf::Skin,
    buffers: &[gltf::buffer::Data],
    reference: Mat4,
    rest_pose: &[EvaluatedNode],
    source: &SourceScene,
) -> Result<Vec<SkinCluster>> {
    let joints: Vec<gltf::Node> = skin.joints().collect();
    let inverse_bind_matrices = match skin.inverse_bind_matrices() {
        Some(accessor) => {
            let matrices = read_mat4(&accessor, buffers)?;
            if matrices.len() != joints.len() {
                return Err(AssetError::malformed(format!(
                    "skin {} has {} inverse bind matrices for {} joints",
                    skin.index(),
                    matrices.len(),
                    joints.len()
                )));
            }
            Some(matrices)
        }
        None => None,
    };

    joints
        .iter()
        .enumerate()
        .map(|(slot, joint)| {
            let link = node_unique_id(joint.index());
            let link_transform = match &inverse_bind_matrices {
                Some(matrices) => reference * Mat4::from_cols_array(&matrices[slot]).inverse(),
                None => {
                    let index = source.node_index(link).ok_or_else(|| {
                        AssetError::malformed(format!("joint node {} is not in the scene", joint.index()))
                    })?;
                    rest_pose[index].global
                }
            };
            Ok(SkinCluster {
                link,
                control_point_indices: vec![],
                weights: vec![],
                reference_transform: reference,
                link_transform,
            })
        })
        .collect()
}

/// Concatenates the triangle primitives of `mesh` into one source mesh.
///
/// `position` is the mesh node's position in `source.nodes` and `rest_pose`.
pub(super) fn read_mesh(
    node: &gltf::Node,
    mesh: &gltf::Mesh,
    buffers: &[gltf::buffer::Data],
    source: &SourceScene,
    rest_pose: &[EvaluatedNode],
    position: usize,
) -> Result<SourceMesh> {
    let mesh_node = &source.nodes[position];
    let reference = rest_pose[position].global;

    let mut clusters = match node.skin() {
        Some(skin) => empty_clusters(&skin, buffers, reference, rest_pose, source)?,
        None => vec![],
    };

    let mut control_points: Vec<Vec3> = vec![];
    let mut polygons = vec![];
    let mut normals = CornerAttribute::<Vec3>::new();
    let mut texcoords = CornerAttribute::<Vec2>::new();
    let mut tangents = CornerAttribute::<Vec4>::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            warn!(
                "mesh '{}': skipping primitive {} with mode {:?}",
                mesh_node.name,
                primitive.index(),
                primitive.mode()
            );
            continue;
        }
        if primitive.morph_targets().next().is_some() {
            warn!("mesh '{}': morph targets are not imported", mesh_node.name);
        }

        let positions = read_attribute(&primitive, Semantic::Positions, buffers, read3f32)?.ok_or_else(|| {
            AssetError::malformed(format!("mesh '{}' primitive {} has no POSITION", mesh_node.name, primitive.index()))
        })?;
        let vertex_count = positions.len();
        let indices = match primitive.indices() {
            Some(accessor) => read_index_buffer(&accessor, buffers)?,
            None => (0..vertex_count as u32).collect(),
        };
        if indices.len() % 3 != 0 {
            return Err(AssetError::malformed(format!(
                "mesh '{}' primitive {} has {} indices, not whole triangles",
                mesh_node.name,
                primitive.index(),
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&index| index as usize >= vertex_count) {
            return Err(AssetError::malformed(format!(
                "mesh '{}' primitive {} indexes vertex {} of {}",
                mesh_node.name,
                primitive.index(),
                bad,
                vertex_count
            )));
        }

        let what = format!("mesh '{}' primitive {}", mesh_node.name, primitive.index());
        let primitive_normals = check_length(
            read_attribute(&primitive, Semantic::Normals, buffers, read3f32)?,
            vertex_count,
            &what,
        )?;
        let primitive_texcoords = check_length(
            read_attribute(&primitive, Semantic::TexCoords(0), buffers, read2f32)?,
            vertex_count,
            &what,
        )?;
        let primitive_tangents = check_length(
            read_attribute(&primitive, Semantic::Tangents, buffers, read4f32)?,
            vertex_count,
            &what,
        )?;
        normals.extend(primitive_normals.map(|v| v.into_iter().map(Vec3::from).collect()), &indices);
        texcoords.extend(primitive_texcoords.map(|v| v.into_iter().map(Vec2::from).collect()), &indices);
        tangents.extend(primitive_tangents.map(|v| v.into_iter().map(Vec4::from).collect()), &indices);

        let base = control_points.len() as u32;
        let material_id = material_unique_id(primitive.material().index());
        let material_slot = mesh_node.materials.iter().position(|&id| id == material_id).unwrap_or(0);
        polygons.extend(indices.chunks_exact(3).map(|triangle| SourcePolygon {
            corners: triangle.iter().map(|&index| base + index).collect(),
            material_slot,
        }));

        if !clusters.is_empty() {
            for set in 0..2 {
                let joints = read_attribute(&primitive, Semantic::Joints(set), buffers, read4u16)?;
                let weights = read_attribute(&primitive, Semantic::Weights(set), buffers, read4f32)?;
                let (Some(joints), Some(weights)) = (joints, weights) else {
                    continue;
                };
                for (vertex, (joints, weights)) in joints.iter().zip(&weights).enumerate().take(vertex_count) {
                    for (&joint, &weight) in joints.iter().zip(weights) {
                        if weight <= 0.0 {
                            continue;
                        }
                        let cluster = clusters.get_mut(joint as usize).ok_or_else(|| {
                            AssetError::malformed(format!("{} binds vertex {} to missing joint {}", what, vertex, joint))
                        })?;
                        cluster.control_point_indices.push(base + vertex as u32);
                        cluster.weights.push(weight);
                    }
                }
            }
        }

        control_points.extend(positions.into_iter().map(Vec3::from));
    }

    Ok(SourceMesh {
        node: mesh_node.unique_id,
        control_points,
        polygons,
        normals: normals.finish("normals", &mesh_node.name),
        texcoords: texcoords.finish("texcoords", &mesh_node.name),
        tangents: tangents.finish("tangents", &mesh_node.name),
        skins: if clusters.is_empty() { vec![] } else { vec![SourceSkin { clusters }] },
    })
}
