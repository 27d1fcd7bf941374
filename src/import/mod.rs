//! glTF 2.0 reader producing a [`SourceScene`].

use std::{collections::HashSet, path::Path};

use glam::{Quat, Vec3};
use gltf::{mesh::Mode, Document};
use log::{debug, info, warn};

use crate::{
    config::ImportSettings,
    error::AssetError,
    scene::NodeAttribute,
    source::{SourceNode, SourceScene, Srt},
    Result,
};

mod accessors;
mod geometry;
mod materials;
mod takes;

/// Unique id of the node at `index`. 0 never names a node.
pub fn node_unique_id(index: usize) -> u64 {
    index as u64 + 1
}

/// Unique id of the material at `index`; 0 is the default material.
pub fn material_unique_id(index: Option<usize>) -> u64 {
    index.map_or(0, |index| index as u64 + 1)
}

pub fn load_gltf(path: &Path, settings: &ImportSettings) -> Result<SourceScene> {
    if !path.exists() {
        return Err(AssetError::AssetNotFound { path: path.to_path_buf() });
    }
    let gltf::Gltf { document, blob } = gltf::Gltf::open(path)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob)?;
    info!("importing {}", path.display());
    read_document(&document, &buffers, settings)
}

/// Depth-first node order starting from the scene roots, parents first.
fn traversal_order(document: &Document) -> Vec<(gltf::Node<'_>, Option<usize>)> {
    let roots: Vec<gltf::Node> = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().collect(),
        None => {
            let children: HashSet<usize> = document
                .nodes()
                .flat_map(|node| node.children().map(|child| child.index()))
                .collect();
            document.nodes().filter(|node| !children.contains(&node.index())).collect()
        }
    };

    let mut order = vec![];
    let mut visited = HashSet::new();
    let mut stack: Vec<(gltf::Node, Option<usize>)> = roots.into_iter().rev().map(|node| (node, None)).collect();
    while let Some((node, parent)) = stack.pop() {
        if !visited.insert(node.index()) {
            warn!("node {} is reachable twice, keeping the first parent", node.index());
            continue;
        }
        let children: Vec<gltf::Node> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push((child, Some(node.index())));
        }
        order.push((node, parent));
    }
    order
}

fn node_attribute(node: &gltf::Node, joints: &HashSet<usize>) -> NodeAttribute {
    if node.mesh().is_some() {
        NodeAttribute::Mesh
    } else if joints.contains(&node.index()) {
        NodeAttribute::Skeleton
    } else if node.camera().is_some() {
        NodeAttribute::Camera
    } else {
        NodeAttribute::Unknown
    }
}

/// Materials of the triangle primitives of `node`, in first-use order.
fn node_materials(node: &gltf::Node) -> Vec<u64> {
    let mut materials = vec![];
    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives().filter(|primitive| primitive.mode() == Mode::Triangles) {
            let id = material_unique_id(primitive.material().index());
            if !materials.contains(&id) {
                materials.push(id);
            }
        }
    }
    materials
}

pub fn read_document(
    document: &Document,
    buffers: &[gltf::buffer::Data],
    settings: &ImportSettings,
) -> Result<SourceScene> {
    let joints: HashSet<usize> = document
        .skins()
        .flat_map(|skin| skin.joints().map(|joint| joint.index()))
        .collect();

    let order = traversal_order(document);
    let mut source = SourceScene {
        frame_rate: settings.native_frame_rate,
        ..Default::default()
    };
    for (node, parent) in &order {
        let (translation, rotation, scale) = node.transform().decomposed();
        source.nodes.push(SourceNode {
            unique_id: node_unique_id(node.index()),
            name: node.name().map_or_else(|| format!("node{}", node.index()), str::to_string),
            attribute: node_attribute(node, &joints),
            parent: parent.map(node_unique_id),
            rest: Srt {
                scale: Vec3::from(scale),
                rotation: Quat::from_array(rotation),
                translation: Vec3::from(translation),
            },
            materials: node_materials(node),
        });
    }

    let rest_pose = source.evaluate(None, 0.0)?;
    for (position, (node, _)) in order.iter().enumerate() {
        if let Some(mesh) = node.mesh() {
            let mesh = geometry::read_mesh(node, &mesh, buffers, &source, &rest_pose, position)?;
            source.meshes.push(mesh);
        }
    }

    source.materials = document
        .materials()
        .map(|material| materials::read_material(&material))
        .collect();
    source.takes = document
        .animations()
        .map(|animation| takes::read_take(&animation, buffers))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        "source scene: {} nodes, {} meshes, {} materials, {} takes",
        source.nodes.len(),
        source.meshes.len(),
        source.materials.len(),
        source.takes.len()
    );
    Ok(source)
}
