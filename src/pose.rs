use glam::{Mat4, Quat, Vec3, Vec4};

use crate::{
    animation::{Animation, KeyNode, Keyframe},
    error::AssetError,
    mesh::Mesh,
    scene::SceneGraph,
    skeleton::MAX_BONES,
    Result,
};

/// Recomputes every node's global transform from its local S/R/T.
///
/// Nodes are visited in scene order, which puts parents before children, so
/// each node composes onto an already updated parent.
pub fn update_animation(scene: &SceneGraph, keyframe: &mut Keyframe) -> Result<()> {
    if keyframe.nodes.len() != scene.nodes.len() {
        return Err(AssetError::malformed(format!(
            "keyframe has {} nodes, scene has {}",
            keyframe.nodes.len(),
            scene.nodes.len()
        )));
    }

    for index in 0..keyframe.nodes.len() {
        let parent_index = scene.nodes[index].parent_index;
        let parent_global = if parent_index < 0 {
            Mat4::IDENTITY
        } else if (parent_index as usize) < index {
            keyframe.nodes[parent_index as usize].global_transform
        } else {
            return Err(AssetError::malformed(format!(
                "node '{}' is listed before its parent",
                scene.nodes[index].name
            )));
        };
        let node = &mut keyframe.nodes[index];
        node.global_transform = parent_global * node.local_transform();
    }
    Ok(())
}

/// `a * (1 - s) + b * s`, which returns the endpoints exactly at 0 and 1.
/// Components that agree are passed through untouched.
fn lerp_exact(a: Vec3, b: Vec3, s: f32) -> Vec3 {
    let blended = a * (1.0 - s) + b * s;
    Vec3::select(a.cmpeq(b), a, blended)
}

fn slerp_exact(a: Quat, b: Quat, s: f32) -> Quat {
    if a == b || s <= 0.0 {
        a
    } else if s >= 1.0 {
        b
    } else {
        a.slerp(b, s)
    }
}

/// Interpolates the local S/R/T of two keyframes into `keyframe`.
///
/// Only the locals are written; call [`update_animation`] afterwards to get
/// matching global transforms.
pub fn blend_animations(keyframes: [&Keyframe; 2], factor: f32, keyframe: &mut Keyframe) -> Result<()> {
    let [from, to] = keyframes;
    if from.nodes.len() != to.nodes.len() {
        return Err(AssetError::malformed(format!(
            "cannot blend keyframes with {} and {} nodes",
            from.nodes.len(),
            to.nodes.len()
        )));
    }

    keyframe.nodes.resize(from.nodes.len(), KeyNode::default());
    for ((out, a), b) in keyframe.nodes.iter_mut().zip(&from.nodes).zip(&to.nodes) {
        out.scaling = lerp_exact(a.scaling, b.scaling, factor);
        out.rotation = slerp_exact(a.rotation, b.rotation, factor);
        out.translation = lerp_exact(a.translation, b.translation, factor);
    }
    Ok(())
}

/// Skin matrix of every bone of `mesh` in the pose `keyframe`.
///
/// Each one takes a vertex from bind-pose mesh space into bone space, out
/// through the bone's current global transform, and back into the mesh's
/// rest frame.
pub fn bone_transforms(mesh: &Mesh, keyframe: &Keyframe) -> Result<Vec<Mat4>> {
    let mesh_from_scene = mesh.default_global_transform.inverse();
    mesh.bind_pose
        .bones
        .iter()
        .map(|bone| {
            let node = usize::try_from(bone.node_index)
                .ok()
                .and_then(|index| keyframe.nodes.get(index))
                .ok_or_else(|| {
                    AssetError::malformed(format!(
                        "bone '{}' points at node {} of a {}-node keyframe",
                        bone.name,
                        bone.node_index,
                        keyframe.nodes.len()
                    ))
                })?;
            Ok(mesh_from_scene * node.global_transform * bone.offset_transform)
        })
        .collect()
}

/// Per-draw constant block consumed by the skinning shader.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawConstants {
    pub world: [[f32; 4]; 4],
    pub material_color: [f32; 4],
    pub bone_transforms: [[[f32; 4]; 4]; MAX_BONES],
}

impl Default for DrawConstants {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY.to_cols_array_2d(),
            material_color: Vec4::ONE.to_array(),
            bone_transforms: [Mat4::IDENTITY.to_cols_array_2d(); MAX_BONES],
        }
    }
}

impl DrawConstants {
    /// Palette entries past `bones` stay identity.
    pub fn new(world: Mat4, material_color: Vec4, bones: &[Mat4]) -> Self {
        let mut constants = Self {
            world: world.to_cols_array_2d(),
            material_color: material_color.to_array(),
            ..Default::default()
        };
        for (slot, bone) in constants.bone_transforms.iter_mut().zip(bones) {
            *slot = bone.to_cols_array_2d();
        }
        constants
    }

    pub fn bone(&self, index: usize) -> Mat4 {
        Mat4::from_cols_array_2d(&self.bone_transforms[index])
    }
}

/// Looping playback clock for one clip.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Playback {
    /// Seconds since the clip (re)started
    pub time: f32,
}

impl Playback {
    /// Frame to show now, then moves the clock on by `elapsed` seconds.
    ///
    /// Past the last frame the clock restarts at frame 0. `None` for a clip
    /// without keyframes.
    pub fn advance(&mut self, elapsed: f32, clip: &Animation) -> Option<usize> {
        if clip.sequence.is_empty() {
            return None;
        }
        let mut frame = (self.time * clip.sampling_rate).floor().max(0.0) as usize;
        if frame > clip.sequence.len() - 1 {
            frame = 0;
            self.time = 0.0;
        }
        self.time += elapsed;
        Some(frame)
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
    }
}
