//! Interchange-neutral view of a source scene.
//!
//! Readers for concrete interchange formats (see [`crate::import`]) fill a
//! [`SourceScene`]; the import pipeline only ever looks at this model. It is
//! plain data, so tests and other readers can build one directly.

use std::{
    cmp::Ordering,
    collections::HashMap,
    ops::{Add, Mul},
};

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::{error::AssetError, scene::NodeAttribute, Result};

/// Scale, rotation and translation of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Srt {
    pub scale: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for Srt {
    fn default() -> Self {
        Self {
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
        }
    }
}

impl Srt {
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceNode {
    pub unique_id: u64,
    pub name: String,
    pub attribute: NodeAttribute,
    pub parent: Option<u64>,
    pub rest: Srt,
    /// Material ids bound to this node, in slot order
    pub materials: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcePolygon {
    /// Control point index per corner
    pub corners: Vec<u32>,
    /// Index into the owning node's material list
    pub material_slot: usize,
}

/// Influence of one bone over a set of control points.
#[derive(Debug, Clone)]
pub struct SkinCluster {
    /// Unique id of the bone node
    pub link: u64,
    pub control_point_indices: Vec<u32>,
    pub weights: Vec<f32>,
    /// Global transform of the mesh at bind time
    pub reference_transform: Mat4,
    /// Global transform of the bone at bind time
    pub link_transform: Mat4,
}

#[derive(Debug, Clone, Default)]
pub struct SourceSkin {
    pub clusters: Vec<SkinCluster>,
}

/// Geometry attached to a node.
///
/// Per-corner attribute arrays are indexed by polygon vertex: the corners of
/// polygon 0 first, then polygon 1, and so on. Texcoords use a top-left
/// origin.
#[derive(Debug, Clone, Default)]
pub struct SourceMesh {
    pub node: u64,
    pub control_points: Vec<Vec3>,
    pub polygons: Vec<SourcePolygon>,
    pub normals: Option<Vec<Vec3>>,
    pub texcoords: Option<Vec<Vec2>>,
    pub tangents: Option<Vec<Vec4>>,
    pub skins: Vec<SourceSkin>,
}

impl SourceMesh {
    pub fn polygon_vertex_count(&self) -> usize {
        self.polygons.iter().map(|polygon| polygon.corners.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialProperty {
    pub color: Vec3,
    pub texture: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceMaterial {
    pub unique_id: u64,
    pub name: String,
    pub diffuse: Option<MaterialProperty>,
    pub specular: Option<MaterialProperty>,
    pub ambient: Option<MaterialProperty>,
    pub normal_map: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
    /// `values` holds (in-tangent, value, out-tangent) per key
    CubicSpline,
}

#[derive(Debug, Clone)]
pub struct Channel<T> {
    pub times: Vec<f32>,
    pub values: Vec<T>,
    pub interpolation: Interpolation,
}

/// Keyed overrides of one node's rest S/R/T.
#[derive(Debug, Clone, Default)]
pub struct NodeTrack {
    pub node: u64,
    pub translation: Option<Channel<Vec3>>,
    pub rotation: Option<Channel<Quat>>,
    pub scale: Option<Channel<Vec3>>,
}

/// A named animation stack with its local time span in seconds.
#[derive(Debug, Clone, Default)]
pub struct Take {
    pub name: String,
    pub start: f64,
    pub stop: f64,
    pub tracks: Vec<NodeTrack>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceScene {
    /// Depth-first order: parents precede their children
    pub nodes: Vec<SourceNode>,
    pub meshes: Vec<SourceMesh>,
    pub materials: Vec<SourceMaterial>,
    pub takes: Vec<Take>,
    /// Native frames per second
    pub frame_rate: f32,
}

/// A node's transforms at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatedNode {
    pub local: Srt,
    pub global: Mat4,
}

impl SourceScene {
    pub fn node_index(&self, unique_id: u64) -> Option<usize> {
        self.nodes.iter().position(|node| node.unique_id == unique_id)
    }

    pub fn find_node_by_name(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.name == name)
    }

    pub fn find_take(&self, name: &str) -> Option<&Take> {
        self.takes.iter().find(|take| take.name == name)
    }

    pub fn material(&self, unique_id: u64) -> Option<&SourceMaterial> {
        self.materials.iter().find(|material| material.unique_id == unique_id)
    }

    /// Parent index of every node, checking that parents come first.
    pub fn parent_indices(&self) -> Result<Vec<Option<usize>>> {
        let lookup: HashMap<u64, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.unique_id, index))
            .collect();
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| match node.parent {
                None => Ok(None),
                Some(parent) => match lookup.get(&parent) {
                    Some(&parent_index) if parent_index < index => Ok(Some(parent_index)),
                    Some(_) => Err(AssetError::malformed(format!(
                        "source node '{}' precedes its parent",
                        node.name
                    ))),
                    None => Err(AssetError::malformed(format!(
                        "source node '{}' references missing parent {}",
                        node.name, parent
                    ))),
                },
            })
            .collect()
    }

    /// Local and global transforms of every node at `time`. Without a take
    /// this is the rest pose.
    pub fn evaluate(&self, take: Option<&Take>, time: f64) -> Result<Vec<EvaluatedNode>> {
        let parents = self.parent_indices()?;
        let mut locals: Vec<Srt> = self.nodes.iter().map(|node| node.rest).collect();

        if let Some(take) = take {
            let time = time as f32;
            for track in &take.tracks {
                // Tracks for nodes that aren't in this scene are ignored
                let Some(index) = self.node_index(track.node) else {
                    continue;
                };
                let local = &mut locals[index];
                if let Some(value) = track.scale.as_ref().and_then(|c| c.sample(time)) {
                    local.scale = value;
                }
                if let Some(value) = track.rotation.as_ref().and_then(|c| c.sample(time)) {
                    local.rotation = value;
                }
                if let Some(value) = track.translation.as_ref().and_then(|c| c.sample(time)) {
                    local.translation = value;
                }
            }
        }

        let mut evaluated: Vec<EvaluatedNode> = Vec::with_capacity(self.nodes.len());
        for (index, local) in locals.into_iter().enumerate() {
            let parent_global = parents[index].map_or(Mat4::IDENTITY, |parent| evaluated[parent].global);
            evaluated.push(EvaluatedNode {
                local,
                global: parent_global * local.to_mat4(),
            });
        }
        Ok(evaluated)
    }

    /// Global transform of a node in the rest pose.
    pub fn rest_global(&self, unique_id: u64) -> Result<Mat4> {
        let index = self
            .node_index(unique_id)
            .ok_or_else(|| AssetError::malformed(format!("no source node with id {}", unique_id)))?;
        Ok(self.evaluate(None, 0.0)?[index].global)
    }
}

/// Values a [`Channel`] can interpolate between.
pub trait Keyable: Copy + Add<Output = Self> + Mul<f32, Output = Self> {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;

    fn finish(self) -> Self {
        self
    }
}

impl Keyable for Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Keyable for Quat {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.slerp(b, t)
    }

    fn finish(self) -> Self {
        self.normalize()
    }
}

fn bin_search_key_indices(times: &[f32], val: f32) -> (usize, usize) {
    let n = times.len();
    if n <= 1 {
        return (0, 0);
    }

    match times.binary_search_by(|x| x.partial_cmp(&val).unwrap_or(Ordering::Greater)) {
        Ok(i) => (i, i),                    // exact hit, no blend
        Err(0) => (0, 0),                   // before first, clamp
        Err(i) if i >= n => (n - 1, n - 1), // after last, clamp
        Err(i) => (i - 1, i),               // between i-1 and i
    }
}

impl<T: Keyable> Channel<T> {
    fn key_count(&self) -> usize {
        match self.interpolation {
            Interpolation::CubicSpline => (self.values.len() / 3).min(self.times.len()),
            _ => self.values.len().min(self.times.len()),
        }
    }

    fn key_value(&self, key: usize) -> T {
        match self.interpolation {
            Interpolation::CubicSpline => self.values[key * 3 + 1],
            _ => self.values[key],
        }
    }

    /// Value at `time`, clamped to the first/last key. `None` for an empty channel.
    pub fn sample(&self, time: f32) -> Option<T> {
        let count = self.key_count();
        if count == 0 {
            return None;
        }
        let (i0, i1) = bin_search_key_indices(&self.times[..count], time);
        let (t0, t1) = (self.times[i0], self.times[i1]);
        if i0 == i1 || (t1 - t0).abs() < f32::EPSILON {
            return Some(self.key_value(i0));
        }
        let alpha = (time - t0) / (t1 - t0);

        let value = match self.interpolation {
            Interpolation::Step => self.key_value(i0),
            Interpolation::Linear => T::interpolate(self.values[i0], self.values[i1], alpha),
            Interpolation::CubicSpline => {
                let dt = t1 - t0;
                let v0 = self.values[i0 * 3 + 1];
                let out0 = self.values[i0 * 3 + 2];
                let in1 = self.values[i1 * 3];
                let v1 = self.values[i1 * 3 + 1];
                let s2 = alpha * alpha;
                let s3 = s2 * alpha;
                (v0 * (2.0 * s3 - 3.0 * s2 + 1.0)
                    + out0 * ((s3 - 2.0 * s2 + alpha) * dt)
                    + v1 * (-2.0 * s3 + 3.0 * s2)
                    + in1 * ((s3 - s2) * dt))
                    .finish()
            }
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn linear<T>(times: Vec<f32>, values: Vec<T>) -> Channel<T> {
        Channel { times, values, interpolation: Interpolation::Linear }
    }

    fn two_nodes() -> SourceScene {
        SourceScene {
            nodes: vec![
                SourceNode {
                    unique_id: 1,
                    name: "root".into(),
                    rest: Srt { translation: Vec3::new(0.0, 1.0, 0.0), ..Default::default() },
                    ..Default::default()
                },
                SourceNode {
                    unique_id: 2,
                    name: "child".into(),
                    parent: Some(1),
                    rest: Srt { translation: Vec3::new(2.0, 0.0, 0.0), ..Default::default() },
                    ..Default::default()
                },
            ],
            frame_rate: 30.0,
            ..Default::default()
        }
    }

    #[test]
    fn linear_channel_interpolates_and_clamps() {
        let channel = linear(vec![0.0, 1.0], vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]);
        assert_eq!(channel.sample(0.5), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(channel.sample(-1.0), Some(Vec3::ZERO));
        assert_eq!(channel.sample(5.0), Some(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn step_channel_holds_previous_key() {
        let channel = Channel {
            times: vec![0.0, 1.0],
            values: vec![Vec3::ZERO, Vec3::ONE],
            interpolation: Interpolation::Step,
        };
        assert_eq!(channel.sample(0.99), Some(Vec3::ZERO));
        assert_eq!(channel.sample(1.0), Some(Vec3::ONE));
    }

    #[test]
    fn cubic_channel_hits_keys() {
        let channel = Channel {
            times: vec![0.0, 1.0],
            values: vec![Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, Vec3::ONE, Vec3::ZERO],
            interpolation: Interpolation::CubicSpline,
        };
        assert_eq!(channel.sample(0.0), Some(Vec3::ZERO));
        assert_eq!(channel.sample(1.0), Some(Vec3::ONE));
        let mid = channel.sample(0.5).unwrap();
        assert!((mid - Vec3::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn empty_channel_yields_nothing() {
        let channel: Channel<Vec3> = linear(vec![], vec![]);
        assert_eq!(channel.sample(0.0), None);
    }

    #[test]
    fn rest_pose_composes_parent_first() {
        let scene = two_nodes();
        let pose = scene.evaluate(None, 0.0).unwrap();
        assert_eq!(pose[1].global.w_axis.truncate(), Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(scene.rest_global(2).unwrap(), pose[1].global);
    }

    #[test]
    fn take_overrides_rest_channels() {
        let mut scene = two_nodes();
        let quarter = Quat::from_rotation_z(FRAC_PI_2);
        scene.takes.push(Take {
            name: "spin".into(),
            start: 0.0,
            stop: 1.0,
            tracks: vec![NodeTrack {
                node: 1,
                rotation: Some(linear(vec![0.0, 1.0], vec![Quat::IDENTITY, quarter])),
                ..Default::default()
            }],
        });
        let take = scene.find_take("spin");
        let pose = scene.evaluate(take, 1.0).unwrap();
        assert!(pose[0].local.rotation.abs_diff_eq(quarter, 1e-6));
        // translation keeps its rest value
        assert_eq!(pose[0].local.translation, Vec3::new(0.0, 1.0, 0.0));
        let child = pose[1].global.w_axis.truncate();
        assert!((child - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn parent_after_child_is_malformed() {
        let mut scene = two_nodes();
        scene.nodes.swap(0, 1);
        assert!(matches!(scene.evaluate(None, 0.0), Err(AssetError::MalformedAsset(_))));
    }
}
