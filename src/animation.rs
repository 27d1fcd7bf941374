use glam::{Mat4, Quat, Vec3};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::ImportSettings,
    error::AssetError,
    scene::SceneGraph,
    source::{EvaluatedNode, SourceScene, Take},
    Result,
};

/// Local S/R/T of one scene node in a keyframe, plus its global transform.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct KeyNode {
    pub global_transform: Mat4,
    pub scaling: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for KeyNode {
    fn default() -> Self {
        Self {
            global_transform: Mat4::IDENTITY,
            scaling: Vec3::ONE,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
        }
    }
}

impl From<&EvaluatedNode> for KeyNode {
    fn from(evaluated: &EvaluatedNode) -> Self {
        Self {
            global_transform: evaluated.global,
            scaling: evaluated.local.scale,
            rotation: evaluated.local.rotation,
            translation: evaluated.local.translation,
        }
    }
}

impl KeyNode {
    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scaling, self.rotation, self.translation)
    }
}

/// Pose of the whole scene at one sample; `nodes[i]` belongs to scene node `i`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Keyframe {
    pub nodes: Vec<KeyNode>,
}

impl Keyframe {
    pub fn identity(node_count: usize) -> Self {
        Self {
            nodes: vec![KeyNode::default(); node_count],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Animation {
    pub name: String,
    /// Samples per second
    pub sampling_rate: f32,
    pub sequence: Vec<Keyframe>,
}

impl Animation {
    pub fn duration(&self) -> f32 {
        if self.sampling_rate > 0.0 {
            self.sequence.len() as f32 / self.sampling_rate
        } else {
            0.0
        }
    }
}

/// Number of samples covering `[start, stop)` at `rate` samples per second.
pub fn sample_count(start: f64, stop: f64, rate: f32) -> usize {
    let span = stop - start;
    if span <= 0.0 || rate <= 0.0 {
        return 0;
    }
    (span * rate as f64).ceil() as usize
}

/// Samples `take` at a fixed rate into one keyframe per step.
///
/// Scene nodes are matched to `source` nodes by name, so a take from a
/// different file can drive this scene as long as the names agree. Nodes
/// without a match keep the identity key.
pub fn sample_take(source: &SourceScene, take: &Take, scene: &SceneGraph, sampling_rate: f32) -> Result<Animation> {
    if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
        return Err(AssetError::malformed(format!(
            "take '{}' sampled at invalid rate {}",
            take.name, sampling_rate
        )));
    }

    let node_map: Vec<Option<usize>> = scene
        .nodes
        .iter()
        .map(|node| source.find_node_by_name(&node.name))
        .collect();
    let unmatched = node_map.iter().filter(|found| found.is_none()).count();
    if unmatched > 0 {
        warn!(
            "take '{}': {} of {} scene nodes have no source node, they keep the identity pose",
            take.name,
            unmatched,
            scene.nodes.len()
        );
    }

    let count = sample_count(take.start, take.stop, sampling_rate);
    let step = 1.0 / sampling_rate as f64;
    let mut sequence = Vec::with_capacity(count);
    for i in 0..count {
        let time = take.start + i as f64 * step;
        let evaluated = source.evaluate(Some(take), time)?;
        let nodes = node_map
            .iter()
            .map(|found| found.map_or_else(KeyNode::default, |index| KeyNode::from(&evaluated[index])))
            .collect();
        sequence.push(Keyframe { nodes });
    }

    debug!(
        "take '{}': [{}, {}) at {} Hz -> {} keyframes",
        take.name, take.start, take.stop, sampling_rate, count
    );
    Ok(Animation {
        name: take.name.clone(),
        sampling_rate,
        sequence,
    })
}

/// Samples every take of `source` against `scene`.
pub fn fetch_animations(source: &SourceScene, scene: &SceneGraph, settings: &ImportSettings) -> Result<Vec<Animation>> {
    let sampling_rate = settings.effective_sampling_rate(source.frame_rate);
    let animations = source
        .takes
        .iter()
        .map(|take| sample_take(source, take, scene, sampling_rate))
        .collect::<Result<Vec<_>>>()?;
    info!("sampled {} animation clips at {} Hz", animations.len(), sampling_rate);
    Ok(animations)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;
    use crate::{
        scene::NodeAttribute,
        source::{Channel, Interpolation, NodeTrack, SourceNode, Srt},
    };

    fn spinning_bone() -> SourceScene {
        SourceScene {
            nodes: vec![
                SourceNode { unique_id: 1, name: "root".into(), attribute: NodeAttribute::Null, ..Default::default() },
                SourceNode {
                    unique_id: 2,
                    name: "bone".into(),
                    attribute: NodeAttribute::Skeleton,
                    parent: Some(1),
                    rest: Srt { translation: Vec3::new(0.0, 1.0, 0.0), ..Default::default() },
                    ..Default::default()
                },
            ],
            takes: vec![Take {
                name: "spin".into(),
                start: 0.0,
                stop: 1.0,
                tracks: vec![NodeTrack {
                    node: 2,
                    rotation: Some(Channel {
                        times: vec![0.0, 1.0],
                        values: vec![Quat::IDENTITY, Quat::from_rotation_y(FRAC_PI_2)],
                        interpolation: Interpolation::Linear,
                    }),
                    ..Default::default()
                }],
            }],
            frame_rate: 30.0,
            ..Default::default()
        }
    }

    fn scene_of(names: &[&str]) -> SceneGraph {
        let mut scene = SceneGraph::default();
        for (i, name) in names.iter().enumerate() {
            scene.push(i as u64 + 1, *name, NodeAttribute::Null);
        }
        scene
    }

    #[test]
    fn one_second_at_thirty_hz_is_thirty_samples() {
        assert_eq!(sample_count(0.0, 1.0, 30.0), 30);
        assert_eq!(sample_count(0.0, 1.0, 1.0), 1);
        assert_eq!(sample_count(0.0, 1.01, 1.0), 2);
        assert_eq!(sample_count(1.0, 1.0, 30.0), 0);
        assert_eq!(sample_count(0.0, 1.0, 0.0), 0);

        let source = spinning_bone();
        let animations = fetch_animations(&source, &scene_of(&["root", "bone"]), &ImportSettings::default()).unwrap();
        assert_eq!(animations.len(), 1);
        assert_eq!(animations[0].sampling_rate, 30.0);
        assert_eq!(animations[0].sequence.len(), 30);
        // last sample is at 29/30 s, short of the final key
        let last = animations[0].sequence[29].nodes[1].rotation;
        assert!(!last.abs_diff_eq(Quat::from_rotation_y(FRAC_PI_2), 1e-4));
    }

    #[test]
    fn one_hertz_keeps_only_the_start_pose() {
        let source = spinning_bone();
        let settings = ImportSettings { sampling_rate: 1.0, ..Default::default() };
        let animations = fetch_animations(&source, &scene_of(&["root", "bone"]), &settings).unwrap();
        let sequence = &animations[0].sequence;
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence[0].nodes[1].rotation, Quat::IDENTITY);
        assert_eq!(sequence[0].nodes[1].translation, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(sequence[0].nodes[1].global_transform, Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn unmatched_scene_nodes_keep_identity() {
        let source = spinning_bone();
        let take = &source.takes[0];
        let animation = sample_take(&source, take, &scene_of(&["bone", "prop"]), 4.0).unwrap();
        assert_eq!(animation.sequence.len(), 4);
        for keyframe in &animation.sequence {
            assert_eq!(keyframe.nodes.len(), 2);
            assert_eq!(keyframe.nodes[1], KeyNode::default());
        }
        let half = animation.sequence[2].nodes[0].rotation;
        assert!(half.abs_diff_eq(Quat::from_rotation_y(FRAC_PI_2 / 2.0), 1e-5));
    }

    #[test]
    fn invalid_rate_is_rejected() {
        let source = spinning_bone();
        assert!(sample_take(&source, &source.takes[0], &scene_of(&["root"]), 0.0).is_err());
        assert!(sample_take(&source, &source.takes[0], &scene_of(&["root"]), f32::NAN).is_err());
    }

    #[test]
    fn duration_follows_sequence() {
        let animation = Animation {
            name: "idle".into(),
            sampling_rate: 10.0,
            sequence: vec![Keyframe::identity(3); 5],
        };
        assert_eq!(animation.duration(), 0.5);
        assert!(Keyframe::default().is_empty());
    }
}
