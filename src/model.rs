use std::path::{Path, PathBuf};

use glam::{Mat4, Vec4};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    animation::{fetch_animations, sample_take, Animation, Keyframe},
    cache,
    config::ImportSettings,
    error::AssetError,
    import::load_gltf,
    material::{fetch_materials, Material, MaterialMap, DEFAULT_MATERIAL_ID},
    mesh::{fetch_meshes, Mesh},
    pose::{blend_animations, bone_transforms, update_animation, DrawConstants},
    scene::SceneGraph,
    source::SourceScene,
    Result,
};

/// One subset's draw: an index range and the constants to bind with it.
#[derive(Clone, Copy)]
pub struct SubsetDraw {
    pub material_unique_id: u64,
    pub start_index_location: u32,
    pub index_count: u32,
    pub constants: DrawConstants,
}

/// Everything needed to draw one mesh in one pose.
#[derive(Clone)]
pub struct MeshDraw {
    pub mesh_index: usize,
    pub subsets: Vec<SubsetDraw>,
}

/// A skinned asset: scene, meshes, materials and sampled clips.
///
/// This is exactly what the cache side-file stores. GPU resources are
/// created from it by the renderer after every load.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SkinnedModel {
    pub scene: SceneGraph,
    pub meshes: Vec<Mesh>,
    pub materials: MaterialMap,
    pub animation_clips: Vec<Animation>,
}

impl SkinnedModel {
    /// Loads `path` from its cache when there is a current one, otherwise
    /// imports it and writes the cache.
    pub fn load(path: &Path, settings: &ImportSettings) -> Result<Self> {
        let cache_path = cache::cache_path_for(path);
        if settings.use_cache {
            if let Some(model) = cache::load::<SkinnedModel>(&cache_path)? {
                return Ok(model);
            }
        }
        if !path.exists() {
            return Err(AssetError::AssetNotFound { path: path.to_path_buf() });
        }

        let source = load_gltf(path, settings)?;
        let model = Self::from_source(&source, settings)?;
        if settings.use_cache {
            cache::save(&cache_path, &model)?;
        }
        Ok(model)
    }

    /// Runs the import pipeline on an already read source scene.
    pub fn from_source(source: &SourceScene, settings: &ImportSettings) -> Result<Self> {
        let scene = build_scene(source)?;
        let mut materials = fetch_materials(source)?;
        let meshes = fetch_meshes(source, &scene, settings)?;
        for subset in meshes.iter().flat_map(|mesh| mesh.subsets.iter()) {
            if materials.contains_key(&subset.material_unique_id) {
                continue;
            }
            if subset.material_unique_id == DEFAULT_MATERIAL_ID {
                materials.insert(DEFAULT_MATERIAL_ID, Material::default());
            } else {
                return Err(AssetError::malformed(format!(
                    "subset uses unknown material {}",
                    subset.material_unique_id
                )));
            }
        }
        let animation_clips = fetch_animations(source, &scene, settings)?;

        info!(
            "imported {} nodes, {} meshes, {} materials, {} clips",
            scene.nodes.len(),
            meshes.len(),
            materials.len(),
            animation_clips.len()
        );
        Ok(Self {
            scene,
            meshes,
            materials,
            animation_clips,
        })
    }

    /// Samples every take of another file against this model's scene and
    /// appends the clips. The cache is left as it is; see [`SkinnedModel::save_cache`].
    pub fn append_animations(&mut self, path: &Path, sampling_rate: f32, settings: &ImportSettings) -> Result<usize> {
        let source = load_gltf(path, settings)?;
        self.append_source_animations(&source, sampling_rate)
    }

    /// `sampling_rate` 0 uses the source's native rate.
    pub fn append_source_animations(&mut self, source: &SourceScene, sampling_rate: f32) -> Result<usize> {
        let rate = if sampling_rate > 0.0 { sampling_rate } else { source.frame_rate };
        let before = self.animation_clips.len();
        for take in &source.takes {
            let clip = sample_take(source, take, &self.scene, rate)?;
            self.animation_clips.push(clip);
        }
        let added = self.animation_clips.len() - before;
        info!("appended {} clips", added);
        Ok(added)
    }

    pub fn save_cache(&self, source_path: &Path) -> Result<PathBuf> {
        let cache_path = cache::cache_path_for(source_path);
        cache::save(&cache_path, self)?;
        Ok(cache_path)
    }

    pub fn find_clip(&self, name: &str) -> Option<usize> {
        self.animation_clips.iter().position(|clip| clip.name == name)
    }

    pub fn update_animation(&self, keyframe: &mut Keyframe) -> Result<()> {
        update_animation(&self.scene, keyframe)
    }

    /// Blends two keyframes and brings the result's global transforms up to date.
    pub fn blend_animations(&self, keyframes: [&Keyframe; 2], factor: f32, keyframe: &mut Keyframe) -> Result<()> {
        blend_animations(keyframes, factor, keyframe)?;
        update_animation(&self.scene, keyframe)
    }

    /// Draw constants for every subset of every mesh.
    ///
    /// With a non-empty `keyframe` each mesh follows its node in that pose and
    /// its bones are skinned; otherwise meshes sit at their rest transform
    /// with an identity bone palette.
    pub fn prepare_draws(&self, world: Mat4, material_color: Vec4, keyframe: Option<&Keyframe>) -> Result<Vec<MeshDraw>> {
        let keyframe = keyframe.filter(|keyframe| !keyframe.is_empty());
        self.meshes
            .iter()
            .enumerate()
            .map(|(mesh_index, mesh)| {
                let (mesh_world, bones) = match keyframe {
                    Some(keyframe) => {
                        let node = usize::try_from(mesh.node_index)
                            .ok()
                            .and_then(|index| keyframe.nodes.get(index))
                            .ok_or_else(|| {
                                AssetError::malformed(format!("keyframe has no node for mesh '{}'", mesh.name))
                            })?;
                        (world * node.global_transform, bone_transforms(mesh, keyframe)?)
                    }
                    None => (world * mesh.default_global_transform, vec![]),
                };

                let subsets = mesh
                    .subsets
                    .iter()
                    .map(|subset| {
                        let material = self.materials.get(&subset.material_unique_id).ok_or_else(|| {
                            AssetError::malformed(format!("subset uses unknown material {}", subset.material_unique_id))
                        })?;
                        Ok(SubsetDraw {
                            material_unique_id: subset.material_unique_id,
                            start_index_location: subset.start_index_location,
                            index_count: subset.index_count,
                            constants: DrawConstants::new(mesh_world, material_color * material.kd, &bones),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                debug!("mesh '{}': {} subset draws", mesh.name, subsets.len());
                Ok(MeshDraw { mesh_index, subsets })
            })
            .collect()
    }
}

fn build_scene(source: &SourceScene) -> Result<SceneGraph> {
    let mut scene = SceneGraph::default();
    for node in &source.nodes {
        scene.push(node.unique_id, node.name.clone(), node.attribute);
    }
    let parent_ids: Vec<Option<u64>> = source.nodes.iter().map(|node| node.parent).collect();
    scene.resolve_parents(&parent_ids)?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{
        scene::NodeAttribute,
        source::{SourceNode, SourcePolygon, Srt, SourceMesh},
    };

    fn placed_triangle() -> SourceScene {
        SourceScene {
            nodes: vec![SourceNode {
                unique_id: 1,
                name: "tri".into(),
                attribute: NodeAttribute::Mesh,
                rest: Srt { translation: Vec3::new(0.0, 0.0, 3.0), ..Default::default() },
                ..Default::default()
            }],
            meshes: vec![SourceMesh {
                node: 1,
                control_points: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
                polygons: vec![SourcePolygon { corners: vec![0, 1, 2], material_slot: 0 }],
                ..Default::default()
            }],
            frame_rate: 30.0,
            ..Default::default()
        }
    }

    #[test]
    fn mesh_without_material_uses_the_default() {
        let model = SkinnedModel::from_source(&placed_triangle(), &ImportSettings::default()).unwrap();
        assert_eq!(model.materials.len(), 1);
        assert_eq!(model.materials[&DEFAULT_MATERIAL_ID], Material::default());
        assert_eq!(model.meshes[0].subsets[0].material_unique_id, DEFAULT_MATERIAL_ID);
    }

    #[test]
    fn static_draw_uses_the_rest_transform() {
        let model = SkinnedModel::from_source(&placed_triangle(), &ImportSettings::default()).unwrap();
        let world = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let draws = model.prepare_draws(world, Vec4::new(1.0, 0.5, 1.0, 1.0), None).unwrap();
        assert_eq!(draws.len(), 1);
        let constants = &draws[0].subsets[0].constants;
        assert_eq!(Mat4::from_cols_array_2d(&constants.world), world * Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)));
        assert_eq!(constants.material_color, [0.8, 0.4, 0.8, 1.0]);
        assert_eq!(constants.bone(0), Mat4::IDENTITY);

        // an empty keyframe counts as no pose
        let empty = Keyframe::default();
        let posed = model.prepare_draws(world, Vec4::ONE, Some(&empty)).unwrap();
        assert_eq!(posed[0].subsets[0].constants.world, constants.world);
    }

    #[test]
    fn posed_draw_follows_the_mesh_node() {
        let model = SkinnedModel::from_source(&placed_triangle(), &ImportSettings::default()).unwrap();
        let mut keyframe = Keyframe::identity(1);
        keyframe.nodes[0].translation = Vec3::new(0.0, 2.0, 0.0);
        model.update_animation(&mut keyframe).unwrap();
        let draws = model.prepare_draws(Mat4::IDENTITY, Vec4::ONE, Some(&keyframe)).unwrap();
        assert_eq!(
            Mat4::from_cols_array_2d(&draws[0].subsets[0].constants.world),
            Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0))
        );
    }

    #[test]
    fn appended_takes_are_sampled_against_this_scene() {
        let mut model = SkinnedModel::from_source(&placed_triangle(), &ImportSettings::default()).unwrap();
        assert!(model.animation_clips.is_empty());

        let mut other = placed_triangle();
        other.takes.push(crate::source::Take { name: "idle".into(), start: 0.0, stop: 0.5, ..Default::default() });
        assert_eq!(model.append_source_animations(&other, 10.0).unwrap(), 1);
        assert_eq!(model.find_clip("idle"), Some(0));
        let clip = &model.animation_clips[0];
        assert_eq!(clip.sequence.len(), 5);
        assert_eq!(clip.sequence[0].nodes[0].translation, Vec3::new(0.0, 0.0, 3.0));
    }
}
