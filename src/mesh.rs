use glam::{Mat4, Vec3};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::ImportSettings,
    error::AssetError,
    influence::{gather_contributions, resolve_influences, VertexInfluences, MAX_BONE_INFLUENCES},
    material::DEFAULT_MATERIAL_ID,
    scene::{NodeAttribute, SceneGraph},
    skeleton::Skeleton,
    source::{SourceMesh, SourceScene},
    tangents::generate_tangents_for_triangles,
    Result,
};

/// GPU vertex layout of a skinned mesh.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
    pub texcoord: [f32; 2],
    pub bone_weights: [f32; MAX_BONE_INFLUENCES],
    pub bone_indices: [u32; MAX_BONE_INFLUENCES],
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            normal: [0.0, 1.0, 0.0],
            tangent: [1.0, 0.0, 0.0, 1.0],
            texcoord: [0.0; 2],
            bone_weights: [0.0; MAX_BONE_INFLUENCES],
            bone_indices: [0; MAX_BONE_INFLUENCES],
        }
    }
}

/// Contiguous range of the index buffer drawn with one material.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Subset {
    pub material_unique_id: u64,
    pub material_name: String,
    pub start_index_location: u32,
    pub index_count: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(-f32::MAX),
        }
    }
}

impl Aabb {
    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mesh {
    pub unique_id: u64,
    pub name: String,
    /// Position of the mesh's node in the scene graph
    pub node_index: i64,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub default_global_transform: Mat4,
    pub subsets: Vec<Subset>,
    pub bind_pose: Skeleton,
    pub bounding_box: Aabb,
}

/// Polygon-vertex and control point indices of one triangle.
struct Triangle {
    corners: [usize; 3],
    control_points: [u32; 3],
    material_slot: usize,
}

fn triangulate(mesh: &SourceMesh, settings: &ImportSettings) -> Result<Vec<Triangle>> {
    let mut triangles = Vec::with_capacity(mesh.polygons.len());
    let mut base = 0;
    for (polygon_index, polygon) in mesh.polygons.iter().enumerate() {
        let corner_count = polygon.corners.len();
        match corner_count {
            n if n == 3 || (n > 3 && settings.triangulate) => {
                for k in 1..n - 1 {
                    triangles.push(Triangle {
                        corners: [base, base + k, base + k + 1],
                        control_points: [polygon.corners[0], polygon.corners[k], polygon.corners[k + 1]],
                        material_slot: polygon.material_slot,
                    });
                }
            }
            n if n < 3 && settings.triangulate => {
                warn!("dropping degenerate polygon {} with {} corners", polygon_index, n);
            }
            n => {
                return Err(AssetError::malformed(format!(
                    "polygon {} has {} corners, enable triangulation to import it",
                    polygon_index, n
                )));
            }
        }
        base += corner_count;
    }
    Ok(triangles)
}

fn check_corner_attribute<T>(attribute: &Option<Vec<T>>, expected: usize, name: &str) -> Result<()> {
    match attribute {
        Some(values) if values.len() != expected => Err(AssetError::malformed(format!(
            "{} {} given for {} polygon vertices",
            values.len(),
            name,
            expected
        ))),
        _ => Ok(()),
    }
}

/// Assembles one mesh in draw order.
///
/// Every triangle corner becomes its own vertex, so vertex and index counts
/// are both three times the triangle count. The index buffer is grouped by
/// material subset.
pub fn build_mesh(
    source_mesh: &SourceMesh,
    source: &SourceScene,
    scene: &SceneGraph,
    default_global_transform: Mat4,
    settings: &ImportSettings,
) -> Result<Mesh> {
    let node_index = scene.index_of(source_mesh.node);
    let node = scene
        .node(node_index)
        .ok_or_else(|| AssetError::malformed(format!("mesh node {} is not in the scene", source_mesh.node)))?;
    let source_node = source
        .node_index(source_mesh.node)
        .map(|index| &source.nodes[index])
        .ok_or_else(|| AssetError::malformed(format!("mesh node {} is not in the source", source_mesh.node)))?;

    let polygon_vertex_count = source_mesh.polygon_vertex_count();
    check_corner_attribute(&source_mesh.normals, polygon_vertex_count, "normals")?;
    check_corner_attribute(&source_mesh.texcoords, polygon_vertex_count, "texcoords")?;
    check_corner_attribute(&source_mesh.tangents, polygon_vertex_count, "tangents")?;

    let bind_pose = Skeleton::from_clusters(source_mesh, scene)?;
    let rigid_unweighted = settings.rigid_unweighted_vertices && !bind_pose.bones.is_empty();
    let influences: Vec<VertexInfluences> = gather_contributions(source_mesh)?
        .iter()
        .map(|contributions| {
            if contributions.is_empty() && rigid_unweighted {
                return VertexInfluences::rigid();
            }
            let mut resolved = resolve_influences(contributions, settings.eviction);
            if settings.renormalize_weights {
                resolved.renormalize();
            }
            resolved
        })
        .collect();

    let material_count = source_node.materials.len();
    let mut subsets: Vec<Subset> = if material_count == 0 {
        vec![Subset { material_unique_id: DEFAULT_MATERIAL_ID, ..Default::default() }]
    } else {
        source_node
            .materials
            .iter()
            .map(|&material_id| Subset {
                material_unique_id: material_id,
                material_name: source.material(material_id).map(|m| m.name.clone()).unwrap_or_default(),
                ..Default::default()
            })
            .collect()
    };

    let triangles = triangulate(source_mesh, settings)?;

    // First pass counts indices per subset, then each subset's count is reset
    // and reused as its write cursor.
    for triangle in &triangles {
        let slot = if material_count > 0 { triangle.material_slot } else { 0 };
        let subset = subsets.get_mut(slot).ok_or_else(|| {
            AssetError::malformed(format!(
                "polygon uses material slot {} of {}",
                triangle.material_slot, material_count
            ))
        })?;
        subset.index_count += 3;
    }
    let mut offset = 0;
    for subset in &mut subsets {
        subset.start_index_location = offset;
        offset += subset.index_count;
        subset.index_count = 0;
    }

    let mut vertices = vec![Vertex::default(); triangles.len() * 3];
    let mut indices = vec![0u32; triangles.len() * 3];
    let mut bounding_box = Aabb::default();

    for (triangle_index, triangle) in triangles.iter().enumerate() {
        let slot = if material_count > 0 { triangle.material_slot } else { 0 };
        let subset = &mut subsets[slot];
        let subset_offset = (subset.start_index_location + subset.index_count) as usize;

        for (position_in_triangle, &polygon_vertex) in triangle.corners.iter().enumerate() {
            let vertex_index = triangle_index * 3 + position_in_triangle;
            let control_point = triangle.control_points[position_in_triangle] as usize;
            let position = *source_mesh.control_points.get(control_point).ok_or_else(|| {
                AssetError::malformed(format!(
                    "polygon references control point {} of {}",
                    control_point,
                    source_mesh.control_points.len()
                ))
            })?;

            let mut vertex = Vertex {
                position: position.to_array(),
                bone_weights: influences[control_point].weights,
                bone_indices: influences[control_point].indices,
                ..Default::default()
            };
            if let Some(normals) = &source_mesh.normals {
                vertex.normal = normals[polygon_vertex].to_array();
            }
            if let Some(texcoords) = &source_mesh.texcoords {
                vertex.texcoord = texcoords[polygon_vertex].to_array();
            }
            if let Some(tangents) = &source_mesh.tangents {
                vertex.tangent = tangents[polygon_vertex].to_array();
            }

            bounding_box.extend(position);
            vertices[vertex_index] = vertex;
            indices[subset_offset + position_in_triangle] = vertex_index as u32;
        }
        subset.index_count += 3;
    }

    let can_generate_tangents = source_mesh.normals.is_some() && source_mesh.texcoords.is_some();
    if source_mesh.tangents.is_none() && settings.generate_tangents && can_generate_tangents {
        if let Err(e) = generate_tangents_for_triangles(&mut vertices) {
            warn!("keeping default tangents for mesh '{}': {}", node.name, e);
        }
    }

    debug!(
        "mesh '{}': {} triangles, {} subsets, {} bones",
        node.name,
        triangles.len(),
        subsets.len(),
        bind_pose.bones.len()
    );

    Ok(Mesh {
        unique_id: source_mesh.node,
        name: node.name.clone(),
        node_index,
        vertices,
        indices,
        default_global_transform,
        subsets,
        bind_pose,
        bounding_box,
    })
}

/// Builds every mesh node of `scene`, in scene order.
pub fn fetch_meshes(source: &SourceScene, scene: &SceneGraph, settings: &ImportSettings) -> Result<Vec<Mesh>> {
    let rest_pose = source.evaluate(None, 0.0)?;
    let mut meshes = vec![];
    for node in scene.nodes.iter().filter(|node| node.attribute == NodeAttribute::Mesh) {
        let source_mesh = source
            .meshes
            .iter()
            .find(|mesh| mesh.node == node.unique_id)
            .ok_or_else(|| AssetError::malformed(format!("mesh node '{}' has no geometry", node.name)))?;
        let default_global_transform = source
            .node_index(node.unique_id)
            .map(|index| rest_pose[index].global)
            .ok_or_else(|| AssetError::malformed(format!("mesh node '{}' is not in the source", node.name)))?;
        meshes.push(build_mesh(source_mesh, source, scene, default_global_transform, settings)?);
    }
    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec4};

    use super::*;
    use crate::source::{SkinCluster, SourceMaterial, SourceNode, SourcePolygon, SourceSkin};

    fn triangle(corners: [u32; 3], material_slot: usize) -> SourcePolygon {
        SourcePolygon { corners: corners.to_vec(), material_slot }
    }

    fn scene_for(source: &SourceScene) -> SceneGraph {
        let mut scene = SceneGraph::default();
        for node in &source.nodes {
            scene.push(node.unique_id, node.name.clone(), node.attribute);
        }
        let parents: Vec<_> = source.nodes.iter().map(|node| node.parent).collect();
        scene.resolve_parents(&parents).unwrap();
        scene
    }

    fn two_material_quad() -> SourceScene {
        SourceScene {
            nodes: vec![SourceNode {
                unique_id: 1,
                name: "quad".into(),
                attribute: NodeAttribute::Mesh,
                materials: vec![10, 20],
                ..Default::default()
            }],
            meshes: vec![SourceMesh {
                node: 1,
                control_points: vec![
                    Vec3::new(-1.0, 0.0, 2.0),
                    Vec3::new(3.0, -2.0, 0.0),
                    Vec3::new(0.0, 5.0, -1.0),
                    Vec3::new(1.0, 1.0, 1.0),
                ],
                polygons: vec![triangle([0, 1, 2], 1), triangle([0, 2, 3], 0), triangle([1, 2, 3], 1)],
                ..Default::default()
            }],
            materials: vec![
                SourceMaterial { unique_id: 10, name: "first".into(), ..Default::default() },
                SourceMaterial { unique_id: 20, name: "second".into(), ..Default::default() },
            ],
            frame_rate: 30.0,
            ..Default::default()
        }
    }

    #[test]
    fn subsets_partition_the_index_buffer() {
        let source = two_material_quad();
        let scene = scene_for(&source);
        let meshes = fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap();
        let mesh = &meshes[0];

        assert_eq!(mesh.vertices.len(), 9);
        assert_eq!(mesh.indices.len(), 9);
        assert_eq!(mesh.subsets[0].material_unique_id, 10);
        assert_eq!(mesh.subsets[0].material_name, "first");
        assert_eq!((mesh.subsets[0].start_index_location, mesh.subsets[0].index_count), (0, 3));
        assert_eq!((mesh.subsets[1].start_index_location, mesh.subsets[1].index_count), (3, 6));
        // polygon 1 goes first, then polygons 0 and 2 in order
        assert_eq!(mesh.indices, vec![3, 4, 5, 0, 1, 2, 6, 7, 8]);
        assert_eq!(mesh.vertices[4].position, [0.0, 5.0, -1.0]);
    }

    #[test]
    fn bounding_box_is_componentwise() {
        let source = two_material_quad();
        let scene = scene_for(&source);
        let mesh = &fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap()[0];
        assert_eq!(mesh.bounding_box.min, Vec3::new(-1.0, -2.0, -1.0));
        assert_eq!(mesh.bounding_box.max, Vec3::new(3.0, 5.0, 2.0));
        assert!(!mesh.bounding_box.is_empty());
        assert!(Aabb::default().is_empty());
    }

    #[test]
    fn positions_only_mesh_keeps_attribute_defaults() {
        let source = two_material_quad();
        let scene = scene_for(&source);
        let mesh = &fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap()[0];
        for vertex in &mesh.vertices {
            assert_eq!(vertex.normal, [0.0, 1.0, 0.0]);
            assert_eq!(vertex.tangent, [1.0, 0.0, 0.0, 1.0]);
            assert_eq!(vertex.texcoord, [0.0, 0.0]);
            assert_eq!(vertex.bone_weights, [0.0; 4]);
        }
    }

    #[test]
    fn mesh_without_materials_gets_one_default_subset() {
        let mut source = two_material_quad();
        source.nodes[0].materials.clear();
        let scene = scene_for(&source);
        let mesh = &fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap()[0];
        assert_eq!(mesh.subsets.len(), 1);
        assert_eq!(mesh.subsets[0].material_unique_id, DEFAULT_MATERIAL_ID);
        assert_eq!(mesh.subsets[0].index_count, 9);
        assert_eq!(mesh.indices, (0..9).collect::<Vec<u32>>());
    }

    #[test]
    fn per_corner_attributes_follow_polygon_vertices() {
        let mut source = two_material_quad();
        source.meshes[0].normals = Some((0..9).map(|i| Vec3::new(i as f32, 0.0, 1.0)).collect());
        source.meshes[0].texcoords = Some((0..9).map(|i| Vec2::new(0.0, i as f32)).collect());
        source.meshes[0].tangents = Some(vec![Vec4::new(0.0, 1.0, 0.0, -1.0); 9]);
        let scene = scene_for(&source);
        let mesh = &fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap()[0];
        assert_eq!(mesh.vertices[7].normal, [7.0, 0.0, 1.0]);
        assert_eq!(mesh.vertices[7].texcoord, [0.0, 7.0]);
        assert_eq!(mesh.vertices[7].tangent, [0.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn attribute_count_mismatch_is_malformed() {
        let mut source = two_material_quad();
        source.meshes[0].normals = Some(vec![Vec3::Z; 4]);
        let scene = scene_for(&source);
        assert!(matches!(
            fetch_meshes(&source, &scene, &ImportSettings::default()),
            Err(AssetError::MalformedAsset(_))
        ));
    }

    #[test]
    fn quads_need_triangulation() {
        let mut source = two_material_quad();
        source.meshes[0].polygons = vec![
            SourcePolygon { corners: vec![0, 1, 2, 3], material_slot: 0 },
            SourcePolygon { corners: vec![0, 1], material_slot: 0 },
        ];
        let scene = scene_for(&source);
        assert!(fetch_meshes(&source, &scene, &ImportSettings::default()).is_err());

        let settings = ImportSettings { triangulate: true, ..Default::default() };
        let mesh = &fetch_meshes(&source, &scene, &settings).unwrap()[0];
        assert_eq!(mesh.vertices.len(), 6);
        assert_eq!(mesh.vertices[3].position, [-1.0, 0.0, 2.0]);
        assert_eq!(mesh.vertices[4].position, [0.0, 5.0, -1.0]);
        assert_eq!(mesh.vertices[5].position, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn out_of_range_control_point_is_malformed() {
        let mut source = two_material_quad();
        source.meshes[0].polygons.push(triangle([0, 1, 9], 0));
        let scene = scene_for(&source);
        assert!(fetch_meshes(&source, &scene, &ImportSettings::default()).is_err());
    }

    #[test]
    fn out_of_range_material_slot_is_malformed() {
        let mut source = two_material_quad();
        source.meshes[0].polygons.push(triangle([0, 1, 2], 5));
        let scene = scene_for(&source);
        assert!(fetch_meshes(&source, &scene, &ImportSettings::default()).is_err());
    }

    #[test]
    fn skinned_vertices_carry_resolved_influences() {
        let mut source = two_material_quad();
        source.nodes.push(SourceNode {
            unique_id: 2,
            name: "bone".into(),
            attribute: NodeAttribute::Skeleton,
            ..Default::default()
        });
        source.meshes[0].skins = vec![SourceSkin {
            clusters: vec![SkinCluster {
                link: 2,
                control_point_indices: vec![0, 1, 2, 3],
                weights: vec![0.5, 0.5, 0.5, 0.5],
                reference_transform: Mat4::IDENTITY,
                link_transform: Mat4::IDENTITY,
            }],
        }];
        let scene = scene_for(&source);

        let mesh = &fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap()[0];
        assert_eq!(mesh.bind_pose.bones.len(), 1);
        assert!(mesh.vertices.iter().all(|v| v.bone_weights == [0.5, 0.0, 0.0, 0.0]));

        let settings = ImportSettings { renormalize_weights: true, ..Default::default() };
        let mesh = &fetch_meshes(&source, &scene, &settings).unwrap()[0];
        assert!(mesh.vertices.iter().all(|v| v.bone_weights == [1.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn unweighted_vertices_can_be_bound_to_the_first_bone() {
        let mut source = two_material_quad();
        source.nodes.push(SourceNode {
            unique_id: 2,
            name: "bone".into(),
            attribute: NodeAttribute::Skeleton,
            ..Default::default()
        });
        source.meshes[0].skins = vec![SourceSkin {
            clusters: vec![SkinCluster {
                link: 2,
                control_point_indices: vec![0],
                weights: vec![0.5],
                reference_transform: Mat4::IDENTITY,
                link_transform: Mat4::IDENTITY,
            }],
        }];
        let scene = scene_for(&source);
        // vertex 0 is control point 0, vertex 1 is the untouched control point 1
        let weights_of = |mesh: &Mesh| -> Vec<[f32; 4]> { mesh.vertices.iter().map(|v| v.bone_weights).collect() };

        let mesh = &fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap()[0];
        let weights = weights_of(mesh);
        assert_eq!(weights[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(weights[1], [0.0; 4]);

        let settings = ImportSettings { rigid_unweighted_vertices: true, ..Default::default() };
        let mesh = &fetch_meshes(&source, &scene, &settings).unwrap()[0];
        let weights = weights_of(mesh);
        assert_eq!(weights[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(weights[1], [1.0, 0.0, 0.0, 0.0]);
        assert!(mesh.vertices.iter().all(|v| v.bone_indices == [0; 4]));

        // without a skin there is no bone 0 to bind to
        source.meshes[0].skins.clear();
        let mesh = &fetch_meshes(&source, &scene, &settings).unwrap()[0];
        assert!(mesh.vertices.iter().all(|v| v.bone_weights == [0.0; 4]));
    }

    #[test]
    fn tangents_are_generated_when_missing() {
        let mut source = two_material_quad();
        source.meshes[0].control_points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        source.meshes[0].polygons = vec![triangle([0, 1, 2], 0), triangle([0, 2, 3], 0)];
        source.meshes[0].normals = Some(vec![Vec3::Z; 6]);
        source.meshes[0].texcoords = Some(
            [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
                .iter()
                .map(|uv| Vec2::from(*uv))
                .collect(),
        );
        let scene = scene_for(&source);
        let mesh = &fetch_meshes(&source, &scene, &ImportSettings::default()).unwrap()[0];
        assert!(mesh.vertices.iter().all(|v| (v.tangent[0] - 1.0).abs() < 1e-4));

        let settings = ImportSettings { generate_tangents: false, ..Default::default() };
        let mesh = &fetch_meshes(&source, &scene, &settings).unwrap()[0];
        assert!(mesh.vertices.iter().all(|v| v.tangent == [1.0, 0.0, 0.0, 1.0]));
    }
}
