use std::collections::BTreeMap;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::{
    error::AssetError,
    source::{MaterialProperty, SourceScene},
    Result,
};

pub const DIFFUSE_TEXTURE: usize = 0;
pub const NORMAL_TEXTURE: usize = 1;
pub const AMBIENT_TEXTURE: usize = 2;
pub const SPECULAR_TEXTURE: usize = 3;
pub const TEXTURE_SLOTS: usize = 4;

/// Material id used by polygons that have no material.
pub const DEFAULT_MATERIAL_ID: u64 = 0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Material {
    pub unique_id: u64,
    pub name: String,
    pub ka: Vec4,
    pub kd: Vec4,
    pub ks: Vec4,
    /// Paths relative to the source asset; empty when the slot has no texture
    pub texture_filenames: [String; TEXTURE_SLOTS],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            unique_id: DEFAULT_MATERIAL_ID,
            name: String::new(),
            ka: Vec4::new(0.2, 0.2, 0.2, 1.0),
            kd: Vec4::new(0.8, 0.8, 0.8, 1.0),
            ks: Vec4::new(1.0, 1.0, 1.0, 1.0),
            texture_filenames: Default::default(),
        }
    }
}

fn opaque(color: Vec3) -> Vec4 {
    color.extend(1.0)
}

fn texture_name(property: &MaterialProperty) -> String {
    property.texture.clone().unwrap_or_default()
}

pub type MaterialMap = BTreeMap<u64, Material>;

/// Collects the materials bound to every node of `source`. Nodes without a
/// material, and polygons bound to [`DEFAULT_MATERIAL_ID`], contribute the
/// default material.
pub fn fetch_materials(source: &SourceScene) -> Result<MaterialMap> {
    let mut materials = MaterialMap::new();
    for node in &source.nodes {
        if node.materials.is_empty() {
            materials.entry(DEFAULT_MATERIAL_ID).or_default();
            continue;
        }
        for &material_id in &node.materials {
            if material_id == DEFAULT_MATERIAL_ID {
                materials.entry(DEFAULT_MATERIAL_ID).or_default();
                continue;
            }
            let source_material = source.material(material_id).ok_or_else(|| {
                AssetError::malformed(format!(
                    "node '{}' uses missing material {}",
                    node.name, material_id
                ))
            })?;

            let mut material = Material {
                unique_id: source_material.unique_id,
                name: source_material.name.clone(),
                ..Default::default()
            };
            if let Some(diffuse) = &source_material.diffuse {
                material.kd = opaque(diffuse.color);
                material.texture_filenames[DIFFUSE_TEXTURE] = texture_name(diffuse);
            }
            if let Some(specular) = &source_material.specular {
                material.ks = opaque(specular.color);
                material.texture_filenames[SPECULAR_TEXTURE] = texture_name(specular);
            }
            if let Some(ambient) = &source_material.ambient {
                material.ka = opaque(ambient.color);
                material.texture_filenames[AMBIENT_TEXTURE] = texture_name(ambient);
            }
            if let Some(normal_map) = &source_material.normal_map {
                material.texture_filenames[NORMAL_TEXTURE] = normal_map.clone();
            }
            materials.insert(material.unique_id, material);
        }
    }
    Ok(materials)
}
