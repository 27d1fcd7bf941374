use glam::Vec3;
use gltf::image::Source;
use log::warn;

use super::material_unique_id;
use crate::{
    material::Material,
    source::{MaterialProperty, SourceMaterial},
};

/// File reference of a texture; embedded images have none.
fn texture_uri(texture: &gltf::Texture) -> Option<String> {
    match texture.source().source() {
        Source::Uri { uri, .. } if !uri.starts_with("data:") => Some(uri.to_string()),
        _ => {
            warn!(
                "texture {} is embedded, a fallback texture will be used",
                texture.index()
            );
            None
        }
    }
}

pub(super) fn read_material(material: &gltf::Material) -> SourceMaterial {
    let defaults = Material::default();
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _] = pbr.base_color_factor();

    SourceMaterial {
        unique_id: material_unique_id(material.index()),
        name: material
            .name()
            .map_or_else(|| format!("material{}", material.index().unwrap_or_default()), str::to_string),
        diffuse: Some(MaterialProperty {
            color: Vec3::new(r, g, b),
            texture: pbr.base_color_texture().and_then(|info| texture_uri(&info.texture())),
        }),
        specular: pbr.metallic_roughness_texture().map(|info| MaterialProperty {
            color: defaults.ks.truncate(),
            texture: texture_uri(&info.texture()),
        }),
        ambient: material.occlusion_texture().map(|occlusion| MaterialProperty {
            color: defaults.ka.truncate(),
            texture: texture_uri(&occlusion.texture()),
        }),
        normal_map: material.normal_texture().and_then(|normal| texture_uri(&normal.texture())),
    }
}
