use std::{collections::HashMap, path::{Path, PathBuf}};

use generational_arena::{Arena, Index};
use log::{debug, info};

use crate::{
    error::AssetError,
    material::{Material, NORMAL_TEXTURE, TEXTURE_SLOTS},
    Result,
};

pub type TextureId = Index;

/// Side length of generated flat-colour textures.
pub const FALLBACK_DIMENSION: u32 = 16;

pub const WHITE: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
/// Tangent-space "straight up" normal.
pub const FLAT_NORMAL: [u8; 4] = [0x7F, 0x7F, 0xFF, 0xFF];

/// Decoded RGBA8 pixels, row major.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    pub fn flat(color: [u8; 4], dimension: u32) -> Self {
        Self {
            width: dimension,
            height: dimension,
            pixels: color.repeat((dimension * dimension) as usize),
        }
    }
}

fn load_texture(path: &Path) -> Result<TextureData> {
    if !path.exists() {
        return Err(AssetError::AssetNotFound { path: path.to_path_buf() });
    }
    let bytes = std::fs::read(path)?;
    let img = image::load_from_memory(&bytes)?.to_rgba8();
    Ok(TextureData {
        width: img.width(),
        height: img.height(),
        pixels: img.into_raw(),
    })
}

/// Owns every texture loaded for the models that use it. Files are decoded
/// once per resolved path and flat colours once per colour.
#[derive(Default)]
pub struct TextureTable {
    pub textures: Arena<TextureData>,
    by_path: HashMap<PathBuf, TextureId>,
    fallbacks: HashMap<[u8; 4], TextureId>,
}

impl TextureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: TextureId) -> Option<&TextureData> {
        self.textures.get(id)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn load(&mut self, path: &Path) -> Result<TextureId> {
        if let Some(&id) = self.by_path.get(path) {
            return Ok(id);
        }
        let data = load_texture(path)?;
        debug!("loaded texture {} ({}x{})", path.display(), data.width, data.height);
        let id = self.textures.insert(data);
        self.by_path.insert(path.to_path_buf(), id);
        Ok(id)
    }

    pub fn fallback(&mut self, color: [u8; 4]) -> TextureId {
        if let Some(&id) = self.fallbacks.get(&color) {
            return id;
        }
        let id = self.textures.insert(TextureData::flat(color, FALLBACK_DIMENSION));
        self.fallbacks.insert(color, id);
        id
    }

    /// Texture for every slot of `material`. References are relative to the
    /// directory of `asset_path`; empty slots get a flat fallback.
    pub fn resolve_material(&mut self, asset_path: &Path, material: &Material) -> Result<[TextureId; TEXTURE_SLOTS]> {
        let directory = asset_path.parent().unwrap_or_else(|| Path::new(""));
        let mut ids = [Index::from_raw_parts(0, 0); TEXTURE_SLOTS];
        for (slot, filename) in material.texture_filenames.iter().enumerate() {
            ids[slot] = if filename.is_empty() {
                self.fallback(if slot == NORMAL_TEXTURE { FLAT_NORMAL } else { WHITE })
            } else {
                self.load(&directory.join(filename))?
            };
        }
        Ok(ids)
    }

    /// Drops a file texture; the next [`TextureTable::load`] of `path` decodes it again.
    pub fn release(&mut self, path: &Path) -> Option<TextureData> {
        let id = self.by_path.remove(path)?;
        info!("released texture {}", path.display());
        self.textures.remove(id)
    }
}
