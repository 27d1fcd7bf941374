use std::{io, path::PathBuf};

use thiserror::Error;

/// Everything that can abort loading a skinned asset.
///
/// There is no partial recovery: a failed import never writes a cache file,
/// and re-running the import is the only way forward.
#[derive(Error, Debug)]
pub enum AssetError {
    /// The source file (or a file it references) does not exist
    #[error("asset not found: {}", path.display())]
    AssetNotFound { path: PathBuf },

    /// The source scene references something that isn't there
    #[error("malformed asset: {0}")]
    MalformedAsset(String),

    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cache encoding error: {0}")]
    Cache(#[from] bincode::Error),

    #[error("texture decode error: {0}")]
    Texture(#[from] image::ImageError),

    #[error("invalid import settings: {0}")]
    Config(#[from] serde_json::Error),
}

impl AssetError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        AssetError::MalformedAsset(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AssetError>;
