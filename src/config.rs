use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{error::AssetError, influence::EvictionPolicy, Result};

/// Options controlling how an interchange file is turned into a skinned model.
///
/// Every field has a default, so a settings file only needs to name the
/// options it changes:
///
/// ```json
/// { "sampling_rate": 24.0, "eviction": "strict_improve_only" }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ImportSettings {
    /// Fan-triangulate polygons with more than three corners
    pub triangulate: bool,
    /// Keyframes per second; 0 samples at the source's native frame rate
    pub sampling_rate: f32,
    /// Frame rate used when the source format doesn't carry one
    pub native_frame_rate: f32,
    pub eviction: EvictionPolicy,
    /// Scale each vertex's weights so they sum to 1
    pub renormalize_weights: bool,
    /// Bind skinned vertices without any influence fully to bone 0 instead
    /// of leaving all four weights at 0
    pub rigid_unweighted_vertices: bool,
    pub generate_tangents: bool,
    /// Read and write the binary side-file next to the source
    pub use_cache: bool,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            triangulate: false,
            sampling_rate: 0.0,
            native_frame_rate: 30.0,
            eviction: EvictionPolicy::AlwaysEvictMin,
            renormalize_weights: false,
            rigid_unweighted_vertices: false,
            generate_tangents: true,
            use_cache: true,
        }
    }
}

impl ImportSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AssetError::AssetNotFound { path: path.to_path_buf() });
        }
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// The rate clips are sampled at, given the source's native rate.
    pub fn effective_sampling_rate(&self, native_rate: f32) -> f32 {
        if self.sampling_rate > 0.0 {
            self.sampling_rate
        } else {
            native_rate
        }
    }
}
