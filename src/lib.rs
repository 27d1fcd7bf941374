//! Skinned mesh assets: import from glTF, bind-pose skeletons, sampled
//! animation clips, pose evaluation and a binary cache side-file.
//!
//! ```no_run
//! use std::path::Path;
//! use glam::{Mat4, Vec4};
//! use skinned_mesh::{config::ImportSettings, pose::Playback, SkinnedModel};
//!
//! # fn main() -> skinned_mesh::Result<()> {
//! let model = SkinnedModel::load(Path::new("assets/hero.gltf"), &ImportSettings::default())?;
//! let mut playback = Playback::default();
//! let clip = &model.animation_clips[0];
//! if let Some(frame) = playback.advance(1.0 / 60.0, clip) {
//!     let mut keyframe = clip.sequence[frame].clone();
//!     model.update_animation(&mut keyframe)?;
//!     let draws = model.prepare_draws(Mat4::IDENTITY, Vec4::ONE, Some(&keyframe))?;
//!     # let _ = draws;
//! }
//! # Ok(())
//! # }
//! ```

pub mod animation;
pub mod cache;
pub mod config;
pub mod error;
pub mod import;
pub mod influence;
pub mod material;
pub mod mesh;
pub mod model;
pub mod pose;
pub mod scene;
pub mod skeleton;
pub mod source;
pub mod tangents;
pub mod texture;

pub use error::{AssetError, Result};
pub use model::SkinnedModel;
