use std::path::PathBuf;

use clap::Parser;
use log::info;
use skinned_mesh::{config::ImportSettings, SkinnedModel};

mod args;
use args::BakeArgs;

fn summarize(model: &SkinnedModel) {
    for mesh in &model.meshes {
        info!(
            "mesh '{}': {} vertices, {} subsets, {} bones",
            mesh.name,
            mesh.vertices.len(),
            mesh.subsets.len(),
            mesh.bind_pose.bones.len()
        );
    }
    for clip in &model.animation_clips {
        info!(
            "clip '{}': {} keyframes at {} Hz ({:.2}s)",
            clip.name,
            clip.sequence.len(),
            clip.sampling_rate,
            clip.duration()
        );
    }
    info!(
        "{} nodes, {} meshes, {} materials, {} clips",
        model.scene.nodes.len(),
        model.meshes.len(),
        model.materials.len(),
        model.animation_clips.len()
    );
}

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let bake_args = BakeArgs::parse();

    let mut settings = match &bake_args.config {
        Some(path) => ImportSettings::from_json_file(path)?,
        None => ImportSettings::default(),
    };
    if let Some(rate) = bake_args.sampling_rate {
        settings.sampling_rate = rate;
    }
    if bake_args.force {
        // skip the existing cache but still write a fresh one
        settings.use_cache = false;
    }

    let mut model = SkinnedModel::load(&bake_args.input, &settings)?;
    for animation in &bake_args.append {
        model.append_animations(animation, settings.sampling_rate, &settings)?;
    }
    let cache_path: PathBuf = model.save_cache(&bake_args.input)?;

    summarize(&model);
    info!("baked {} -> {}", bake_args.input.display(), cache_path.display());
    Ok(())
}
