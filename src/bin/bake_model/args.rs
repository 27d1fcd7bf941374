use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, PartialEq)]
#[command(name = "bake_model")]
#[command(about = "Import a skinned glTF model and write its binary cache", long_about = None)]
pub struct BakeArgs {
    /// Source model (.gltf or .glb)
    pub input: PathBuf,

    /// JSON import settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keyframes per second; 0 samples at the source's native rate
    #[arg(short, long, value_parser = parse_sampling_rate)]
    pub sampling_rate: Option<f32>,

    /// Extra animation file sampled onto the model (repeatable)
    #[arg(short, long)]
    pub append: Vec<PathBuf>,

    /// Re-import even when a current cache exists
    #[arg(short, long)]
    pub force: bool,
}

fn parse_sampling_rate(raw: &str) -> Result<f32, String> {
    let rate: f32 = raw.parse().map_err(|_| format!("invalid sampling rate '{}'", raw))?;
    if !rate.is_finite() || rate < 0.0 {
        return Err(format!("invalid sampling rate '{}'", raw));
    }
    Ok(rate)
}
