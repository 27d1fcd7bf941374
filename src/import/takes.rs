use std::collections::BTreeMap;

use glam::{Quat, Vec3};
use gltf::animation::{Interpolation as GltfInterpolation, Property};
use log::warn;

use super::{
    accessors::{read3f32, read4f32, readf32},
    node_unique_id,
};
use crate::{
    error::AssetError,
    source::{Channel, Interpolation, NodeTrack, Take},
    Result,
};

fn interpolation(sampler: &gltf::animation::Sampler) -> Interpolation {
    match sampler.interpolation() {
        GltfInterpolation::Linear => Interpolation::Linear,
        GltfInterpolation::Step => Interpolation::Step,
        GltfInterpolation::CubicSpline => Interpolation::CubicSpline,
    }
}

fn check_keys<T>(channel: &Channel<T>, what: &str) -> Result<()> {
    let expected = match channel.interpolation {
        Interpolation::CubicSpline => channel.times.len() * 3,
        _ => channel.times.len(),
    };
    if channel.values.len() != expected {
        return Err(AssetError::malformed(format!(
            "{} has {} values for {} keys",
            what,
            channel.values.len(),
            channel.times.len()
        )));
    }
    Ok(())
}

/// One take per animation, spanning the earliest to the latest key of any
/// of its samplers.
pub(super) fn read_take(animation: &gltf::Animation, buffers: &[gltf::buffer::Data]) -> Result<Take> {
    let name = animation
        .name()
        .map_or_else(|| format!("animation{}", animation.index()), str::to_string);
    let mut tracks: BTreeMap<u64, NodeTrack> = BTreeMap::new();
    let mut start = f32::MAX;
    let mut stop = f32::MIN;

    for (channel_index, channel) in animation.channels().enumerate() {
        let target = channel.target();
        let node = node_unique_id(target.node().index());
        let sampler = channel.sampler();
        let times = readf32(&sampler.input(), buffers)?;
        let what = format!("animation '{}' channel {}", name, channel_index);

        let track = tracks.entry(node).or_insert_with(|| NodeTrack { node, ..Default::default() });
        match target.property() {
            Property::Translation => {
                let values = read3f32(&sampler.output(), buffers)?.into_iter().map(Vec3::from).collect();
                let channel = Channel { times: times.clone(), values, interpolation: interpolation(&sampler) };
                check_keys(&channel, &what)?;
                track.translation = Some(channel);
            }
            Property::Scale => {
                let values = read3f32(&sampler.output(), buffers)?.into_iter().map(Vec3::from).collect();
                let channel = Channel { times: times.clone(), values, interpolation: interpolation(&sampler) };
                check_keys(&channel, &what)?;
                track.scale = Some(channel);
            }
            Property::Rotation => {
                let values = read4f32(&sampler.output(), buffers)?.into_iter().map(Quat::from_array).collect();
                let channel = Channel { times: times.clone(), values, interpolation: interpolation(&sampler) };
                check_keys(&channel, &what)?;
                track.rotation = Some(channel);
            }
            Property::MorphTargetWeights => {
                warn!("{}: morph target weights are not imported", what);
                continue;
            }
        }

        for &time in &times {
            start = start.min(time);
            stop = stop.max(time);
        }
    }

    let (start, stop) = if start <= stop { (start as f64, stop as f64) } else { (0.0, 0.0) };
    Ok(Take {
        name,
        start,
        stop,
        tracks: tracks.into_values().collect(),
    })
}
