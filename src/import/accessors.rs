use gltf::accessor::{sparse::IndexType, DataType, Dimensions};

use crate::{error::AssetError, Result};

fn slice<'a>(buffer: &'a [u8], start: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    buffer.get(start..start + len).ok_or_else(|| {
        AssetError::malformed(format!(
            "{} reads bytes {}..{} of a {}-byte buffer",
            what,
            start,
            start + len,
            buffer.len()
        ))
    })
}

fn buffer<'a>(buffers: &'a [gltf::buffer::Data], index: usize) -> Result<&'a [u8]> {
    buffers
        .get(index)
        .map(|data| data.0.as_slice())
        .ok_or_else(|| AssetError::malformed(format!("buffer {} is not loaded", index)))
}

/// Tightly packed copy of an accessor's elements, with sparse substitutions
/// applied.
fn read_accessor_data(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<u8>> {
    let count = accessor.count();
    let elem_size = accessor.size();
    let what = format!("accessor {}", accessor.index());

    let mut data = vec![0u8; count * elem_size];

    if let Some(view) = accessor.view() {
        let buffer = buffer(buffers, view.buffer().index())?;
        let stride = view.stride().unwrap_or(elem_size);
        let base = view.offset() + accessor.offset();

        for i in 0..count {
            let dst = i * elem_size;
            data[dst..dst + elem_size].copy_from_slice(slice(buffer, base + i * stride, elem_size, &what)?);
        }
    } else if accessor.sparse().is_none() {
        return Err(AssetError::malformed(format!("{} has no buffer view and is not sparse", what)));
    }

    if let Some(sparse) = accessor.sparse() {
        let indices = sparse.indices();
        let indices_buffer = buffer(buffers, indices.view().buffer().index())?;
        let indices_offset = indices.view().offset() + indices.offset();
        let index_size = match indices.index_type() {
            IndexType::U8 => 1,
            IndexType::U16 => 2,
            IndexType::U32 => 4,
        };
        let indices_stride = indices.view().stride().unwrap_or(index_size);

        let values = sparse.values();
        let values_buffer = buffer(buffers, values.view().buffer().index())?;
        let values_offset = values.view().offset() + values.offset();
        let values_stride = values.view().stride().unwrap_or(elem_size);

        for i in 0..sparse.count() {
            let raw = slice(indices_buffer, indices_offset + i * indices_stride, index_size, &what)?;
            let index = match raw {
                [b] => *b as usize,
                [a, b] => u16::from_le_bytes([*a, *b]) as usize,
                [a, b, c, d] => u32::from_le_bytes([*a, *b, *c, *d]) as usize,
                _ => unreachable!(),
            };
            if index >= count {
                return Err(AssetError::malformed(format!(
                    "{} sparse index {} out of {} elements",
                    what, index, count
                )));
            }

            let dst = index * elem_size;
            data[dst..dst + elem_size]
                .copy_from_slice(slice(values_buffer, values_offset + i * values_stride, elem_size, &what)?);
        }
    }

    Ok(data)
}

fn check_dimensions(accessor: &gltf::Accessor, expected: Dimensions) -> Result<()> {
    if accessor.dimensions() != expected {
        return Err(AssetError::malformed(format!(
            "accessor {} is {:?}, expected {:?}",
            accessor.index(),
            accessor.dimensions(),
            expected
        )));
    }
    Ok(())
}

/// Reads every component as f32, undoing normalization of integer types.
fn read_components(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<f32>> {
    let data = read_accessor_data(accessor, buffers)?;
    let normalized = accessor.normalized();
    let values = match accessor.data_type() {
        DataType::F32 => data
            .chunks_exact(4)
            .map(|c| bytemuck::cast::<[u8; 4], f32>([c[0], c[1], c[2], c[3]]))
            .collect(),
        DataType::U8 => data
            .iter()
            .map(|&v| if normalized { v as f32 / 255.0 } else { v as f32 })
            .collect(),
        DataType::U16 => data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .map(|v| if normalized { v as f32 / 65535.0 } else { v as f32 })
            .collect(),
        DataType::I8 => data
            .iter()
            .map(|&v| v as i8)
            .map(|v| if normalized { (v as f32 / 127.0).max(-1.0) } else { v as f32 })
            .collect(),
        DataType::I16 => data
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .map(|v| if normalized { (v as f32 / 32767.0).max(-1.0) } else { v as f32 })
            .collect(),
        DataType::U32 => data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
            .collect(),
    };
    Ok(values)
}

fn read_fixed<const N: usize>(
    accessor: &gltf::Accessor,
    buffers: &[gltf::buffer::Data],
    dimensions: Dimensions,
) -> Result<Vec<[f32; N]>> {
    check_dimensions(accessor, dimensions)?;
    let components = read_components(accessor, buffers)?;
    Ok(components
        .chunks_exact(N)
        .map(|chunk| {
            let mut out = [0.0; N];
            out.copy_from_slice(chunk);
            out
        })
        .collect())
}

pub fn readf32(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<f32>> {
    check_dimensions(accessor, Dimensions::Scalar)?;
    read_components(accessor, buffers)
}

pub fn read2f32(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<[f32; 2]>> {
    read_fixed(accessor, buffers, Dimensions::Vec2)
}

pub fn read3f32(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<[f32; 3]>> {
    read_fixed(accessor, buffers, Dimensions::Vec3)
}

pub fn read4f32(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<[f32; 4]>> {
    read_fixed(accessor, buffers, Dimensions::Vec4)
}

/// Column-major 4x4 matrices.
pub fn read_mat4(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<[f32; 16]>> {
    read_fixed(accessor, buffers, Dimensions::Mat4)
}

/// Integer joint indices of a `JOINTS_n` accessor.
pub fn read4u16(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<[u16; 4]>> {
    check_dimensions(accessor, Dimensions::Vec4)?;
    let data = read_accessor_data(accessor, buffers)?;
    match accessor.data_type() {
        DataType::U8 => Ok(data.chunks_exact(4).map(|c| [c[0] as u16, c[1] as u16, c[2] as u16, c[3] as u16]).collect()),
        DataType::U16 => Ok(data
            .chunks_exact(8)
            .map(|c| {
                [
                    u16::from_le_bytes([c[0], c[1]]),
                    u16::from_le_bytes([c[2], c[3]]),
                    u16::from_le_bytes([c[4], c[5]]),
                    u16::from_le_bytes([c[6], c[7]]),
                ]
            })
            .collect()),
        other => Err(AssetError::malformed(format!(
            "joints accessor {} has unsupported type {:?}",
            accessor.index(),
            other
        ))),
    }
}

pub fn read_index_buffer(accessor: &gltf::Accessor, buffers: &[gltf::buffer::Data]) -> Result<Vec<u32>> {
    check_dimensions(accessor, Dimensions::Scalar)?;
    let data = read_accessor_data(accessor, buffers)?;
    match accessor.data_type() {
        DataType::U8 => Ok(data.iter().map(|&v| v as u32).collect()),
        DataType::U16 => Ok(data.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]]) as u32).collect()),
        DataType::U32 => Ok(data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()),
        other => Err(AssetError::malformed(format!(
            "index accessor {} has unsupported type {:?}",
            accessor.index(),
            other
        ))),
    }
}
