//! Binary side-file holding an imported model.
//!
//! ```text
//! [0..4]  magic b"SKMC"
//! [4..8]  format version, u32 little endian
//! [8..]   bincode payload
//! ```
//!
//! Files with another magic or version, or whose payload no longer decodes,
//! are reported as stale so the caller re-imports and overwrites them.

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::Result;

pub const MAGIC: [u8; 4] = *b"SKMC";

/// Bumped whenever a cached type changes shape.
pub const VERSION: u32 = 1;

pub const HEADER_SIZE: usize = 8;

pub const EXTENSION: &str = "bincode";

/// Where the cache for `source` lives: same directory, extension swapped.
pub fn cache_path_for(source: &Path) -> PathBuf {
    source.with_extension(EXTENSION)
}

fn header() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&MAGIC);
    header[4..].copy_from_slice(&VERSION.to_le_bytes());
    header
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = header().to_vec();
    bincode::serialize_into(&mut bytes, value)?;
    Ok(bytes)
}

/// `None` when `bytes` aren't a current cache.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    if bytes.len() < HEADER_SIZE {
        warn!("cache is truncated ({} bytes)", bytes.len());
        return None;
    }
    if bytes[..4] != MAGIC {
        warn!("cache has unknown magic {:?}", &bytes[..4]);
        return None;
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[4..HEADER_SIZE]);
    let version = u32::from_le_bytes(version);
    if version != VERSION {
        warn!("cache has format version {}, expected {}", version, VERSION);
        return None;
    }
    match bincode::deserialize(&bytes[HEADER_SIZE..]) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("cache payload does not decode: {}", e);
            None
        }
    }
}

/// Reads the cache at `path`. `Ok(None)` if there is no cache or it is stale.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let value = decode(&bytes);
    if value.is_some() {
        info!("loaded cache {}", path.display());
    } else {
        warn!("ignoring stale cache {}", path.display());
    }
    Ok(value)
}

pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&header())?;
    bincode::serialize_into(&mut writer, value)?;
    writer.flush()?;
    info!("wrote cache {}", path.display());
    Ok(())
}
