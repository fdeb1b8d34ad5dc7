use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::ai::collections::CacheTag;
use crate::ai::error::PersistenceError;
use crate::ai::filter::FilterSpec;

pub const MANIFEST_VERSION: u32 = 1;

/// Which cached collections existed, so a loaded game can rebuild the same keys.
///
/// Members are not saved; restoring rescans the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: Vec<ManifestEntry>,
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub key: String,
    pub tag: Option<CacheTag>,
    /// Specs of the whole filter chain; `None` when a filter in it was a custom closure.
    pub filters: Option<Vec<FilterSpec>>,
    pub parent_key: Option<String>,
}

impl ManifestEntry {
    pub fn is_restorable(&self) -> bool {
        self.filters.as_ref().is_some_and(|filters| !filters.is_empty())
    }
}

pub fn save_manifest(path: impl AsRef<Path>, manifest: &CacheManifest) -> Result<(), PersistenceError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    bincode::serialize_into(&mut encoder, manifest)?;
    encoder.finish()?;
    Ok(())
}

pub fn load_manifest(path: impl AsRef<Path>) -> Result<CacheManifest, PersistenceError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut decoder = ZlibDecoder::new(reader);
    let manifest: CacheManifest = bincode::deserialize_from(&mut decoder)?;
    if manifest.version != MANIFEST_VERSION {
        return Err(PersistenceError::Version {
            found: manifest.version,
            expected: MANIFEST_VERSION,
        });
    }
    Ok(manifest)
}
