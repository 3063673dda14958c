//! Persistence of the cleaned sample index.
//!
//! The record is a single JSON file inside the cache directory. Its presence
//! is enough for it to be used; the stored [`CacheProvenance`] is only
//! compared when validation is requested.

use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::model::SampleDescriptor;
use crate::config::{DatasetConfig, WavelengthRange};
use crate::error::{Result, SpectreError};

/// Parameters a cleaned index was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheProvenance {
    pub root_dir: PathBuf,
    pub int_time: u32,
    pub lamb_range: WavelengthRange,
    pub clean_threshold: f64,
    pub augment: bool,
}

impl CacheProvenance {
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self {
            root_dir: config.root_dir.clone(),
            int_time: config.int_time,
            lamb_range: config.lamb_range,
            clean_threshold: config.clean_threshold,
            augment: config.augment,
        }
    }
}

/// On-disk form of the cleaned index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub provenance: CacheProvenance,
    pub samples: Vec<SampleDescriptor>,
}

/// Read the record at `path`, or `None` if there is no file.
pub fn load(path: &Path) -> Result<Option<CacheRecord>> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SpectreError::io(path, e)),
    };
    let record = serde_json::from_reader(BufReader::new(file)).map_err(|source| {
        SpectreError::CacheFormat {
            path: path.to_path_buf(),
            source,
        }
    })?;
    Ok(Some(record))
}

/// Create the cache directory; an existing directory is fine.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(SpectreError::CacheDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

/// Write `record` to `path` in one step.
///
/// The JSON goes to a sibling `.tmp` file which is renamed over `path` once
/// fully written, so readers never observe a partial record.
pub fn store(path: &Path, record: &CacheRecord) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        ensure_dir(dir)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = fs::File::create(&tmp).map_err(|e| SpectreError::io(&tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, record).map_err(|source| SpectreError::CacheFormat {
        path: tmp.clone(),
        source,
    })?;
    writer.flush().map_err(|e| SpectreError::io(&tmp, e))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|e| SpectreError::io(path, e))
}
