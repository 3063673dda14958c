//! Configuration parameters for opening a dataset

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectreError};

/// Cache directory used when [`DatasetConfig::cache_dir`] is `None`.
pub const DEFAULT_CACHE_DIR: &str = ".spectre_cache";

/// File name of the cache record inside the cache directory.
pub const CACHE_FILE_NAME: &str = "dataset_cache.json";

/// Integration times the camera frames are recorded with.
pub const SUPPORTED_INT_TIMES: [u32; 4] = [1400, 1200, 1000, 800];

/// Wavelength window in nanometres, `start` inclusive and `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WavelengthRange {
    pub start: u32,
    pub end: u32,
}

impl WavelengthRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Number of integer wavelengths in the window.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether a (fractional) wavelength lies in `[start, end - 1]`.
    pub fn contains(&self, wavelength: f64) -> bool {
        !self.is_empty()
            && wavelength >= self.start as f64
            && wavelength <= (self.end - 1) as f64
    }
}

impl Default for WavelengthRange {
    fn default() -> Self {
        Self::new(450, 690)
    }
}

/// What cleaning does with a sample whose files cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadErrorPolicy {
    /// Abort the whole pass with the read error.
    #[default]
    Abort,
    /// Log a warning and leave the sample out of the index.
    Skip,
}

/// Dataset configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Root directory holding `Dark`, `White` and the measurement folders
    pub root_dir: PathBuf,

    /// Integration time of the frames (default: 1400)
    /// 1200, 1000 and 800 are also recorded
    pub int_time: u32,

    /// Shuffle the sample order before the first item is produced (default: true)
    pub shuffle: bool,

    /// Seed for the shuffle; `None` draws from the thread RNG
    pub seed: Option<u64>,

    /// Cache location (default: `.spectre_cache` in the working directory)
    pub cache_dir: Option<PathBuf>,

    /// Minimum mean normalized signal for a sample to survive cleaning (default: 0.15)
    pub clean_threshold: f64,

    /// Wavelength window of the spectra (default: 450..690 nm)
    pub lamb_range: WavelengthRange,

    /// Use the cleaning cache at all (default: true)
    pub cache: bool,

    /// Reject a cache built with different parameters (default: false)
    pub validate_cache: bool,

    /// Synthesize pair samples by multiplication (default: true)
    pub augment: bool,

    /// Handling of unreadable samples during cleaning (default: Abort)
    pub on_read_error: ReadErrorPolicy,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::new(),
            int_time: 1400,
            shuffle: true,
            seed: None,
            cache_dir: None,
            clean_threshold: 0.15,
            lamb_range: WavelengthRange::default(),
            cache: true,
            validate_cache: false,
            augment: true,
            on_read_error: ReadErrorPolicy::Abort,
        }
    }
}

impl DatasetConfig {
    /// Default configuration rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SpectreError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            SpectreError::InvalidConfig(format!("{}: {e}", path.display()))
        })
    }

    /// Directory the cache record lives in.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
    }

    /// Full path of the cache record.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir().join(CACHE_FILE_NAME)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lamb_range.is_empty() {
            return Err(SpectreError::InvalidConfig(format!(
                "wavelength range {}..{} is empty",
                self.lamb_range.start, self.lamb_range.end
            )));
        }
        if !self.clean_threshold.is_finite() || !(0.0..=1.0).contains(&self.clean_threshold) {
            return Err(SpectreError::InvalidConfig(format!(
                "clean threshold {} is not a fraction in [0, 1]",
                self.clean_threshold
            )));
        }
        if !SUPPORTED_INT_TIMES.contains(&self.int_time) {
            log::warn!(
                "integration time {} is not one of the recorded times {:?}",
                self.int_time,
                SUPPORTED_INT_TIMES
            );
        }
        Ok(())
    }
}
