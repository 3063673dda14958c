//! Loader for the SPECTRE hyperspectral dataset.
//!
//! A dataset root holds two calibration folders (`Dark`, `White`) and one
//! folder per measurement, each with camera frames and a ground-truth
//! spectrum. [`SpectreDataset`] normalizes every measurement against the
//! references, optionally multiplies pairs of measurements into synthetic
//! samples, drops samples with too little signal and caches the surviving
//! index so the cleaning pass runs once.
//!
//! ```no_run
//! use spectre_data::{DatasetConfig, SpectreDataset};
//!
//! # fn main() -> spectre_data::Result<()> {
//! let mut dataset = SpectreDataset::open(DatasetConfig::new("path/to/data"))?;
//! println!("{} samples", dataset.len()?);
//! for sample in dataset {
//!     let sample = sample?;
//!     println!("frame {:?}, spectrum {}", sample.frame.dim(), sample.spectrum.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data;
pub mod dataset;
pub mod error;

pub use config::{DatasetConfig, ReadErrorPolicy, WavelengthRange};
pub use data::loader::{FsMeasurementReader, MeasurementReader};
pub use data::model::{Measurement, SampleDescriptor};
pub use data::normalize::{normalize_array, Normalizer, EPSILON};
pub use dataset::SpectreDataset;
pub use error::{Result, SpectreError};
