use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayD, Ix2};
use ndarray_npy::{ReadNpyError, ReadNpyExt, ReadableElement};

use super::model::Measurement;
use super::normalize::{EPSILON, Normalizer};
use crate::config::WavelengthRange;
use crate::error::{Result, SpectreError};

/// Folder names of the calibration captures under the dataset root.
pub const DARK_DIR: &str = "Dark";
pub const WHITE_DIR: &str = "White";

/// File inside each measurement folder holding the ground-truth spectrum.
pub const SPECTRUM_FILE: &str = "spectrum.csv";

/// Name of the frame file recorded at `int_time`.
pub fn frame_file_name(int_time: u32) -> String {
    format!("{int_time}_frame.npy")
}

// ---------------------------------------------------------------------------
// Reader seam
// ---------------------------------------------------------------------------

/// Reads raw frames and spectra of a measurement folder.
///
/// Implementations clip raw values at [`EPSILON`]. The dataset never parses
/// files itself, so tests and alternative storage layouts plug in here.
pub trait MeasurementReader {
    /// Raw 2-D frame recorded at `int_time`.
    fn read_frame(&self, folder: &Path, int_time: u32) -> Result<Array2<f64>>;

    /// Raw spectrum with one value per integer wavelength in `range`.
    fn read_spectrum(&self, folder: &Path, range: WavelengthRange) -> Result<Array1<f64>>;

    fn read_measurement(
        &self,
        folder: &Path,
        int_time: u32,
        range: WavelengthRange,
    ) -> Result<Measurement> {
        Ok(Measurement::new(
            self.read_frame(folder, int_time)?,
            self.read_spectrum(folder, range)?,
        ))
    }
}

impl<R: MeasurementReader + ?Sized> MeasurementReader for &R {
    fn read_frame(&self, folder: &Path, int_time: u32) -> Result<Array2<f64>> {
        (**self).read_frame(folder, int_time)
    }

    fn read_spectrum(&self, folder: &Path, range: WavelengthRange) -> Result<Array1<f64>> {
        (**self).read_spectrum(folder, range)
    }
}

/// Read the `Dark` and `White` captures under `root` into a [`Normalizer`].
///
/// Any failure here is a broken dataset and is returned unchanged.
pub fn read_references<R: MeasurementReader + ?Sized>(
    reader: &R,
    root: &Path,
    int_time: u32,
    range: WavelengthRange,
) -> Result<Normalizer> {
    let dark = reader.read_measurement(&root.join(DARK_DIR), int_time, range)?;
    let white = reader.read_measurement(&root.join(WHITE_DIR), int_time, range)?;
    log::debug!(
        "read references: frame {:?}, spectrum {} nm",
        dark.frame.dim(),
        dark.spectrum.len()
    );
    Ok(Normalizer::new(dark, white))
}

// ---------------------------------------------------------------------------
// Filesystem reader
// ---------------------------------------------------------------------------

/// Reader for the published folder layout:
///
/// ```text
/// <measurement>/
///   1400_frame.npy   # 2-D frame, one file per integration time
///   1200_frame.npy
///   ...
///   spectrum.csv     # columns `wavelengths`, `Intensity`
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMeasurementReader;

impl FsMeasurementReader {
    pub fn new() -> Self {
        FsMeasurementReader
    }
}

impl MeasurementReader for FsMeasurementReader {
    fn read_frame(&self, folder: &Path, int_time: u32) -> Result<Array2<f64>> {
        let path = folder.join(frame_file_name(int_time));
        let bytes = std::fs::read(&path).map_err(|e| SpectreError::io(&path, e))?;
        let frame = decode_npy_f64(&bytes).map_err(|details| SpectreError::Npy {
            path: path.clone(),
            details,
        })?;
        let shape = frame.shape().to_vec();
        let mut frame = frame.into_dimensionality::<Ix2>().map_err(|_| {
            SpectreError::invalid_format(&path, format!("expected 2-D frame, got shape {shape:?}"))
        })?;
        frame.mapv_inplace(|v| v.max(EPSILON));
        Ok(frame)
    }

    fn read_spectrum(&self, folder: &Path, range: WavelengthRange) -> Result<Array1<f64>> {
        let path = folder.join(SPECTRUM_FILE);
        load_spectrum_csv(&path, range)
    }
}

// -- NPY helpers --

/// Decode an `.npy` buffer of any common numeric dtype into `f64`.
fn decode_npy_f64(bytes: &[u8]) -> std::result::Result<ArrayD<f64>, String> {
    fn attempt<A: ReadableElement + Copy + Into<f64>>(
        bytes: &[u8],
    ) -> std::result::Result<ArrayD<f64>, ReadNpyError> {
        ArrayD::<A>::read_npy(bytes).map(|a| a.mapv(Into::into))
    }

    match ArrayD::<f64>::read_npy(bytes) {
        Err(ReadNpyError::WrongDescriptor(_)) => {}
        other => return other.map_err(|e| e.to_string()),
    }
    for decode in [attempt::<f32>, attempt::<u16>, attempt::<u8>, attempt::<i32>] {
        match decode(bytes) {
            Err(ReadNpyError::WrongDescriptor(_)) => continue,
            other => return other.map_err(|e| e.to_string()),
        }
    }
    // i64 is the default integer dtype of numpy; accept it with a lossy cast.
    ArrayD::<i64>::read_npy(bytes)
        .map(|a| a.mapv(|v| v as f64))
        .map_err(|e| e.to_string())
}

// -- CSV helpers --

/// Parse a spectrum CSV and resample it to integer wavelengths.
///
/// Rows with a wavelength in `[start, end - 1]` are kept, their wavelengths
/// rounded half-to-even and intensities averaged per integer nanometre.
/// Intensities are clipped at [`EPSILON`] before averaging.
fn load_spectrum_csv(path: &Path, range: WavelengthRange) -> Result<Array1<f64>> {
    let csv_err = |source| SpectreError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| SpectreError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
    };
    let wl_idx = column("wavelengths")?;
    let int_idx = column("Intensity")?;

    let mut bins: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.map_err(csv_err)?;
        let wavelength = parse_field(path, &record, wl_idx, row_no, "wavelengths")?;
        if !range.contains(wavelength) {
            continue;
        }
        let intensity = parse_field(path, &record, int_idx, row_no, "Intensity")?.max(EPSILON);
        let bin = bins
            .entry(wavelength.round_ties_even() as i64)
            .or_insert((0.0, 0));
        bin.0 += intensity;
        bin.1 += 1;
    }

    if bins.is_empty() {
        return Err(SpectreError::invalid_format(
            path,
            format!("no samples within {}..{} nm", range.start, range.end),
        ));
    }
    Ok(bins.values().map(|&(sum, n)| sum / n as f64).collect())
}

fn parse_field(
    path: &Path,
    record: &csv::StringRecord,
    idx: usize,
    row_no: usize,
    column: &str,
) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|_| {
        SpectreError::invalid_format(path, format!("row {row_no}, {column}: '{raw}' is not a number"))
    })
}
