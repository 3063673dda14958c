use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectreError};

// ---------------------------------------------------------------------------
// SampleDescriptor – one entry of the dataset index
// ---------------------------------------------------------------------------

/// A sample in the dataset index: one measurement folder, or two folders
/// whose normalized measurements are multiplied together.
///
/// `Augmented(p, p)` is a valid self-combination and is not the same sample
/// as `Singular(p)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleDescriptor {
    Singular(PathBuf),
    Augmented(PathBuf, PathBuf),
}

impl SampleDescriptor {
    /// The folder in the first slot.
    pub fn primary(&self) -> &Path {
        match self {
            SampleDescriptor::Singular(p) | SampleDescriptor::Augmented(p, _) => p,
        }
    }

    /// The folder in the second slot, if any.
    pub fn partner(&self) -> Option<&Path> {
        match self {
            SampleDescriptor::Singular(_) => None,
            SampleDescriptor::Augmented(_, p) => Some(p),
        }
    }

    pub fn is_augmented(&self) -> bool {
        matches!(self, SampleDescriptor::Augmented(..))
    }
}

impl fmt::Display for SampleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleDescriptor::Singular(p) => write!(f, "{}", p.display()),
            SampleDescriptor::Augmented(a, b) => write!(f, "{} x {}", a.display(), b.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Measurement – a frame paired with its ground-truth spectrum
// ---------------------------------------------------------------------------

/// Camera frame and spectrum of one capture (raw or normalized).
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// 2-D sensor readings.
    pub frame: Array2<f64>,
    /// One intensity per integer wavelength.
    pub spectrum: Array1<f64>,
}

impl Measurement {
    pub fn new(frame: Array2<f64>, spectrum: Array1<f64>) -> Self {
        Self { frame, spectrum }
    }

    /// Element-wise product of two measurements, used for augmented samples.
    pub fn combine(self, other: &Measurement) -> Result<Measurement> {
        Ok(Measurement {
            frame: multiply(self.frame, &other.frame, "frame product")?,
            spectrum: multiply(self.spectrum, &other.spectrum, "spectrum product")?,
        })
    }
}

/// Multiply `a` by `b` in place after checking the shapes agree.
pub(crate) fn multiply<D: ndarray::Dimension>(
    mut a: ndarray::Array<f64, D>,
    b: &ndarray::Array<f64, D>,
    context: &'static str,
) -> Result<ndarray::Array<f64, D>> {
    if a.shape() != b.shape() {
        return Err(SpectreError::ShapeMismatch {
            context,
            expected: a.shape().to_vec(),
            found: b.shape().to_vec(),
        });
    }
    a *= b;
    Ok(a)
}
