//! Dark/white reference normalization.
//!
//! Every raw array is mapped to `clip((raw - dark) / (white - dark), EPSILON, 1)`.
//! `white - dark` must be non-zero element-wise. A zero denominator yields
//! `inf` (clipped to 1 or `EPSILON`) or `NaN` (propagated); there is no guard.

use ndarray::{Array, Array1, Array2, Dimension, Zip};

use super::model::Measurement;
use crate::error::{Result, SpectreError};

/// Floor applied to raw reads and to normalized values.
pub const EPSILON: f64 = 1e-8;

/// Normalize `raw` against the `dark` and `white` references of the same shape.
pub fn normalize_array<D: Dimension>(
    raw: &Array<f64, D>,
    dark: &Array<f64, D>,
    white: &Array<f64, D>,
) -> Result<Array<f64, D>> {
    for (context, reference) in [("dark reference", dark), ("white reference", white)] {
        if reference.shape() != raw.shape() {
            return Err(SpectreError::ShapeMismatch {
                context,
                expected: reference.shape().to_vec(),
                found: raw.shape().to_vec(),
            });
        }
    }
    Ok(Zip::from(raw)
        .and(dark)
        .and(white)
        .map_collect(|&r, &d, &w| clip((r - d) / (w - d))))
}

/// Clamp into `[EPSILON, 1]`; `NaN` passes through.
fn clip(v: f64) -> f64 {
    v.clamp(EPSILON, 1.0)
}

// ---------------------------------------------------------------------------
// Normalizer – holds the references for the dataset's lifetime
// ---------------------------------------------------------------------------

/// The `Dark` and `White` reference measurements, read once at construction.
#[derive(Debug, Clone)]
pub struct Normalizer {
    dark: Measurement,
    white: Measurement,
}

impl Normalizer {
    pub fn new(dark: Measurement, white: Measurement) -> Self {
        Self { dark, white }
    }

    pub fn dark(&self) -> &Measurement {
        &self.dark
    }

    pub fn white(&self) -> &Measurement {
        &self.white
    }

    pub fn frame(&self, raw: &Array2<f64>) -> Result<Array2<f64>> {
        normalize_array(raw, &self.dark.frame, &self.white.frame)
    }

    pub fn spectrum(&self, raw: &Array1<f64>) -> Result<Array1<f64>> {
        normalize_array(raw, &self.dark.spectrum, &self.white.spectrum)
    }

    pub fn measurement(&self, raw: &Measurement) -> Result<Measurement> {
        Ok(Measurement::new(self.frame(&raw.frame)?, self.spectrum(&raw.spectrum)?))
    }
}
