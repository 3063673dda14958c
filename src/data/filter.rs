use std::path::Path;

use ndarray::Array1;

use super::model::{multiply, SampleDescriptor};
use super::normalize::Normalizer;
use crate::config::ReadErrorPolicy;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Signal strength of a candidate sample
// ---------------------------------------------------------------------------

/// Normalized spectrum of a sample: the spectrum of its folder, or the
/// element-wise product of both folders' normalized spectra.
///
/// Only spectra are read; frames are never touched here.
pub fn combined_spectrum(
    normalizer: &Normalizer,
    descriptor: &SampleDescriptor,
    mut read_spectrum: impl FnMut(&Path) -> Result<Array1<f64>>,
) -> Result<Array1<f64>> {
    let first = normalizer.spectrum(&read_spectrum(descriptor.primary())?)?;
    match descriptor.partner() {
        None => Ok(first),
        Some(partner) => {
            let second = normalizer.spectrum(&read_spectrum(partner)?)?;
            multiply(first, &second, "spectrum product")
        }
    }
}

/// Arithmetic mean of the spectrum; `NaN` when it is empty.
pub fn mean_signal(spectrum: &Array1<f64>) -> f64 {
    spectrum.mean().unwrap_or(f64::NAN)
}

/// A sample survives unless its mean signal is below the threshold.
/// A `NaN` mean carries no usable signal and fails.
pub fn passes_threshold(mean: f64, threshold: f64) -> bool {
    mean >= threshold
}

// ---------------------------------------------------------------------------
// Cleaning pass
// ---------------------------------------------------------------------------

/// Return the candidates whose combined spectrum passes `threshold`, in order.
///
/// The result is built by inclusion; `candidates` is left untouched.
/// Under [`ReadErrorPolicy::Skip`] a sample whose spectrum cannot be
/// computed is dropped with a warning instead of aborting the pass.
pub fn clean_index(
    candidates: &[SampleDescriptor],
    threshold: f64,
    policy: ReadErrorPolicy,
    mut spectrum_of: impl FnMut(&SampleDescriptor) -> Result<Array1<f64>>,
) -> Result<Vec<SampleDescriptor>> {
    let mut kept = Vec::with_capacity(candidates.len());
    for descriptor in candidates {
        let spectrum = match spectrum_of(descriptor) {
            Ok(s) => s,
            Err(e) if policy == ReadErrorPolicy::Skip => {
                log::warn!("Skipping sample {descriptor}: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };
        let mean = mean_signal(&spectrum);
        if passes_threshold(mean, threshold) {
            kept.push(descriptor.clone());
        } else {
            log::debug!("discarding {descriptor}: mean signal {mean:.4} < {threshold}");
        }
    }
    Ok(kept)
}
