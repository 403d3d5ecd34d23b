//! Stacking single reads into one batch spectrum.
//!
//! This is the only place where wavelength axes are compared with a
//! tolerance; decoders always report the axis exactly as stored.

use crate::data::model::{Metadata, Spectrum, SpectrumMeta};
use crate::error::{Error, Result};

/// How far two wavelength values may drift apart and still count as equal.
/// Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    /// `|a - b| <= t`
    Absolute(f64),
    /// `|a - b| <= t * |reference|`
    Relative(f64),
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::Absolute(0.0)
    }
}

impl Tolerance {
    fn allows(&self, reference: f64, value: f64) -> bool {
        let diff = (value - reference).abs();
        match *self {
            Tolerance::Absolute(t) => diff <= t,
            Tolerance::Relative(t) => diff <= t * reference.abs(),
        }
    }
}

/// Stack `spectra` into one `N x W` spectrum.
///
/// The first spectrum's axis is the reference and is returned unchanged.
/// Every other axis must have the same length and lie within `tolerance`
/// of it point by point. Metadata is never merged: the result carries one
/// mapping per row.
pub fn aggregate(spectra: Vec<Spectrum>, tolerance: Tolerance) -> Result<Spectrum> {
    let reference = match spectra.first() {
        Some(first) => first.wavelength().to_vec(),
        None => return Err(Error::EmptyAggregationInput),
    };

    for (position, spectrum) in spectra.iter().enumerate().skip(1) {
        check_axis(&reference, spectrum.wavelength(), tolerance, position)?;
    }

    let mut rows = Vec::new();
    let mut metas = Vec::new();
    for spectrum in spectra {
        let (amplitudes, _, meta) = spectrum.into_parts();
        let n = amplitudes.len();
        match meta {
            SpectrumMeta::PerRow(per_row) => metas.extend(per_row),
            SpectrumMeta::Shared(shared) => metas.extend(std::iter::repeat(shared).take(n)),
        }
        rows.extend(amplitudes);
    }

    Ok(Spectrum::new(rows, reference, SpectrumMeta::PerRow(metas))?)
}

fn check_axis(reference: &[f64], axis: &[f64], tolerance: Tolerance, spectrum: usize) -> Result<()> {
    if axis.len() != reference.len() {
        return Err(Error::IncompatibleWavelengthAxes {
            index: axis.len().min(reference.len()),
            spectrum,
            max_deviation: f64::INFINITY,
        });
    }
    let mut max_deviation = 0.0_f64;
    let mut first_bad = None;
    for (index, (&r, &v)) in reference.iter().zip(axis).enumerate() {
        if !tolerance.allows(r, v) && first_bad.is_none() {
            first_bad = Some(index);
        }
        let diff = (v - r).abs();
        // `f64::max` would swallow a NaN difference.
        max_deviation = if diff.is_nan() { diff } else { max_deviation.max(diff) };
    }
    match first_bad {
        None => Ok(()),
        Some(index) => Err(Error::IncompatibleWavelengthAxes {
            index,
            spectrum,
            max_deviation,
        }),
    }
}

/// Metadata of each row of `spectrum`, one entry per row.
pub fn row_metadata(spectrum: &Spectrum) -> Vec<Metadata> {
    (0..spectrum.len())
        .map(|i| spectrum.meta().for_row(i).cloned().unwrap_or_default())
        .collect()
}
