//! One-call entry points: locate a source, resolve its format, decode it.
//!
//! The plain functions use [`default_registry`]; the `*_with` variants take
//! the registry explicitly.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rayon::prelude::*;

use crate::aggregate::{aggregate, Tolerance};
use crate::data::model::{MetadataValue, Spectrum};
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::registry::{default_registry, FormatRegistry};
use crate::source::{is_url, SourceHandle};

/// Outcome of [`read_glob`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchRead {
    /// All files stacked into one spectrum by [`aggregate`].
    Combined(Spectrum),
    /// One spectrum per matched file, in sorted path order.
    PerFile(Vec<Spectrum>),
}

impl BatchRead {
    /// The spectra as a list: the combined one alone, or one per file.
    pub fn into_spectra(self) -> Vec<Spectrum> {
        match self {
            BatchRead::Combined(spectrum) => vec![spectrum],
            BatchRead::PerFile(spectra) => spectra,
        }
    }
}

/// Open `uri` and bind it to its format without decoding anything.
///
/// `format` names the format explicitly and skips probing.
pub fn get_reader(uri: &str, format: Option<&str>) -> Result<Reader> {
    get_reader_with(default_registry(), uri, format)
}

pub fn get_reader_with(registry: &FormatRegistry, uri: &str, format: Option<&str>) -> Result<Reader> {
    let mut source = SourceHandle::open(uri)?;
    let descriptor = registry.resolve(&mut source, format, None)?;
    Ok(descriptor.open(source))
}

/// Read a whole source into memory.
///
/// A `uri` containing wildcards reads every match and stacks them with an
/// exact-equality tolerance.
pub fn specread(uri: &str, format: Option<&str>) -> Result<Spectrum> {
    specread_with(default_registry(), uri, format)
}

pub fn specread_with(registry: &FormatRegistry, uri: &str, format: Option<&str>) -> Result<Spectrum> {
    if is_pattern(uri) {
        let spectra = read_matches(registry, uri, format)?;
        return aggregate(spectra, Tolerance::default());
    }
    get_reader_with(registry, uri, format)?.into_spectrum()
}

/// Read every file matching `pattern`.
///
/// With a tolerance the reads are aggregated into one spectrum, otherwise
/// they are returned one per file. Each spectrum's metadata gets a
/// `filename` entry unless its decoder already set one.
pub fn read_glob(pattern: &str, format: Option<&str>, tolerance: Option<Tolerance>) -> Result<BatchRead> {
    read_glob_with(default_registry(), pattern, format, tolerance)
}

pub fn read_glob_with(
    registry: &FormatRegistry,
    pattern: &str,
    format: Option<&str>,
    tolerance: Option<Tolerance>,
) -> Result<BatchRead> {
    let spectra = read_matches(registry, pattern, format)?;
    match tolerance {
        Some(tolerance) => Ok(BatchRead::Combined(aggregate(spectra, tolerance)?)),
        None => Ok(BatchRead::PerFile(spectra)),
    }
}

/// Whether `uri` would be expanded as a wildcard pattern. URLs never are,
/// since `?` starts their query string.
pub fn is_pattern(uri: &str) -> bool {
    !is_url(uri) && uri.contains(['*', '?', '['])
}

/// Sorted local paths matching `pattern`.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).map_err(|e| {
        Error::unavailable(pattern, io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::unavailable(pattern, e.into()))?;
        if path.is_file() {
            paths.push(path);
        }
    }
    if paths.is_empty() {
        return Err(Error::unavailable(
            pattern,
            io::Error::new(io::ErrorKind::NotFound, "no file matches the pattern"),
        ));
    }
    paths.sort();
    Ok(paths)
}

fn read_matches(registry: &FormatRegistry, pattern: &str, format: Option<&str>) -> Result<Vec<Spectrum>> {
    let paths = expand_pattern(pattern)?;
    info!("{pattern}: reading {} files", paths.len());
    paths
        .par_iter()
        .map(|path| read_file(registry, path, format))
        .collect()
}

fn read_file(registry: &FormatRegistry, path: &Path, format: Option<&str>) -> Result<Spectrum> {
    let mut source = SourceHandle::from_path(path);
    let descriptor = registry.resolve(&mut source, format, None)?;
    debug!("{}: {}", path.display(), descriptor.name());
    let mut spectrum = descriptor.open(source).into_spectrum()?;
    if let Some(name) = path.file_name() {
        spectrum.fill_meta("filename", MetadataValue::from(name.to_string_lossy().into_owned()));
    }
    Ok(spectrum)
}
