//! Error types shared by the whole crate.

use std::io;

use thiserror::Error;

use crate::data::model::SpectrumError;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while locating, decoding or combining spectra.
#[derive(Error, Debug)]
pub enum Error {
    /// The origin could not be read at all (missing file, network failure, ...).
    #[error("source unavailable: {origin}: {source}")]
    SourceUnavailable {
        origin: String,
        #[source]
        source: io::Error,
    },

    /// A source handle or reader was used after it was released.
    #[error("I/O operation on a closed handle")]
    HandleClosed,

    #[error("a format named {0:?} is already registered")]
    DuplicateFormatName(String),

    #[error("no format known by name {0:?}")]
    UnknownFormat(String),

    /// Formats can only be registered before the registry serves its first resolution.
    #[error("cannot register {0:?}: the registry is already in use")]
    RegistrySealed(String),

    /// Every candidate format declined the source.
    #[error("could not find a format to read {origin}")]
    NoMatchingFormat { origin: String },

    /// The decoder accepted the probe but the bytes do not follow its grammar.
    #[error("{format}: decode error: {cause:#}")]
    Decode { format: String, cause: anyhow::Error },

    #[error("{format}: truncated input: needed {needed} bytes, only {available} available")]
    TruncatedInput {
        format: String,
        needed: usize,
        available: usize,
    },

    #[error("cannot aggregate an empty list of spectra")]
    EmptyAggregationInput,

    /// `index` is the first wavelength position out of tolerance, `spectrum`
    /// the position of the offending input. `max_deviation` is infinite when
    /// the axes differ in length.
    #[error(
        "wavelength axis of spectrum {spectrum} deviates from the reference \
         (first at index {index}, max deviation {max_deviation})"
    )]
    IncompatibleWavelengthAxes {
        index: usize,
        spectrum: usize,
        max_deviation: f64,
    },

    #[error("invalid spectrum: {0}")]
    InvalidSpectrum(#[from] SpectrumError),

    #[error("export error: {0}")]
    Export(#[from] csv::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn unavailable(origin: impl Into<String>, source: io::Error) -> Self {
        Error::SourceUnavailable {
            origin: origin.into(),
            source,
        }
    }
}

/// Failure reported by a [`Decoder`](crate::format::Decoder).
///
/// The reader attaches the format name and turns it into an [`Error`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("{0:#}")]
    Invalid(anyhow::Error),

    /// The source itself failed while the decoder was pulling bytes.
    #[error(transparent)]
    Source(#[from] Error),
}

impl From<anyhow::Error> for DecodeError {
    fn from(err: anyhow::Error) -> Self {
        DecodeError::Invalid(err)
    }
}

impl From<SpectrumError> for DecodeError {
    fn from(err: SpectrumError) -> Self {
        DecodeError::Invalid(err.into())
    }
}

impl DecodeError {
    /// Attach the name of the format that produced this failure.
    pub fn into_error(self, format: &str) -> Error {
        match self {
            DecodeError::Truncated { needed, available } => Error::TruncatedInput {
                format: format.to_string(),
                needed,
                available,
            },
            DecodeError::Invalid(cause) => Error::Decode {
                format: format.to_string(),
                cause,
            },
            DecodeError::Source(err) => err,
        }
    }
}
