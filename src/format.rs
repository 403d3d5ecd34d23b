//! Format descriptors and the decoder contract they wrap.

use std::fmt;
use std::sync::Arc;

use crate::data::model::{Spectrum, SpectrumMeta};
use crate::error::DecodeError;
use crate::reader::Reader;
use crate::source::SourceHandle;

/// The per-format capability the registry dispatches to.
///
/// `probe` must be cheap and free of side effects: it only sees the
/// signature window of the source and the lower-cased extension hint
/// (with its leading dot).
pub trait Decoder: Send + Sync {
    fn probe(&self, prefix: &[u8], extension: Option<&str>) -> bool;

    fn decode(&self, source: &mut SourceHandle) -> Result<Spectrum, DecodeError>;

    /// Decode only the header region. `Ok(None)` means the format has no
    /// cheaper path than a full decode.
    fn decode_metadata(
        &self,
        _source: &mut SourceHandle,
    ) -> Result<Option<SpectrumMeta>, DecodeError> {
        Ok(None)
    }
}

/// An immutable, named entry in a [`FormatRegistry`](crate::registry::FormatRegistry).
pub struct FormatDescriptor {
    name: String,
    description: String,
    extensions: Vec<String>,
    decoder: Box<dyn Decoder>,
}

impl FormatDescriptor {
    /// `extensions` is a space or comma separated list; dots are optional
    /// (`"csv"`, `".csv .txt"` and `"csv, txt"` are all accepted).
    pub fn new(
        name: &str,
        description: &str,
        extensions: &str,
        decoder: impl Decoder + 'static,
    ) -> Self {
        let mut exts: Vec<String> = Vec::new();
        for ext in extensions
            .split([' ', ','])
            .map(|e| e.trim().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
        {
            let ext = format!(".{}", ext.to_ascii_lowercase());
            if !exts.contains(&ext) {
                exts.push(ext);
            }
        }
        FormatDescriptor {
            name: name.trim().to_ascii_uppercase(),
            description: description.to_string(),
            extensions: exts,
            decoder: Box::new(decoder),
        }
    }

    /// Upper-cased format name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Lower-cased extensions, each with a leading dot.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn handles_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }

    pub fn probe(&self, prefix: &[u8], extension: Option<&str>) -> bool {
        self.decoder.probe(prefix, extension)
    }

    pub fn decoder(&self) -> &dyn Decoder {
        self.decoder.as_ref()
    }

    /// Bind this format to a source. Nothing is decoded yet.
    pub fn open(self: &Arc<Self>, source: SourceHandle) -> Reader {
        Reader::open(Arc::clone(self), source)
    }
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Format {} - {}>", self.name, self.description)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} [{}]",
            self.name,
            self.description,
            self.extensions.join(", ")
        )
    }
}
