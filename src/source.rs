//! Uniform byte access over files, URLs, in-memory buffers and streams.
//!
//! A [`SourceHandle`] never hands the same bytes of its origin to anyone
//! twice: whatever has been read is kept in an internal buffer, so probing
//! the first few bytes of a non-seekable stream does not break the full
//! decode that follows.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Where the bytes of a [`SourceHandle`] come from.
pub enum Origin {
    Path(PathBuf),
    Url(String),
    Bytes,
    Stream,
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Origin::Url(u) => f.debug_tuple("Url").field(u).finish(),
            Origin::Bytes => f.write_str("Bytes"),
            Origin::Stream => f.write_str("Stream"),
        }
    }
}

pub struct SourceHandle {
    origin: Origin,
    /// Display name for in-memory origins; also used for the extension hint.
    label: Option<String>,
    /// Lazily opened reader positioned right after the last cached byte.
    reader: Option<Box<dyn Read + Send>>,
    cached: Vec<u8>,
    /// The origin reported end of data: `cached` is the whole content.
    exhausted: bool,
    materialized: Option<NamedTempFile>,
    closed: bool,
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle")
            .field("origin", &self.origin)
            .field("cached", &self.cached.len())
            .field("exhausted", &self.exhausted)
            .field("materialized", &self.materialized.as_ref().map(|t| t.path()))
            .field("closed", &self.closed)
            .finish()
    }
}

impl SourceHandle {
    fn with_origin(origin: Origin) -> Self {
        SourceHandle {
            origin,
            label: None,
            reader: None,
            cached: Vec::new(),
            exhausted: false,
            materialized: None,
            closed: false,
        }
    }

    /// A local file. Existence is checked on first access.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::with_origin(Origin::Path(path.into()))
    }

    /// A remote resource fetched over HTTP(S) on first access.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self::with_origin(Origin::Url(url.into()))
    }

    /// An in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let mut handle = Self::with_origin(Origin::Bytes);
        handle.cached = bytes.into();
        handle.exhausted = true;
        handle
    }

    /// Any byte stream. Bytes are pulled only as far as callers ask for them.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        let mut handle = Self::with_origin(Origin::Stream);
        handle.reader = Some(Box::new(reader));
        handle
    }

    /// Give an in-memory origin a name, e.g. `"upload.csv"`, so that it
    /// carries an extension hint.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.label = Some(name.into());
        self
    }

    /// Interpret a URI string.
    ///
    /// * `file://` prefixes are stripped
    /// * `http://` and `https://` become URL origins
    /// * a leading `~` is expanded to the home directory
    /// * relative paths are made absolute and must exist
    pub fn open(uri: &str) -> Result<Self> {
        if is_url(uri) {
            return Ok(Self::from_url(uri));
        }
        let raw = uri.strip_prefix("file://").unwrap_or(uri);
        let mut path = expand_home(raw);
        if path.is_relative() {
            let cwd = std::env::current_dir().map_err(|e| Error::unavailable(raw, e))?;
            path = cwd.join(path);
        }
        if !path.exists() {
            return Err(Error::unavailable(
                path.display().to_string(),
                io::Error::new(io::ErrorKind::NotFound, "No such file"),
            ));
        }
        Ok(Self::from_path(path))
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The origin's own path, when it is a local file.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Printable description of the origin, for diagnostics.
    pub fn name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.origin {
            Origin::Path(p) => p.display().to_string(),
            Origin::Url(u) => u.clone(),
            Origin::Bytes => "<bytes>".to_string(),
            Origin::Stream => "<stream>".to_string(),
        }
    }

    /// Lower-cased apparent suffix of the origin, including the dot.
    pub fn extension(&self) -> Option<String> {
        let name = match (&self.label, &self.origin) {
            (Some(label), _) => label.as_str(),
            (None, Origin::Path(p)) => return extension_of(p),
            (None, Origin::Url(u)) => u.split(['?', '#']).next().unwrap_or(u),
            (None, _) => return None,
        };
        extension_of(Path::new(name))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Up to `n` bytes from the start of the source.
    ///
    /// Repeated calls are served from the internal buffer; a larger `n`
    /// reads only the bytes that are not cached yet.
    pub fn peek(&mut self, n: usize) -> Result<&[u8]> {
        self.fill_to(n)?;
        let end = n.min(self.cached.len());
        Ok(&self.cached[..end])
    }

    /// The whole content of the source.
    pub fn contents(&mut self) -> Result<&[u8]> {
        self.fill_to(usize::MAX)?;
        Ok(&self.cached)
    }

    /// A path on the local filesystem holding the source's bytes.
    ///
    /// Local files are returned as they are. Anything else is copied once
    /// into a private temporary file that lives until [`release`](Self::release).
    pub fn materialize(&mut self) -> Result<&Path> {
        self.ensure_open()?;
        let is_path = matches!(self.origin, Origin::Path(_));
        if !is_path && self.materialized.is_none() {
            self.fill_to(usize::MAX)?;
            let suffix = self.extension().unwrap_or_default();
            let name = self.name();
            let mut tmp = tempfile::Builder::new()
                .prefix("spectro-io-")
                .suffix(&suffix)
                .tempfile()
                .map_err(|e| Error::unavailable(name.clone(), e))?;
            tmp.write_all(&self.cached)
                .and_then(|_| tmp.flush())
                .map_err(|e| Error::unavailable(name, e))?;
            debug!("materialized {} into {}", self.name(), tmp.path().display());
            self.materialized = Some(tmp);
        }
        match (&self.origin, &self.materialized) {
            (Origin::Path(p), _) => Ok(p),
            (_, Some(tmp)) => Ok(tmp.path()),
            (_, None) => Err(Error::HandleClosed),
        }
    }

    /// Close the origin and remove any temporary copy. Safe to call twice.
    pub fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.reader = None;
        self.cached = Vec::new();
        if let Some(tmp) = self.materialized.take() {
            let path = tmp.path().to_path_buf();
            if let Err(e) = tmp.close() {
                warn!("could not remove temporary file {}: {e}", path.display());
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::HandleClosed)
        } else {
            Ok(())
        }
    }

    /// Make sure at least `n` bytes are cached, or the whole source if shorter.
    fn fill_to(&mut self, n: usize) -> Result<()> {
        self.ensure_open()?;
        if self.exhausted || self.cached.len() >= n {
            return Ok(());
        }
        if self.reader.is_none() {
            self.reader = Some(self.open_reader()?);
        }
        let wanted = (n - self.cached.len()) as u64;
        let name = self.name();
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Err(Error::HandleClosed),
        };
        let got = reader
            .by_ref()
            .take(wanted)
            .read_to_end(&mut self.cached)
            .map_err(|e| Error::unavailable(name, e))?;
        if (got as u64) < wanted {
            self.exhausted = true;
            self.reader = None;
        }
        Ok(())
    }

    fn open_reader(&self) -> Result<Box<dyn Read + Send>> {
        match &self.origin {
            Origin::Path(path) => {
                let file = File::open(path)
                    .map_err(|e| Error::unavailable(path.display().to_string(), e))?;
                Ok(Box::new(file))
            }
            Origin::Url(url) => {
                debug!("fetching {url}");
                let response = ureq::get(url)
                    .call()
                    .map_err(|e| Error::unavailable(url.clone(), io::Error::other(e)))?;
                Ok(Box::new(response.into_reader()))
            }
            // In-memory origins are exhausted from the start and streams
            // only lose their reader once it has hit end of data.
            Origin::Bytes | Origin::Stream => Err(Error::HandleClosed),
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}

/// Whether `uri` names an `http://` or `https://` resource.
pub fn is_url(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(raw)
}
