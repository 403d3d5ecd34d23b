//! Ordered set of formats and the resolution algorithm that picks one.
//!
//! Registration order is priority. Resolution never mutates the registry,
//! so a populated registry can be shared across threads freely; once it
//! has answered a `resolve` call it refuses further registrations.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;

use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::plugins;
use crate::source::SourceHandle;

/// Number of leading bytes every probe sees.
pub const SIGNATURE_WINDOW: usize = 256;

#[derive(Default)]
pub struct FormatRegistry {
    entries: Vec<Arc<FormatDescriptor>>,
    /// extension (".csv") → indices into `entries`, in registration order
    by_extension: HashMap<String, Vec<usize>>,
    /// upper-cased name → index into `entries`
    by_name: HashMap<String, usize>,
    sealed: AtomicBool,
}

static DEFAULT_REGISTRY: Lazy<FormatRegistry> = Lazy::new(|| {
    let mut registry = FormatRegistry::new();
    for format in plugins::builtin_formats() {
        // Built-in names are distinct.
        if let Err(e) = registry.register(format) {
            log::error!("failed to register built-in format: {e}");
        }
    }
    registry
});

/// The process-wide registry holding the built-in formats.
pub fn default_registry() -> &'static FormatRegistry {
    &DEFAULT_REGISTRY
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a format at the lowest priority.
    pub fn register(&mut self, format: FormatDescriptor) -> Result<Arc<FormatDescriptor>> {
        let name = format.name().to_string();
        if self.sealed.load(Ordering::Acquire) {
            return Err(Error::RegistrySealed(name));
        }
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateFormatName(name));
        }
        let index = self.entries.len();
        for ext in format.extensions() {
            self.by_extension.entry(ext.clone()).or_default().push(index);
        }
        self.by_name.insert(name, index);
        let format = Arc::new(format);
        self.entries.push(Arc::clone(&format));
        Ok(format)
    }

    /// Pick the format for `source`.
    ///
    /// An explicit name wins outright and skips probing. Otherwise formats
    /// claiming the extension are probed first, then every other format,
    /// each group in registration order; the first positive probe wins.
    pub fn resolve(
        &self,
        source: &mut SourceHandle,
        name_hint: Option<&str>,
        extension_hint: Option<&str>,
    ) -> Result<Arc<FormatDescriptor>> {
        self.sealed.store(true, Ordering::Release);

        if let Some(name) = name_hint {
            let format = self.get(name)?;
            debug!("{}: using requested format {}", source.name(), format.name());
            return Ok(format);
        }

        let extension = match extension_hint {
            Some(ext) => Some(normalize_extension(ext)),
            None => source.extension(),
        };
        let origin = source.name();
        let candidates = self.candidates(extension.as_deref());
        let prefix = source.peek(SIGNATURE_WINDOW)?;

        for index in candidates {
            let format = &self.entries[index];
            if format.probe(prefix, extension.as_deref()) {
                debug!("{origin}: probed as {}", format.name());
                return Ok(Arc::clone(format));
            }
        }
        Err(Error::NoMatchingFormat { origin })
    }

    /// Indices to probe: extension matches first, then everything else.
    fn candidates(&self, extension: Option<&str>) -> Vec<usize> {
        let claimed: &[usize] = extension
            .and_then(|ext| self.by_extension.get(ext))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let rest = (0..self.entries.len()).filter(|i| !claimed.contains(i));
        claimed.iter().copied().chain(rest).collect()
    }

    /// Look up a format by exact (case-insensitive) name.
    pub fn get(&self, name: &str) -> Result<Arc<FormatDescriptor>> {
        let key = name.trim().to_ascii_uppercase();
        self.by_name
            .get(&key)
            .map(|&i| Arc::clone(&self.entries[i]))
            .ok_or_else(|| Error::UnknownFormat(name.to_string()))
    }

    /// Looser lookup for interactive use: a name, a `NAME-variant` prefix,
    /// an extension (`".csv"`) or a file name (`"scan.csv"`).
    pub fn lookup(&self, query: &str) -> Result<Arc<FormatDescriptor>> {
        let query = query.trim();
        if query.contains('.') {
            let ext = std::path::Path::new(query)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or_else(|| query.trim_start_matches('.'));
            return self.first_for_extension(&normalize_extension(ext), query);
        }
        if let Ok(format) = self.get(query) {
            return Ok(format);
        }
        let upper = query.to_ascii_uppercase();
        if let Some(format) = self
            .entries
            .iter()
            .find(|f| f.name().rsplit_once('-').map(|(base, _)| base) == Some(upper.as_str()))
        {
            return Ok(Arc::clone(format));
        }
        self.first_for_extension(&normalize_extension(query), query)
    }

    fn first_for_extension(&self, ext: &str, query: &str) -> Result<Arc<FormatDescriptor>> {
        self.by_extension
            .get(ext)
            .and_then(|indices| indices.first())
            .map(|&i| Arc::clone(&self.entries[i]))
            .ok_or_else(|| Error::UnknownFormat(query.to_string()))
    }

    /// Formats in priority order.
    pub fn formats(&self) -> impl Iterator<Item = &Arc<FormatDescriptor>> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<FormatRegistry with {} registered formats>", self.len())
    }
}

impl fmt::Display for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for format in &self.entries {
            writeln!(f, "{format}")?;
        }
        Ok(())
    }
}

fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_ascii_lowercase())
}
