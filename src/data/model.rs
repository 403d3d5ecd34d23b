use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// MetadataValue – a single metadata cell
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value as found in file headers.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Raw bytes, e.g. a binary file signature.
    Bytes(Vec<u8>),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl MetadataValue {
    /// Try to interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Integer(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

// ---------------------------------------------------------------------------
// Metadata – insertion-ordered key → value mapping
// ---------------------------------------------------------------------------

/// Metadata keys keep the order in which the decoder found them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing (in place) any previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut meta = Metadata::new();
        for (k, v) in iter {
            meta.insert(k, v);
        }
        meta
    }
}

// ---------------------------------------------------------------------------
// SpectrumMeta – one mapping for the file, or one per row
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SpectrumMeta {
    /// A single mapping describing every row (typically a file header).
    Shared(Metadata),
    /// One mapping per amplitude row, in row order.
    PerRow(Vec<Metadata>),
}

impl Default for SpectrumMeta {
    fn default() -> Self {
        SpectrumMeta::Shared(Metadata::new())
    }
}

impl SpectrumMeta {
    /// Metadata describing row `index`.
    pub fn for_row(&self, index: usize) -> Option<&Metadata> {
        match self {
            SpectrumMeta::Shared(meta) => Some(meta),
            SpectrumMeta::PerRow(rows) => rows.get(index),
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum – amplitude rows over one wavelength axis
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("a spectrum needs at least one amplitude row")]
    NoRows,

    #[error("row {row} has {found} amplitudes but the wavelength axis has {expected}")]
    RowLength {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("wavelength axis decreases at index {index}")]
    NotMonotonic { index: usize },

    #[error("{found} metadata rows for {expected} amplitude rows")]
    MetaRows { found: usize, expected: usize },
}

/// One decoded unit: `N` amplitude rows sampled on a shared wavelength axis.
///
/// The fields are private so the invariants checked by [`Spectrum::new`]
/// hold for the lifetime of the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    amplitudes: Vec<Vec<f64>>,
    wavelength: Vec<f64>,
    meta: SpectrumMeta,
}

impl Spectrum {
    /// Build a spectrum, checking row lengths, axis order and metadata rows.
    pub fn new(
        amplitudes: Vec<Vec<f64>>,
        wavelength: Vec<f64>,
        meta: SpectrumMeta,
    ) -> Result<Self, SpectrumError> {
        if amplitudes.is_empty() {
            return Err(SpectrumError::NoRows);
        }
        for (row, values) in amplitudes.iter().enumerate() {
            if values.len() != wavelength.len() {
                return Err(SpectrumError::RowLength {
                    row,
                    found: values.len(),
                    expected: wavelength.len(),
                });
            }
        }
        // NaN never compares as ordered, so it is rejected here too.
        if let Some(index) = (1..wavelength.len()).find(|&i| !(wavelength[i] >= wavelength[i - 1])) {
            return Err(SpectrumError::NotMonotonic { index });
        }
        if let SpectrumMeta::PerRow(rows) = &meta {
            if rows.len() != amplitudes.len() {
                return Err(SpectrumError::MetaRows {
                    found: rows.len(),
                    expected: amplitudes.len(),
                });
            }
        }
        Ok(Spectrum {
            amplitudes,
            wavelength,
            meta,
        })
    }

    /// A one-row spectrum.
    pub fn single(
        amplitudes: Vec<f64>,
        wavelength: Vec<f64>,
        meta: Metadata,
    ) -> Result<Self, SpectrumError> {
        Spectrum::new(vec![amplitudes], wavelength, SpectrumMeta::Shared(meta))
    }

    /// Like [`Spectrum::new`], but an axis stored high-to-low is flipped
    /// (together with every row) before validation.
    pub fn with_ascending_axis(
        mut amplitudes: Vec<Vec<f64>>,
        mut wavelength: Vec<f64>,
        meta: SpectrumMeta,
    ) -> Result<Self, SpectrumError> {
        if let (Some(first), Some(last)) = (wavelength.first(), wavelength.last()) {
            if first > last {
                wavelength.reverse();
                for row in &mut amplitudes {
                    row.reverse();
                }
            }
        }
        Spectrum::new(amplitudes, wavelength, meta)
    }

    pub fn amplitudes(&self) -> &[Vec<f64>] {
        &self.amplitudes
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn meta(&self) -> &SpectrumMeta {
        &self.meta
    }

    /// Number of amplitude rows.
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    /// Always `false` for a validated spectrum; provided for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Row `index` as its own single-row spectrum.
    pub fn row(&self, index: usize) -> Option<Spectrum> {
        let values = self.amplitudes.get(index)?;
        let meta = self.meta.for_row(index).cloned().unwrap_or_default();
        Some(Spectrum {
            amplitudes: vec![values.clone()],
            wavelength: self.wavelength.clone(),
            meta: SpectrumMeta::Shared(meta),
        })
    }

    pub fn into_parts(self) -> (Vec<Vec<f64>>, Vec<f64>, SpectrumMeta) {
        (self.amplitudes, self.wavelength, self.meta)
    }

    /// Add `key` to the metadata of every row that lacks it.
    pub(crate) fn fill_meta(&mut self, key: &str, value: MetadataValue) {
        match &mut self.meta {
            SpectrumMeta::Shared(meta) => {
                if !meta.contains_key(key) {
                    meta.insert(key, value);
                }
            }
            SpectrumMeta::PerRow(rows) => {
                for meta in rows.iter_mut().filter(|m| !m.contains_key(key)) {
                    meta.insert(key, value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_keeps_insertion_order() {
        let mut meta = Metadata::new();
        meta.insert("zeta", 1i64);
        meta.insert("alpha", "a");
        meta.insert("zeta", 2i64);
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        assert_eq!(meta.get("zeta"), Some(&MetadataValue::Integer(2)));
    }

    #[test]
    fn rejects_mismatched_rows() {
        let err = Spectrum::new(
            vec![vec![1.0, 2.0], vec![1.0]],
            vec![10.0, 20.0],
            SpectrumMeta::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SpectrumError::RowLength {
                row: 1,
                found: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn rejects_decreasing_axis() {
        let err = Spectrum::single(vec![1.0, 2.0, 3.0], vec![1.0, 3.0, 2.0], Metadata::new())
            .unwrap_err();
        assert_eq!(err, SpectrumError::NotMonotonic { index: 2 });

        let err = Spectrum::single(vec![1.0, 2.0], vec![1.0, f64::NAN], Metadata::new())
            .unwrap_err();
        assert_eq!(err, SpectrumError::NotMonotonic { index: 1 });
    }

    #[test]
    fn repeated_wavelengths_are_allowed() {
        assert!(Spectrum::single(vec![1.0, 2.0], vec![5.0, 5.0], Metadata::new()).is_ok());
    }

    #[test]
    fn per_row_meta_must_match_row_count() {
        let err = Spectrum::new(
            vec![vec![1.0], vec![2.0]],
            vec![1.0],
            SpectrumMeta::PerRow(vec![Metadata::new()]),
        )
        .unwrap_err();
        assert_eq!(err, SpectrumError::MetaRows { found: 1, expected: 2 });
    }

    #[test]
    fn descending_axis_is_flipped() {
        let sp = Spectrum::with_ascending_axis(
            vec![vec![1.0, 2.0, 3.0]],
            vec![30.0, 20.0, 10.0],
            SpectrumMeta::default(),
        )
        .unwrap();
        assert_eq!(sp.wavelength(), &[10.0, 20.0, 30.0]);
        assert_eq!(sp.amplitudes(), &[vec![3.0, 2.0, 1.0]]);
    }

    #[test]
    fn row_extracts_its_own_metadata() {
        let rows = vec![
            [("filename", "a")].into_iter().collect::<Metadata>(),
            [("filename", "b")].into_iter().collect::<Metadata>(),
        ];
        let sp = Spectrum::new(
            vec![vec![1.0], vec![2.0]],
            vec![7.0],
            SpectrumMeta::PerRow(rows),
        )
        .unwrap();
        let second = sp.row(1).unwrap();
        assert_eq!(second.amplitudes(), &[vec![2.0]]);
        assert_eq!(
            second.meta().for_row(0).and_then(|m| m.get("filename")),
            Some(&MetadataValue::from("b"))
        );
        assert!(sp.row(2).is_none());
    }
}
