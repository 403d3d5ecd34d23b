//! A resolved format bound to one source.

use std::sync::Arc;

use log::debug;

use crate::data::model::{Spectrum, SpectrumMeta};
use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::source::SourceHandle;

/// Decodes lazily and at most once; the handle is released on `close` or drop.
#[derive(Debug)]
pub struct Reader {
    format: Arc<FormatDescriptor>,
    source: SourceHandle,
    spectrum: Option<Spectrum>,
    /// Result of a header-only decode, used until a full decode happens.
    header: Option<SpectrumMeta>,
}

impl Reader {
    pub fn open(format: Arc<FormatDescriptor>, source: SourceHandle) -> Self {
        Reader {
            format,
            source,
            spectrum: None,
            header: None,
        }
    }

    pub fn format(&self) -> &Arc<FormatDescriptor> {
        &self.format
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_closed()
    }

    /// The metadata, decoding only the header when the format allows it.
    pub fn metadata(&mut self) -> Result<&SpectrumMeta> {
        self.check_open()?;
        if self.spectrum.is_none() && self.header.is_none() {
            let partial = self
                .format
                .decoder()
                .decode_metadata(&mut self.source)
                .map_err(|e| e.into_error(self.format.name()))?;
            match partial {
                Some(meta) => {
                    debug!("{}: header-only metadata decode", self.source.name());
                    self.header = Some(meta);
                }
                None => {
                    self.decode()?;
                }
            }
        }
        match (&self.spectrum, &self.header) {
            (Some(spectrum), _) => Ok(spectrum.meta()),
            (None, Some(meta)) => Ok(meta),
            (None, None) => Err(Error::HandleClosed),
        }
    }

    /// The fully decoded spectrum.
    pub fn read(&mut self) -> Result<&Spectrum> {
        self.check_open()?;
        self.decode()
    }

    /// Number of amplitude rows in the source.
    pub fn len(&mut self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Row `index` as a single-row spectrum.
    pub fn get(&mut self, index: usize) -> Result<Spectrum> {
        let format = self.format.name().to_string();
        let spectrum = self.read()?;
        let rows = spectrum.len();
        spectrum.row(index).ok_or_else(|| Error::Decode {
            format,
            cause: anyhow::anyhow!("spectrum index {index} out of range ({rows} rows)"),
        })
    }

    /// Every row in order, each as a single-row spectrum.
    pub fn rows(&mut self) -> Result<impl Iterator<Item = Spectrum> + '_> {
        let spectrum = self.read()?;
        Ok((0..spectrum.len()).filter_map(move |i| spectrum.row(i)))
    }

    /// Decode, release the source and hand the spectrum to the caller.
    pub fn into_spectrum(mut self) -> Result<Spectrum> {
        self.read()?;
        self.close();
        self.spectrum.take().ok_or(Error::HandleClosed)
    }

    /// Release the source. Idempotent.
    pub fn close(&mut self) {
        self.source.release();
    }

    fn check_open(&self) -> Result<()> {
        if self.source.is_closed() {
            Err(Error::HandleClosed)
        } else {
            Ok(())
        }
    }

    fn decode(&mut self) -> Result<&Spectrum> {
        if self.spectrum.is_none() {
            debug!("{}: decoding as {}", self.source.name(), self.format.name());
            let spectrum = self
                .format
                .decoder()
                .decode(&mut self.source)
                .map_err(|e| e.into_error(self.format.name()))?;
            self.header = None;
            self.spectrum = Some(spectrum);
        }
        self.spectrum.as_ref().ok_or(Error::HandleClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::data::model::{Metadata, MetadataValue};
    use crate::error::DecodeError;
    use crate::format::Decoder;

    /// Counts decodes; optionally supports a header-only path.
    struct Counting {
        full: Arc<AtomicUsize>,
        partial: Arc<AtomicUsize>,
        header_only: bool,
    }

    impl Decoder for Counting {
        fn probe(&self, _prefix: &[u8], _extension: Option<&str>) -> bool {
            true
        }

        fn decode(&self, source: &mut SourceHandle) -> std::result::Result<Spectrum, DecodeError> {
            self.full.fetch_add(1, Ordering::SeqCst);
            let bytes = source.contents()?;
            let values: Vec<f64> = bytes.iter().map(|&b| f64::from(b)).collect();
            let axis: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
            let meta: Metadata = [("origin", "full")].into_iter().collect();
            Ok(Spectrum::single(values, axis, meta)?)
        }

        fn decode_metadata(
            &self,
            _source: &mut SourceHandle,
        ) -> std::result::Result<Option<SpectrumMeta>, DecodeError> {
            if !self.header_only {
                return Ok(None);
            }
            self.partial.fetch_add(1, Ordering::SeqCst);
            let meta: Metadata = [("origin", "header")].into_iter().collect();
            Ok(Some(SpectrumMeta::Shared(meta)))
        }
    }

    struct Broken;

    impl Decoder for Broken {
        fn probe(&self, _prefix: &[u8], _extension: Option<&str>) -> bool {
            true
        }

        fn decode(&self, source: &mut SourceHandle) -> std::result::Result<Spectrum, DecodeError> {
            let available = source.contents()?.len();
            Err(DecodeError::Truncated {
                needed: available + 4,
                available,
            })
        }
    }

    fn counting(header_only: bool) -> (Reader, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let full = Arc::new(AtomicUsize::new(0));
        let partial = Arc::new(AtomicUsize::new(0));
        let format = Arc::new(FormatDescriptor::new(
            "count",
            "",
            "",
            Counting {
                full: full.clone(),
                partial: partial.clone(),
                header_only,
            },
        ));
        let reader = format.open(SourceHandle::from_bytes(vec![1u8, 2, 3]));
        (reader, full, partial)
    }

    fn origin(meta: &SpectrumMeta) -> Option<MetadataValue> {
        meta.for_row(0).and_then(|m| m.get("origin")).cloned()
    }

    #[test]
    fn open_does_not_decode() {
        let (_reader, full, partial) = counting(true);
        assert_eq!(full.load(Ordering::SeqCst), 0);
        assert_eq!(partial.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn metadata_prefers_header_decode() {
        let (mut reader, full, partial) = counting(true);
        assert_eq!(origin(reader.metadata().unwrap()), Some("header".into()));
        assert_eq!(origin(reader.metadata().unwrap()), Some("header".into()));
        assert_eq!(partial.load(Ordering::SeqCst), 1);
        assert_eq!(full.load(Ordering::SeqCst), 0);

        reader.read().unwrap();
        assert_eq!(origin(reader.metadata().unwrap()), Some("full".into()));
        assert_eq!(full.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn metadata_falls_back_to_single_full_decode() {
        let (mut reader, full, _) = counting(false);
        assert_eq!(origin(reader.metadata().unwrap()), Some("full".into()));
        let sp = reader.read().unwrap();
        assert_eq!(sp.amplitudes(), &[vec![1.0, 2.0, 3.0]]);
        reader.read().unwrap();
        assert_eq!(full.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_reader_refuses_work() {
        let (mut reader, _, _) = counting(false);
        reader.close();
        reader.close();
        assert!(reader.is_closed());
        assert!(matches!(reader.read(), Err(Error::HandleClosed)));
        assert!(matches!(reader.metadata(), Err(Error::HandleClosed)));
    }

    #[test]
    fn decoder_failures_name_the_format() {
        let format = Arc::new(FormatDescriptor::new("broken", "", "", Broken));
        let mut reader = format.open(SourceHandle::from_bytes(vec![0u8; 4]));
        match reader.read() {
            Err(Error::TruncatedInput {
                format,
                needed,
                available,
            }) => {
                assert_eq!(format, "BROKEN");
                assert_eq!((needed, available), (8, 4));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn failed_decode_still_releases_temporary_files() {
        let format = Arc::new(FormatDescriptor::new("broken", "", "", Broken));
        let mut source = SourceHandle::from_bytes(vec![0u8; 4]);
        let path = source.materialize().unwrap().to_path_buf();
        {
            let mut reader = format.open(source);
            assert!(reader.read().is_err());
        }
        assert!(!path.exists());
    }

    #[test]
    fn get_and_len_index_rows() {
        let (mut reader, _, _) = counting(false);
        assert_eq!(reader.len().unwrap(), 1);
        assert_eq!(reader.get(0).unwrap().amplitudes(), &[vec![1.0, 2.0, 3.0]]);
        assert!(matches!(reader.get(1), Err(Error::Decode { .. })));
        let sp = reader.into_spectrum().unwrap();
        assert_eq!(sp.wavelength(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn rows_walk_a_map_in_order() {
        let format = Arc::new(FormatDescriptor::new("fsm", "", ".fsm", crate::plugins::fsm::FsmDecoder));
        let mut reader = format.open(SourceHandle::from_bytes(crate::plugins::fsm::tests::sample_file()));
        let rows: Vec<Spectrum> = reader.rows().unwrap().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].amplitudes(), &[reader.read().unwrap().amplitudes()[1].clone()]);
        assert!(rows.iter().all(|row| row.len() == 1));

        reader.close();
        assert!(matches!(reader.rows(), Err(Error::HandleClosed)));
    }
}
