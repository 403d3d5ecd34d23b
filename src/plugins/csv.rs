use anyhow::{bail, Context};

use crate::data::model::{Metadata, Spectrum, SpectrumMeta};
use crate::error::DecodeError;
use crate::format::{Decoder, FormatDescriptor};
use crate::source::SourceHandle;

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::new(
        "CSV",
        "Internal Comma-Separated Values format",
        ".csv",
        CsvDecoder,
    )
}

/// Reads the table written by [`crate::export::write_csv`]:
///
/// ```text
/// filename,400.2,402.7,405.3
/// sp1.spc,173.3,187.3,188.3
/// sp2.spc,191.1,203.2,201.8
/// ```
///
/// The header holds the wavelengths; every row is one spectrum labelled by
/// its first column, which ends up in the row's `filename` metadata.
pub struct CsvDecoder;

impl Decoder for CsvDecoder {
    fn probe(&self, prefix: &[u8], extension: Option<&str>) -> bool {
        extension == Some(".csv") || looks_like_export(prefix)
    }

    fn decode(&self, source: &mut SourceHandle) -> Result<Spectrum, DecodeError> {
        let bytes = source.contents()?;
        Ok(parse_table(bytes)?)
    }
}

/// A header line with a label followed by numeric columns.
fn looks_like_export(prefix: &[u8]) -> bool {
    let text = match std::str::from_utf8(prefix) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&prefix[..e.valid_up_to()]).unwrap_or_default(),
    };
    let line = match text.split_once('\n') {
        Some((line, _)) => line,
        // The window may cut the header: ignore the last, partial field.
        None => match text.rsplit_once(',') {
            Some((line, _)) => line,
            None => return false,
        },
    };
    let fields: Vec<&str> = line.trim_end_matches('\r').split(',').collect();
    fields.len() >= 2 && fields[1..].iter().all(|f| f.trim().parse::<f64>().is_ok())
}

fn parse_table(bytes: &[u8]) -> anyhow::Result<Spectrum> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let headers = reader.headers().context("reading CSV headers")?.clone();
    if headers.len() < 2 {
        bail!("CSV header needs a label column and at least one wavelength column");
    }

    let wavelength = headers
        .iter()
        .skip(1)
        .enumerate()
        .map(|(j, h)| {
            h.trim()
                .parse::<f64>()
                .with_context(|| format!("header column {}: '{h}' is not a wavelength", j + 1))
        })
        .collect::<anyhow::Result<Vec<f64>>>()?;

    let mut rows = Vec::new();
    let mut metas = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let values = record
            .iter()
            .skip(1)
            .enumerate()
            .map(|(j, tok)| {
                tok.trim()
                    .parse::<f64>()
                    .with_context(|| format!("row {row_no}, column {}: '{tok}' is not a number", j + 1))
            })
            .collect::<anyhow::Result<Vec<f64>>>()?;

        let mut meta = Metadata::new();
        meta.insert("filename", record.get(0).unwrap_or_default());
        rows.push(values);
        metas.push(meta);
    }
    if rows.is_empty() {
        bail!("CSV file contains no spectra");
    }

    Ok(Spectrum::with_ascending_axis(
        rows,
        wavelength,
        SpectrumMeta::PerRow(metas),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::MetadataValue;
    use crate::error::Error;

    #[test]
    fn probe_accepts_extension_or_numeric_header() {
        let d = CsvDecoder;
        assert!(d.probe(b"anything", Some(".csv")));
        assert!(d.probe(b"filename,400.5,401.0\nsp1,1,2\n", None));
        assert!(d.probe(b"filename,400.5,401.0,40", Some(".txt")));
        assert!(!d.probe(b"w,a\n1,2\n", None));
        assert!(!d.probe(b"PEPE\x00\x01binary", None));
        assert!(!d.probe(b"", None));
    }

    #[test]
    fn decodes_rows_with_labels() {
        let sp = parse_table(b"filename,10,20,30\nsp1.spc,1,2,3\nsp2.spc,4,5,6\n").unwrap();
        assert_eq!(sp.wavelength(), &[10.0, 20.0, 30.0]);
        assert_eq!(sp.amplitudes(), &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(
            sp.meta().for_row(1).and_then(|m| m.get("filename")),
            Some(&MetadataValue::from("sp2.spc"))
        );
    }

    #[test]
    fn descending_header_is_flipped() {
        let sp = parse_table(b",30,20,10\na,3,2,1\n").unwrap();
        assert_eq!(sp.wavelength(), &[10.0, 20.0, 30.0]);
        assert_eq!(sp.amplitudes(), &[vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn grammar_violations_are_decode_errors() {
        let cases: [&[u8]; 6] = [
            b"filename,10,abc\na,1,2\n",
            b"filename,10,20\na,1,x\n",
            b"filename,10,20\na,1\n",
            b"filename,10,20\n",
            b"filename\na\n",
            b"filename,10,5,20\na,1,2,3\n",
        ];
        for bad in cases {
            let mut source = SourceHandle::from_bytes(bad.to_vec());
            let err = CsvDecoder.decode(&mut source).unwrap_err().into_error("CSV");
            assert!(matches!(err, Error::Decode { .. }), "accepted {bad:?}");
        }
    }
}
