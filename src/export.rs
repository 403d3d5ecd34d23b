//! Writing spectra back out as the CSV table the CSV decoder reads.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::data::model::Spectrum;
use crate::error::{Error, Result};

/// Header `filename, w1, w2, ...`, then one line per row labelled by the
/// row's `filename` metadata, or by its index when there is none.
pub fn write_csv<W: Write>(spectrum: &Spectrum, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(spectrum.wavelength().len() + 1);
    header.push("filename".to_string());
    header.extend(spectrum.wavelength().iter().map(f64::to_string));
    out.write_record(&header)?;

    for (i, row) in spectrum.amplitudes().iter().enumerate() {
        let label = spectrum
            .meta()
            .for_row(i)
            .and_then(|m| m.get("filename"))
            .map(ToString::to_string)
            .unwrap_or_else(|| i.to_string());
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(label);
        record.extend(row.iter().map(f64::to_string));
        out.write_record(&record)?;
    }
    out.flush().map_err(csv::Error::from)?;
    Ok(())
}

impl Spectrum {
    /// Write this spectrum to `path` with [`write_csv`].
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| Error::Export(e.into()))?;
        write_csv(self, BufWriter::new(file))
    }
}
