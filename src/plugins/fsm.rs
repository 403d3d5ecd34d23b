//! Perkin Elmer Spotlight IR imaging files.
//!
//! ```text
//! offset 0    "PEPE"                 signature
//! offset 4    40 bytes               description
//! offset 44   blocks, back to back:  u16 id | i32 size | size bytes
//!               5100  name + axis geometry (one per file)
//!               5104  tagged text / integer fields
//!               5105  one spectrum as little-endian f32
//! ```
//!
//! The spectral axis is not stored point by point; it runs from `z_start`
//! to `z_end` (inclusive) in steps of `z_delta`, which is negative for the
//! usual high-to-low wavenumber files.

use anyhow::{anyhow, bail, Context};

use crate::data::model::{Metadata, MetadataValue, Spectrum, SpectrumMeta};
use crate::error::DecodeError;
use crate::format::{Decoder, FormatDescriptor};
use crate::source::SourceHandle;

const SIGNATURE: &[u8] = b"PEPE";
const DESCRIPTION_LEN: usize = 40;
const PREAMBLE: usize = 4 + DESCRIPTION_LEN;
const BLOCK_INFO: usize = 6;

const HEADER_BLOCK: u16 = 5100;
const TEXT_BLOCK: u16 = 5104;
const SPECTRUM_BLOCK: u16 = 5105;

/// Size of the fixed part of a 5100 block following the name.
const HEADER_FIELDS_LEN: usize = 104;

/// Position of each known field in the sequence of 5104 values.
const TEXT_FIELDS: &[(usize, &str)] = &[
    (0, "analyst"),
    (2, "date"),
    (4, "image_name"),
    (5, "instrument_model"),
    (6, "instrument_serial_number"),
    (7, "instrument_software_version"),
    (9, "accumulations"),
    (11, "detector"),
    (12, "source"),
    (13, "beam_splitter"),
    (15, "apodization"),
    (16, "spectrum_type"),
    (17, "beam_type"),
    (20, "phase_correction"),
    (26, "ir_accessory"),
    (28, "igram_type"),
    (29, "scan_direction"),
    (32, "background_scans"),
    (67, "ir_laser_wave_number_unit"),
];

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::new(
        "FSM",
        "FSM Perkin Elmer Spotlight IR instrument binary format",
        ".fsm",
        FsmDecoder,
    )
}

pub struct FsmDecoder;

impl Decoder for FsmDecoder {
    fn probe(&self, prefix: &[u8], _extension: Option<&str>) -> bool {
        prefix.starts_with(SIGNATURE)
    }

    fn decode(&self, source: &mut SourceHandle) -> Result<Spectrum, DecodeError> {
        let (meta, rows) = walk_blocks(source, false)?;
        if rows.is_empty() {
            return Err(anyhow!("no 5105 spectrum blocks").into());
        }
        let wavelength = wavelength_axis(&meta, rows[0].len())?;
        Ok(Spectrum::with_ascending_axis(
            rows,
            wavelength,
            SpectrumMeta::Shared(meta),
        )?)
    }

    /// Stops at the first spectrum block, so only the header region is read.
    fn decode_metadata(
        &self,
        source: &mut SourceHandle,
    ) -> Result<Option<SpectrumMeta>, DecodeError> {
        let (meta, _) = walk_blocks(source, true)?;
        Ok(Some(SpectrumMeta::Shared(meta)))
    }
}

fn walk_blocks(
    source: &mut SourceHandle,
    header_only: bool,
) -> Result<(Metadata, Vec<Vec<f64>>), DecodeError> {
    let head = source.peek(PREAMBLE)?;
    if head.len() < PREAMBLE {
        return Err(DecodeError::Truncated {
            needed: PREAMBLE,
            available: head.len(),
        });
    }
    if !head.starts_with(SIGNATURE) {
        return Err(anyhow!("missing PEPE signature").into());
    }
    let mut meta = Metadata::new();
    meta.insert("signature", MetadataValue::Bytes(head[..4].to_vec()));
    meta.insert(
        "description",
        String::from_utf8_lossy(&head[4..PREAMBLE])
            .trim_end_matches('\0')
            .to_string(),
    );

    let mut rows = Vec::new();
    let mut pos = PREAMBLE;
    loop {
        let bytes = source.peek(pos + BLOCK_INFO)?;
        if bytes.len() <= pos {
            break;
        }
        if bytes.len() < pos + BLOCK_INFO {
            return Err(DecodeError::Truncated {
                needed: pos + BLOCK_INFO,
                available: bytes.len(),
            });
        }
        let id = u16::from_le_bytes([bytes[pos], bytes[pos + 1]]);
        let size = i32::from_le_bytes([bytes[pos + 2], bytes[pos + 3], bytes[pos + 4], bytes[pos + 5]]);
        let size = usize::try_from(size)
            .map_err(|_| anyhow!("block {id} at offset {pos} has negative size {size}"))?;
        if header_only && id == SPECTRUM_BLOCK {
            break;
        }

        let start = pos + BLOCK_INFO;
        let end = start + size;
        let bytes = source.peek(end)?;
        if bytes.len() < end {
            return Err(DecodeError::Truncated {
                needed: end,
                available: bytes.len(),
            });
        }
        let data = &bytes[start..end];
        match id {
            HEADER_BLOCK => decode_header(data, &mut meta).context("5100 header block")?,
            TEXT_BLOCK => decode_text(data, &mut meta).context("5104 text block")?,
            SPECTRUM_BLOCK => rows.push(decode_row(data).context("5105 spectrum block")?),
            other => return Err(anyhow!("unknown block id {other} at offset {pos}").into()),
        }
        pos = end;
    }
    Ok((meta, rows))
}

/// Little-endian reads over one block, failing instead of running past its end.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> anyhow::Result<[u8; N]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .with_context(|| format!("block too short: {} bytes, needed {}", self.data.len(), self.pos + N))?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn bytes(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .with_context(|| format!("block too short: {} bytes, needed {}", self.data.len(), self.pos + n))?;
        self.pos += n;
        Ok(bytes)
    }

    fn f64(&mut self) -> anyhow::Result<f64> {
        Ok(f64::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> anyhow::Result<i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn i16(&mut self) -> anyhow::Result<i16> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    fn u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.take::<1>()?[0])
    }
}

fn decode_header(data: &[u8], meta: &mut Metadata) -> anyhow::Result<()> {
    let mut cur = Cursor::new(data);
    let name_len = usize::try_from(cur.i16()?).context("negative name length")?;
    let name = cur.bytes(name_len)?;
    meta.insert("name", String::from_utf8_lossy(name).into_owned());

    if data.len() < cur.pos + HEADER_FIELDS_LEN {
        bail!(
            "header fields need {HEADER_FIELDS_LEN} bytes after the name, block has {}",
            data.len() - cur.pos
        );
    }
    for key in [
        "x_delta",
        "y_delta",
        "z_delta",
        "z_start",
        "z_end",
        "z_4d_start",
        "z_4d_end",
        "x_init",
        "y_init",
        "z_init",
    ] {
        meta.insert(key, cur.f64()?);
    }
    for key in ["n_x", "n_y", "n_z"] {
        meta.insert(key, i64::from(cur.i32()?));
    }
    for (short, byte) in [
        (None, "text1"),
        (None, "text2"),
        (Some("resolution"), "text3"),
        (Some("transmission"), "text4"),
    ] {
        let value = i64::from(cur.i16()?);
        if let Some(key) = short {
            meta.insert(key, value);
        }
        meta.insert(byte, i64::from(cur.u8()?));
    }
    Ok(())
}

/// The 5104 block is a byte soup with three tagged value kinds:
/// `#u` length-prefixed text, `$u` and `,u` 16-bit integers.
/// Anything else is skipped one byte at a time.
fn decode_text(data: &[u8], meta: &mut Metadata) -> anyhow::Result<()> {
    let mut values: Vec<MetadataValue> = Vec::new();
    let mut cur = Cursor::new(data);
    while cur.pos + 2 < data.len() {
        match &data[cur.pos..cur.pos + 2] {
            b"#u" => {
                cur.pos += 2;
                let len = usize::try_from(cur.i16()?).context("negative text length")?;
                let text = cur.bytes(len)?;
                values.push(String::from_utf8_lossy(text).into_owned().into());
                cur.pos += 6;
            }
            b"$u" => {
                cur.pos += 2;
                values.push(i64::from(cur.i16()?).into());
                cur.pos += 6;
            }
            b",u" => {
                cur.pos += 2;
                values.push(i64::from(cur.i16()?).into());
            }
            _ => cur.pos += 1,
        }
    }

    for &(index, key) in TEXT_FIELDS {
        if let Some(value) = values.get(index) {
            meta.insert(key, value.clone());
        }
    }
    Ok(())
}

fn decode_row(data: &[u8]) -> anyhow::Result<Vec<f64>> {
    if data.len() % 4 != 0 {
        bail!("{} bytes is not a whole number of f32 values", data.len());
    }
    Ok(data
        .chunks_exact(4)
        .map(|c| f64::from(f32::from_le_bytes([c[0], c[1], c[2], c[3]])))
        .collect())
}

/// `z_start, z_start + z_delta, ..., z_end`, which must hold `width` points.
fn wavelength_axis(meta: &Metadata, width: usize) -> anyhow::Result<Vec<f64>> {
    let field = |key: &str| {
        meta.get(key)
            .and_then(MetadataValue::as_f64)
            .with_context(|| format!("no {key} in file: missing 5100 header block"))
    };
    let (start, end, delta) = (field("z_start")?, field("z_end")?, field("z_delta")?);
    let steps = (end - start) / delta;
    if !steps.is_finite() || steps < 0.0 {
        bail!("z_delta {delta} does not step from {start} to {end}");
    }
    let points = steps.round() + 1.0;
    if points != width as f64 {
        bail!("axis {start}..{end} by {delta} has {points} points, spectra have {width}");
    }
    Ok((0..width).map(|i| start + i as f64 * delta).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;

    fn block(id: u16, data: &[u8]) -> Vec<u8> {
        let mut out = id.to_le_bytes().to_vec();
        out.extend_from_slice(&(data.len() as i32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    fn header(z_start: f64, z_end: f64, z_delta: f64, n_z: i32) -> Vec<u8> {
        let name = b"map01";
        let mut data = (name.len() as i16).to_le_bytes().to_vec();
        data.extend_from_slice(name);
        for v in [1.0, 1.0, z_delta, z_start, z_end, 0.0, 0.0, 0.0, 0.0, z_start] {
            data.extend_from_slice(&f64::to_le_bytes(v));
        }
        for v in [1i32, 2, n_z] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        for (short, byte) in [(0i16, 1u8), (0, 2), (4, 3), (1, 4)] {
            data.extend_from_slice(&short.to_le_bytes());
            data.push(byte);
        }
        data
    }

    fn text_fields() -> Vec<u8> {
        let mut data = Vec::new();
        let mut text = |s: &str| {
            data.extend_from_slice(b"#u");
            data.extend_from_slice(&(s.len() as i16).to_le_bytes());
            data.extend_from_slice(s.as_bytes());
            data.extend_from_slice(&[0; 6]);
        };
        text("Ada");
        text("ignored");
        text("2017-04-12");
        data.extend_from_slice(b",u");
        data.extend_from_slice(&7i16.to_le_bytes());
        data.push(0);
        data
    }

    fn row(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// A two-spectrum file on the axis 4000, 3998, 3996.
    pub(crate) fn sample_file() -> Vec<u8> {
        let mut out = b"PEPE".to_vec();
        let mut description = b"Spotlight test map".to_vec();
        description.resize(DESCRIPTION_LEN, 0);
        out.extend_from_slice(&description);
        out.extend(block(HEADER_BLOCK, &header(4000.0, 3996.0, -2.0, 3)));
        out.extend(block(TEXT_BLOCK, &text_fields()));
        out.extend(block(SPECTRUM_BLOCK, &row(&[1.0, 2.0, 3.0])));
        out.extend(block(SPECTRUM_BLOCK, &row(&[4.0, 5.0, 6.0])));
        out
    }

    fn shared(meta: &SpectrumMeta) -> &Metadata {
        match meta {
            SpectrumMeta::Shared(m) => m,
            SpectrumMeta::PerRow(_) => panic!("expected file-level metadata"),
        }
    }

    #[test]
    fn decodes_rows_on_an_ascending_axis() {
        let mut source = SourceHandle::from_bytes(sample_file());
        let sp = FsmDecoder.decode(&mut source).unwrap();
        assert_eq!(sp.wavelength(), &[3996.0, 3998.0, 4000.0]);
        assert_eq!(sp.amplitudes(), &[vec![3.0, 2.0, 1.0], vec![6.0, 5.0, 4.0]]);

        let meta = shared(sp.meta());
        assert_eq!(meta.get("signature"), Some(&MetadataValue::Bytes(b"PEPE".to_vec())));
        assert_eq!(meta.get("description"), Some(&MetadataValue::from("Spotlight test map")));
        assert_eq!(meta.get("name"), Some(&MetadataValue::from("map01")));
        assert_eq!(meta.get("n_z"), Some(&MetadataValue::Integer(3)));
        assert_eq!(meta.get("resolution"), Some(&MetadataValue::Integer(4)));
        assert_eq!(meta.get("analyst"), Some(&MetadataValue::from("Ada")));
        assert_eq!(meta.get("date"), Some(&MetadataValue::from("2017-04-12")));
        assert!(!meta.contains_key("image_name"));
    }

    #[test]
    fn header_only_metadata_skips_the_spectra() {
        let file = sample_file();
        let spectra_start = file.len() - 2 * (BLOCK_INFO + 12);
        // Everything after the first spectrum block header is garbage.
        let mut cut = file[..spectra_start + BLOCK_INFO].to_vec();
        cut.extend_from_slice(&[0xFF; 3]);

        let mut source = SourceHandle::from_bytes(cut);
        let meta = FsmDecoder.decode_metadata(&mut source).unwrap().unwrap();
        assert_eq!(shared(&meta).get("analyst"), Some(&MetadataValue::from("Ada")));
    }

    #[test]
    fn block_running_past_the_end_is_truncation() {
        let file = sample_file();
        let cut = file[..file.len() - 5].to_vec();
        let mut source = SourceHandle::from_bytes(cut.clone());
        let err = FsmDecoder.decode(&mut source).unwrap_err().into_error("FSM");
        match err {
            Error::TruncatedInput {
                needed, available, ..
            } => {
                assert_eq!(needed, file.len());
                assert_eq!(available, cut.len());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn short_preamble_and_partial_block_info_are_truncation() {
        let mut source = SourceHandle::from_bytes(b"PEPE short".to_vec());
        assert!(matches!(
            FsmDecoder.decode(&mut source),
            Err(DecodeError::Truncated { needed: PREAMBLE, available: 10 })
        ));

        let mut file = sample_file();
        file.extend_from_slice(&[0xEC, 0x13]);
        let mut source = SourceHandle::from_bytes(file);
        assert!(matches!(
            FsmDecoder.decode(&mut source),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_blocks_are_decode_errors() {
        let mut file = sample_file();
        file.extend(block(4242, &[0; 4]));
        let mut source = SourceHandle::from_bytes(file);
        let err = FsmDecoder.decode(&mut source).unwrap_err().into_error("FSM");
        assert!(err.to_string().contains("unknown block id 4242"), "{err}");
    }

    #[test]
    fn axis_length_must_match_the_rows() {
        let mut file = b"PEPE".to_vec();
        file.extend_from_slice(&[0; DESCRIPTION_LEN]);
        file.extend(block(HEADER_BLOCK, &header(4000.0, 3990.0, -2.0, 6)));
        file.extend(block(SPECTRUM_BLOCK, &row(&[1.0, 2.0, 3.0])));
        let mut source = SourceHandle::from_bytes(file);
        assert!(matches!(
            FsmDecoder.decode(&mut source),
            Err(DecodeError::Invalid(_))
        ));
    }

    #[test]
    fn tiny_axis_step_is_rejected_before_building_the_axis() {
        let mut file = b"PEPE".to_vec();
        file.extend_from_slice(&[0; DESCRIPTION_LEN]);
        file.extend(block(HEADER_BLOCK, &header(4000.0, 0.0, -1e-300, 3)));
        file.extend(block(SPECTRUM_BLOCK, &row(&[1.0, 2.0, 3.0])));
        let mut source = SourceHandle::from_bytes(file);
        let err = FsmDecoder.decode(&mut source).unwrap_err().into_error("FSM");
        assert!(matches!(err, Error::Decode { .. }), "{err}");
        assert!(err.to_string().contains("spectra have 3"), "{err}");
    }

    #[test]
    fn probe_needs_the_signature() {
        assert!(FsmDecoder.probe(b"PEPE\0\0", Some(".fsm")));
        assert!(!FsmDecoder.probe(b"PAR1", Some(".fsm")));
    }
}
