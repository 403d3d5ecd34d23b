use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::data::model::{Metadata, MetadataValue, Spectrum, SpectrumMeta};
use crate::error::DecodeError;
use crate::format::{Decoder, FormatDescriptor};
use crate::source::SourceHandle;

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::new(
        "JSON",
        "Records-oriented JSON spectra (pandas to_json(orient='records'))",
        ".json",
        JsonDecoder,
    )
}

/// Expected layout:
///
/// ```json
/// [
///   { "x": [4000.0, 3999.0, ...], "y": [0.12, 0.14, ...], "sample": "A" },
///   { "x": [4000.0, 3999.0, ...], "y": [0.31, 0.29, ...], "sample": "B" }
/// ]
/// ```
///
/// All records of one file must share the same `x` exactly; combining
/// slightly different axes is the job of aggregation.
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn probe(&self, prefix: &[u8], _extension: Option<&str>) -> bool {
        let mut tokens = prefix
            .strip_prefix(b"\xEF\xBB\xBF")
            .unwrap_or(prefix)
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace());
        tokens.next() == Some(b'[') && tokens.next() == Some(b'{')
    }

    fn decode(&self, source: &mut SourceHandle) -> Result<Spectrum, DecodeError> {
        let bytes = source.contents()?;
        Ok(parse_records(bytes)?)
    }
}

/// One element of the top-level array.
#[derive(Deserialize)]
struct Record {
    x: Vec<f64>,
    y: Vec<f64>,
    #[serde(flatten)]
    rest: serde_json::Map<String, JsonValue>,
}

fn parse_records(bytes: &[u8]) -> anyhow::Result<Spectrum> {
    let records: Vec<Record> =
        serde_json::from_slice(bytes).context("expected an array of {x, y, ...} records")?;
    let Some(first) = records.first() else {
        bail!("JSON array contains no spectra");
    };
    let axis = first.x.clone();

    let mut rows = Vec::with_capacity(records.len());
    let mut metas = Vec::with_capacity(records.len());
    for (i, record) in records.into_iter().enumerate() {
        if record.x.len() != record.y.len() {
            bail!("record {i}: x has {} values but y has {}", record.x.len(), record.y.len());
        }
        if record.x != axis {
            bail!("record {i}: x differs from record 0; aggregate separate reads instead");
        }
        rows.push(record.y);
        metas.push(
            record
                .rest
                .into_iter()
                .map(|(key, value)| (key, metadata_value(value)))
                .collect::<Metadata>(),
        );
    }

    Ok(Spectrum::with_ascending_axis(rows, axis, SpectrumMeta::PerRow(metas))?)
}

/// Scalars keep their type; nested arrays and objects are kept as JSON text.
fn metadata_value(value: JsonValue) -> MetadataValue {
    match value {
        JsonValue::Null => MetadataValue::Null,
        JsonValue::Bool(b) => b.into(),
        JsonValue::String(s) => s.into(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.into(),
            (None, Some(f)) => f.into(),
            (None, None) => n.to_string().into(),
        },
        nested => nested.to_string().into(),
    }
}
