use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::data::model::{Metadata, MetadataValue, Spectrum, SpectrumMeta};
use crate::error::DecodeError;
use crate::format::{Decoder, FormatDescriptor};
use crate::source::SourceHandle;

const MAGIC: &[u8] = b"PAR1";

pub fn descriptor() -> FormatDescriptor {
    FormatDescriptor::new(
        "PARQUET",
        "Apache Parquet table with x / y list columns",
        ".parquet .pq",
        ParquetDecoder,
    )
}

/// Expected schema:
/// - `x`: List<Float64> or LargeList<Float64> (Float32 items accepted)
/// - `y`: same type as `x`
/// - any other column is per-row metadata (strings, ints, floats, bools)
///
/// Works with files written by both pandas (`df.to_parquet()`) and
/// polars (`df.write_parquet()`). Parquet needs random access, so
/// non-file sources are materialized first.
pub struct ParquetDecoder;

impl Decoder for ParquetDecoder {
    fn probe(&self, prefix: &[u8], _extension: Option<&str>) -> bool {
        prefix.starts_with(MAGIC)
    }

    fn decode(&self, source: &mut SourceHandle) -> Result<Spectrum, DecodeError> {
        let path = source.materialize()?.to_path_buf();
        Ok(read_table(&path)?)
    }
}

fn read_table(path: &Path) -> anyhow::Result<Spectrum> {
    let file = File::open(path)
        .with_context(|| format!("opening parquet file {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut axis: Option<Vec<f64>> = None;
    let mut rows = Vec::new();
    let mut metas = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let x_idx = schema
            .index_of("x")
            .map_err(|_| anyhow::anyhow!("parquet file missing 'x' column"))?;
        let y_idx = schema
            .index_of("y")
            .map_err(|_| anyhow::anyhow!("parquet file missing 'y' column"))?;
        let x_col = batch.column(x_idx);
        let y_col = batch.column(y_idx);

        let meta_cols: Vec<(usize, String)> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != x_idx && *i != y_idx)
            .map(|(i, f)| (i, f.name().clone()))
            .collect();

        for row in 0..batch.num_rows() {
            let global = rows.len();
            let x = number_list(x_col, row)
                .with_context(|| format!("row {global}: failed to read 'x'"))?;
            let y = number_list(y_col, row)
                .with_context(|| format!("row {global}: failed to read 'y'"))?;
            if x.len() != y.len() {
                bail!("row {global}: x has {} values but y has {}", x.len(), y.len());
            }
            match &axis {
                None => axis = Some(x),
                Some(first) if *first != x => {
                    bail!("row {global}: x differs from row 0; aggregate separate reads instead")
                }
                Some(_) => {}
            }

            let metadata: Metadata = meta_cols
                .iter()
                .map(|(col_idx, name)| {
                    (name.clone(), cell_value(batch.column(*col_idx), row))
                })
                .collect();
            rows.push(y);
            metas.push(metadata);
        }
    }
    if rows.is_empty() {
        bail!("parquet file contains no spectra");
    }

    Ok(Spectrum::with_ascending_axis(
        rows,
        axis.unwrap_or_default(),
        SpectrumMeta::PerRow(metas),
    )?)
}

/// Row `row` of a List or LargeList column of floats, widened to f64.
/// Null items become NaN.
fn number_list(col: &ArrayRef, row: usize) -> anyhow::Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null list");
    }
    let items = match (col.as_list_opt::<i32>(), col.as_list_opt::<i64>()) {
        (Some(list), _) => list.value(row),
        (None, Some(list)) => list.value(row),
        (None, None) => bail!("expected a list column, got {}", col.data_type()),
    };
    if !matches!(items.data_type(), DataType::Float64 | DataType::Float32) {
        bail!("list items are {}, expected Float64 or Float32", items.data_type());
    }
    let widened = cast(&items, &DataType::Float64).context("widening list items")?;
    let floats = widened
        .as_primitive_opt::<Float64Type>()
        .context("list items did not widen to Float64")?;
    Ok(floats.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Typed value of a scalar cell; other column types are rendered as text.
fn cell_value(col: &ArrayRef, row: usize) -> MetadataValue {
    if col.is_null(row) {
        return MetadataValue::Null;
    }
    let typed: Option<MetadataValue> = match col.data_type() {
        DataType::Utf8 => col.as_string_opt::<i32>().map(|a| a.value(row).into()),
        DataType::LargeUtf8 => col.as_string_opt::<i64>().map(|a| a.value(row).into()),
        DataType::Boolean => col.as_boolean_opt().map(|a| a.value(row).into()),
        DataType::Int32 => col
            .as_primitive_opt::<Int32Type>()
            .map(|a| i64::from(a.value(row)).into()),
        DataType::Int64 => col.as_primitive_opt::<Int64Type>().map(|a| a.value(row).into()),
        DataType::Float32 => col
            .as_primitive_opt::<Float32Type>()
            .map(|a| f64::from(a.value(row)).into()),
        DataType::Float64 => col.as_primitive_opt::<Float64Type>().map(|a| a.value(row).into()),
        _ => None,
    };
    typed.unwrap_or_else(|| match array_value_to_string(col, row) {
        Ok(text) => text.into(),
        Err(_) => col.data_type().to_string().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Date32Array, Float32Builder, Float64Builder, Int32Array, ListBuilder, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use crate::error::Error;

    fn list_column(rows: &[Vec<f64>]) -> ArrayRef {
        let mut builder = ListBuilder::new(Float64Builder::new());
        for row in rows {
            builder.values().append_slice(row);
            builder.append(true);
        }
        Arc::new(builder.finish())
    }

    fn write_parquet(path: &Path, xs: &[Vec<f64>], ys: &[Vec<f64>], names: &[&str]) {
        let x = list_column(xs);
        let y = list_column(ys);
        let sample: ArrayRef = Arc::new(StringArray::from(names.to_vec()));
        let schema = Arc::new(Schema::new(vec![
            Field::new("x", x.data_type().clone(), false),
            Field::new("y", y.data_type().clone(), false),
            Field::new("sample", DataType::Utf8, false),
        ]));
        let batch = RecordBatch::try_new(schema.clone(), vec![x, y, sample]).unwrap();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn reads_list_columns_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectra.parquet");
        let axis = vec![4000.0, 3000.0, 2000.0];
        write_parquet(
            &path,
            &[axis.clone(), axis],
            &[vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]],
            &["A", "B"],
        );

        let mut source = SourceHandle::from_path(&path);
        assert!(ParquetDecoder.probe(source.peek(4).unwrap(), None));
        let sp = ParquetDecoder.decode(&mut source).unwrap();
        assert_eq!(sp.wavelength(), &[2000.0, 3000.0, 4000.0]);
        assert_eq!(sp.amplitudes(), &[vec![0.3, 0.2, 0.1], vec![0.6, 0.5, 0.4]]);
        assert_eq!(
            sp.meta().for_row(1).and_then(|m| m.get("sample")),
            Some(&MetadataValue::from("B"))
        );
    }

    #[test]
    fn in_memory_sources_are_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.parquet");
        write_parquet(&path, &[vec![1.0, 2.0]], &[vec![5.0, 6.0]], &["only"]);
        let bytes = std::fs::read(&path).unwrap();

        let mut source = SourceHandle::from_bytes(bytes);
        let sp = ParquetDecoder.decode(&mut source).unwrap();
        assert_eq!(sp.amplitudes(), &[vec![5.0, 6.0]]);
    }

    #[test]
    fn cut_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.parquet");
        write_parquet(&path, &[vec![1.0, 2.0]], &[vec![5.0, 6.0]], &["only"]);
        let bytes = std::fs::read(&path).unwrap();

        let mut source = SourceHandle::from_bytes(&bytes[..bytes.len() / 2]);
        let err = ParquetDecoder.decode(&mut source).unwrap_err().into_error("PARQUET");
        assert!(matches!(err, Error::Decode { .. }), "{err}");
    }

    #[test]
    fn float32_lists_widen_and_other_cells_become_text() {
        let mut builder = ListBuilder::new(Float32Builder::new());
        builder.values().append_slice(&[1.5, 2.5]);
        builder.append(true);
        let floats: ArrayRef = Arc::new(builder.finish());
        assert_eq!(number_list(&floats, 0).unwrap(), vec![1.5, 2.5]);

        let ints: ArrayRef = Arc::new(Int32Array::from(vec![Some(7), None]));
        assert_eq!(cell_value(&ints, 0), MetadataValue::Integer(7));
        assert_eq!(cell_value(&ints, 1), MetadataValue::Null);
        assert!(number_list(&ints, 0).is_err());

        let dates: ArrayRef = Arc::new(Date32Array::from(vec![0]));
        assert_eq!(cell_value(&dates, 0), MetadataValue::from("1970-01-01"));
    }

    #[test]
    fn probe_needs_the_magic() {
        assert!(ParquetDecoder.probe(b"PAR1\x15\x04", None));
        assert!(!ParquetDecoder.probe(b"PEPE", Some(".parquet")));
    }
}
