//! Writes synthetic IR spectra in every readable format:
//!
//! ```text
//! <out>/sample_data.parquet   30 spectra, x / y list columns + metadata columns
//! <out>/sample_data.json      same rows, records layout
//! <out>/sample_data.csv       same rows, exported table layout
//! <out>/sample_map.fsm        same rows as a Spotlight map
//! <out>/batch/scan_NN.json    one spectrum per file, axes drifting by < 0.01
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, Float64Builder, Int64Array, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use parquet::arrow::ArrowWriter;
use serde_json::json;

use spectro_io::{Metadata, Spectrum, SpectrumMeta};

#[derive(Parser)]
#[command(name = "generate_sample")]
#[command(about = "Write synthetic spectra in every supported format")]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "sample_data")]
    out_dir: PathBuf,

    /// Seed of the noise generator
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Wavenumbers 4000 → 2002, step 2, as stored by the instruments.
const FIRST_WAVENUMBER: f64 = 4000.0;
const STEP: f64 = -2.0;
const POINTS: usize = 1000;

struct Row {
    y: Vec<f64>,
    sample: &'static str,
    concentration: f64,
    operator: &'static str,
    id: i64,
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

fn synthesize(wavenumbers: &[f64], peaks: &[(f64, f64, f64)], noise: f64, rng: &mut Xoshiro) -> Vec<f64> {
    wavenumbers
        .iter()
        .map(|&wn| {
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wn, mu, sigma, amp))
                .sum();
            signal + rng.gauss(0.0, noise)
        })
        .collect()
}

/// Deterministic xoshiro256** generator.
struct Xoshiro {
    state: [u64; 4],
}

impl Xoshiro {
    fn new(seed: u64) -> Self {
        let mut state = [0u64; 4];
        let mut x = seed;
        for slot in &mut state {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        Xoshiro { state }
    }

    fn next_u64(&mut self) -> u64 {
        let s = &mut self.state;
        let result = s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = s[1] << 17;
        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];
        s[2] ^= t;
        s[3] = s[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

fn generate_rows(wavenumbers: &[f64], rng: &mut Xoshiro) -> Vec<Row> {
    let samples: [(&str, [(f64, f64, f64); 3]); 3] = [
        ("Sample_A", [(3400.0, 80.0, 0.8), (2900.0, 40.0, 0.5), (2350.0, 30.0, 0.3)]),
        ("Sample_B", [(3200.0, 60.0, 0.6), (2800.0, 50.0, 0.7), (2500.0, 35.0, 0.4)]),
        ("Sample_C", [(3600.0, 70.0, 0.9), (3000.0, 45.0, 0.4), (2200.0, 25.0, 0.5)]),
    ];
    let concentrations = [0.1, 0.5, 1.0, 2.0, 5.0];
    let operators = ["Alice", "Bob"];

    let mut rows = Vec::new();
    for (sample, base) in &samples {
        for &concentration in &concentrations {
            let peaks: Vec<(f64, f64, f64)> = base
                .iter()
                .map(|&(mu, sigma, amp)| (mu, sigma, amp * concentration))
                .collect();
            for &operator in &operators {
                rows.push(Row {
                    y: synthesize(wavenumbers, &peaks, 0.005 * concentration, rng),
                    sample,
                    concentration,
                    operator,
                    id: rows.len() as i64,
                });
            }
        }
    }
    rows
}

fn write_parquet(path: &Path, wavenumbers: &[f64], rows: &[Row]) -> Result<()> {
    let mut x_builder = ListBuilder::new(Float64Builder::new());
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        x_builder.values().append_slice(wavenumbers);
        x_builder.append(true);
        y_builder.values().append_slice(&row.y);
        y_builder.append(true);
    }

    let list = DataType::List(Arc::new(Field::new("item", DataType::Float64, true)));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", list.clone(), false),
        Field::new("y", list, false),
        Field::new("sample", DataType::Utf8, false),
        Field::new("concentration", DataType::Float64, false),
        Field::new("operator", DataType::Utf8, false),
        Field::new("measurement_id", DataType::Int64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(x_builder.finish()),
        Arc::new(y_builder.finish()),
        Arc::new(StringArray::from(rows.iter().map(|r| r.sample).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.concentration).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.operator).collect::<Vec<_>>())),
        Arc::new(Int64Array::from(rows.iter().map(|r| r.id).collect::<Vec<_>>())),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_json(path: &Path, wavenumbers: &[f64], rows: &[Row]) -> Result<()> {
    let records: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| {
            json!({
                "x": wavenumbers,
                "y": r.y,
                "sample": r.sample,
                "concentration": r.concentration,
                "operator": r.operator,
                "measurement_id": r.id,
            })
        })
        .collect();
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(file, &records).context("writing JSON")?;
    Ok(())
}

fn write_csv(path: &Path, wavenumbers: &[f64], rows: &[Row]) -> Result<()> {
    let metas = rows
        .iter()
        .map(|r| {
            let label = format!("{}_{}_{}.spc", r.sample, r.concentration, r.operator);
            [("filename", label)].into_iter().collect::<Metadata>()
        })
        .collect();
    let spectrum = Spectrum::with_ascending_axis(
        rows.iter().map(|r| r.y.clone()).collect(),
        wavenumbers.to_vec(),
        SpectrumMeta::PerRow(metas),
    )?;
    spectrum.to_csv(path)?;
    Ok(())
}

/// A minimal Spotlight file: signature, description, 5100 geometry,
/// 5104 analyst / date fields and one 5105 block per spectrum.
fn write_fsm(path: &Path, rows: &[Row]) -> Result<()> {
    fn block(out: &mut Vec<u8>, id: u16, data: &[u8]) {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(data.len() as i32).to_le_bytes());
        out.extend_from_slice(data);
    }
    fn text(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(b"#u");
        out.extend_from_slice(&(s.len() as i16).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
        out.extend_from_slice(&[0; 6]);
    }

    let last = FIRST_WAVENUMBER + STEP * (POINTS - 1) as f64;
    let name = b"sample_map";
    let mut geometry = (name.len() as i16).to_le_bytes().to_vec();
    geometry.extend_from_slice(name);
    for v in [25.0, 25.0, STEP, FIRST_WAVENUMBER, last, 0.0, 0.0, 0.0, 0.0, FIRST_WAVENUMBER] {
        geometry.extend_from_slice(&f64::to_le_bytes(v));
    }
    for v in [6i32, 5, POINTS as i32] {
        geometry.extend_from_slice(&v.to_le_bytes());
    }
    for (short, byte) in [(0i16, 0u8), (0, 0), (4, 0), (1, 0)] {
        geometry.extend_from_slice(&short.to_le_bytes());
        geometry.push(byte);
    }

    let mut fields = Vec::new();
    text(&mut fields, "generate_sample");
    text(&mut fields, "");
    text(&mut fields, "2024-01-01");

    let mut out = b"PEPE".to_vec();
    let mut description = b"synthetic spotlight map".to_vec();
    description.resize(40, 0);
    out.extend_from_slice(&description);
    block(&mut out, 5100, &geometry);
    block(&mut out, 5104, &fields);
    for row in rows {
        let data: Vec<u8> = row.y.iter().flat_map(|&v| (v as f32).to_le_bytes()).collect();
        block(&mut out, 5105, &data);
    }
    fs::write(path, out).with_context(|| format!("writing {}", path.display()))
}

/// One file per row, each axis shifted by a different amount below 0.01.
fn write_batch(dir: &Path, wavenumbers: &[f64], rows: &[Row]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for (i, row) in rows.iter().enumerate().take(10) {
        let shift = 0.001 * i as f64;
        let x: Vec<f64> = wavenumbers.iter().map(|w| w + shift).collect();
        let doc = json!([{ "x": x, "y": row.y, "sample": row.sample }]);
        let path = dir.join(format!("scan_{i:02}.json"));
        fs::write(&path, doc.to_string()).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = Xoshiro::new(args.seed);

    let wavenumbers: Vec<f64> = (0..POINTS)
        .map(|i| FIRST_WAVENUMBER + i as f64 * STEP)
        .collect();
    let rows = generate_rows(&wavenumbers, &mut rng);

    let out = &args.out_dir;
    fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    write_parquet(&out.join("sample_data.parquet"), &wavenumbers, &rows)?;
    write_json(&out.join("sample_data.json"), &wavenumbers, &rows)?;
    write_csv(&out.join("sample_data.csv"), &wavenumbers, &rows)?;
    write_fsm(&out.join("sample_map.fsm"), &rows)?;
    write_batch(&out.join("batch"), &wavenumbers, &rows)?;

    println!(
        "Wrote {} spectra ({} wavenumbers each) to {}",
        rows.len(),
        wavenumbers.len(),
        out.display()
    );
    Ok(())
}
