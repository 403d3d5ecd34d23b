//! spectro-io CLI: convert spectroscopic files to CSV.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};

use spectro_io::config::ConvertConfig;
use spectro_io::functions::is_pattern;
use spectro_io::source::is_url;
use spectro_io::{aggregate, default_registry, read_glob, specread, Spectrum};

#[derive(Parser)]
#[command(name = "spectro-io")]
#[command(about = "Input/output for spectroscopic files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a file, or every file matching a wildcard, to CSV
    Convert {
        /// Input path, URL or wildcard pattern (quote it to keep the shell off it)
        input: String,

        /// Output file. Defaults to the input with a .csv extension, or
        /// spectra.csv next to the files matched by a pattern
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Largest wavelength deviation accepted when stacking several files
        #[arg(short, long)]
        tolerance: Option<f64>,

        /// Treat the tolerance as a fraction of each wavelength
        #[arg(long)]
        relative: bool,

        /// Force a format by name instead of probing the files
        #[arg(short, long)]
        format: Option<String>,

        /// TOML file with default settings
        #[arg(long, env = "SPECTRO_IO_CONFIG")]
        config: Option<PathBuf>,
    },

    /// List the formats that can be read
    Formats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            tolerance,
            relative,
            format,
            config,
        } => {
            let mut settings = ConvertConfig::load(config.as_deref())
                .context("loading configuration")?;
            if let Some(tolerance) = tolerance {
                settings.tolerance = tolerance;
            }
            settings.relative |= relative;
            if format.is_some() {
                settings.format = format;
            }
            settings.validate()?;
            init_logging(&settings.log_level);

            let output = output.unwrap_or_else(|| default_output(&input));
            cmd_convert(&input, &output, &settings)
        }
        Commands::Formats => {
            init_logging("warn");
            print!("{}", default_registry());
            Ok(())
        }
    }
}

fn init_logging(default_level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn cmd_convert(input: &str, output: &Path, settings: &ConvertConfig) -> Result<()> {
    if !is_pattern(input) && Path::new(input) == output {
        bail!("refusing to overwrite the input {input}; pass --output");
    }
    let format = settings.format.as_deref();

    let spectrum: Spectrum = if is_pattern(input) {
        let tolerance = settings.tolerance();
        debug!("combining {input} with {tolerance:?}");
        aggregate(read_glob(input, format, None)?.into_spectra(), tolerance)?
    } else {
        specread(input, format).with_context(|| format!("reading {input}"))?
    };

    spectrum
        .to_csv(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        "{} spectra, {} wavelengths",
        spectrum.len(),
        spectrum.wavelength().len()
    );
    println!("Written {}", output.display());
    Ok(())
}

/// Where `convert` writes when no `--output` is given.
fn default_output(input: &str) -> PathBuf {
    if is_pattern(input) {
        return literal_prefix(input).join("spectra.csv");
    }
    if is_url(input) {
        let name = input
            .split(['?', '#'])
            .next()
            .and_then(|url| url.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("download");
        return Path::new(name).with_extension("csv");
    }
    let path = input.strip_prefix("file://").unwrap_or(input);
    Path::new(path).with_extension("csv")
}

/// The directories of `pattern` before its first wildcard component.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut dir = PathBuf::new();
    let components: Vec<Component> = Path::new(pattern).components().collect();
    for component in &components[..components.len().saturating_sub(1)] {
        if is_pattern(&component.as_os_str().to_string_lossy()) {
            break;
        }
        dir.push(component);
    }
    dir
}
