//! Read spectroscopic data files into one uniform [`Spectrum`] type.
//!
//! ```no_run
//! use spectro_io::{read_glob, specread, BatchRead, Tolerance};
//!
//! # fn main() -> spectro_io::Result<()> {
//! let map = specread("scans/map01.fsm", None)?;
//! println!("{} spectra over {} wavelengths", map.len(), map.wavelength().len());
//!
//! if let BatchRead::Combined(all) = read_glob("scans/*.csv", None, Some(Tolerance::Absolute(0.05)))? {
//!     all.to_csv("combined.csv")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod format;
pub mod functions;
pub mod plugins;
pub mod reader;
pub mod registry;
pub mod source;

pub use aggregate::{aggregate, Tolerance};
pub use data::model::{Metadata, MetadataValue, Spectrum, SpectrumError, SpectrumMeta};
pub use error::{DecodeError, Error, Result};
pub use export::write_csv;
pub use format::{Decoder, FormatDescriptor};
pub use functions::{get_reader, read_glob, specread, BatchRead};
pub use reader::Reader;
pub use registry::{default_registry, FormatRegistry, SIGNATURE_WINDOW};
pub use source::{Origin, SourceHandle};
