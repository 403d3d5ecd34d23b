/// Built-in decoders.
///
/// Each submodule provides one [`Decoder`](crate::format::Decoder) and a
/// `descriptor()` constructor. [`builtin_formats`] lists them in the
/// priority order used by the default registry:
///
/// ```text
///   CSV      .csv            exported table: label column + one column per wavelength
///   JSON     .json           records with "x" / "y" arrays plus metadata keys
///   PARQUET  .parquet .pq    "x" / "y" list columns plus metadata columns
///   FSM      .fsm            Perkin Elmer Spotlight IR binary ("PEPE" signature)
/// ```
pub mod csv;
pub mod fsm;
pub mod json;
pub mod parquet;

use crate::format::FormatDescriptor;

pub fn builtin_formats() -> Vec<FormatDescriptor> {
    vec![
        csv::descriptor(),
        json::descriptor(),
        parquet::descriptor(),
        fsm::descriptor(),
    ]
}
