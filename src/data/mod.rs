/// Data layer: the uniform in-memory representation every decoder produces.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet / .fsm / bytes / URL
///        │
///        ▼
///   ┌──────────────┐
///   │ SourceHandle  │  cached prefix, lazy full read, temp copy
///   └──────────────┘
///        │  registry.resolve(): extension + 256-byte probe
///        ▼
///   ┌──────────────┐
///   │    Reader     │  decoder.decode() → Spectrum
///   └──────────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │   Spectrum    │  N × W amplitudes, ascending axis, metadata
///   └──────────────┘
///        │  several files
///        ▼
///   ┌──────────────┐
///   │  aggregate    │  tolerance check against the first axis
///   └──────────────┘
/// ```

pub mod model;
