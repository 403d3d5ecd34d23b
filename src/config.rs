//! Settings for the `convert` command, read from an optional TOML file.
//!
//! ```toml
//! tolerance = 0.05
//! relative = false
//! format = "FSM"
//! log_level = "info"
//! ```
//!
//! Every key is optional. Command line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::aggregate::Tolerance;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Largest wavelength deviation accepted when stacking files.
    pub tolerance: f64,
    /// Interpret `tolerance` as a fraction of each reference wavelength.
    pub relative: bool,
    /// Format name forced on every input instead of probing.
    pub format: Option<String>,
    /// `env_logger` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        ConvertConfig {
            tolerance: 0.0,
            relative: false,
            format: None,
            log_level: "warn".to_string(),
        }
    }
}

impl ConvertConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: ConvertConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("parse TOML failed: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {} failed: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// An explicit file must exist; otherwise the per-user file is used
    /// when present, and built-in defaults when not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_toml_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_toml_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn tolerance(&self) -> Tolerance {
        if self.relative {
            Tolerance::Relative(self.tolerance)
        } else {
            Tolerance::Absolute(self.tolerance)
        }
    }

    pub fn validate(&self) -> Result<()> {
        // NaN fails this too.
        if !(self.tolerance >= 0.0) {
            return Err(Error::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// `<config dir>/spectro-io/config.toml`, e.g. `~/.config/spectro-io/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("spectro-io").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = ConvertConfig::from_toml_str("tolerance = 0.5\n").unwrap();
        assert_eq!(config.tolerance(), Tolerance::Absolute(0.5));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.format, None);
    }

    #[test]
    fn relative_mode() {
        let config = ConvertConfig::from_toml_str("tolerance = 1e-4\nrelative = true\n").unwrap();
        assert_eq!(config.tolerance(), Tolerance::Relative(1e-4));
    }

    #[test]
    fn rejects_bad_values_and_unknown_keys() {
        assert!(matches!(
            ConvertConfig::from_toml_str("tolerance = -1.0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ConvertConfig::from_toml_str("tolerence = 1.0\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("convert.toml");
        std::fs::write(&path, "format = \"FSM\"\nlog_level = \"debug\"\n").unwrap();
        let config = ConvertConfig::load(Some(&path)).unwrap();
        assert_eq!(config.format.as_deref(), Some("FSM"));
        assert_eq!(config.log_level, "debug");

        assert!(ConvertConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
