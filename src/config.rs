//! Runtime configuration
//!
//! Configuration is read once per process from a TOML file and then passed by
//! reference to the components that need it. The file is chosen in this order:
//! an explicit path, the file named by the `CMIP_SCAN_CONFIG` environment
//! variable, or the built-in defaults when neither is given.
//!
//! ```toml
//! [cmip_files]
//! required_file = "merged.nc"
//! excluded = """
//! CMIP * AWI-ESM-1-1-LR * * * * * *
//! """
//!
//! [analyze]
//! lon_lat_dim = "lon,lat"
//!
//! [log]
//! logging_level = "info"
//! ```

use crate::errors::{CmipScanError, Result};
use crate::matches::ExclusionList;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable pointing to a configuration file
pub const CONFIG_ENV_VAR: &str = "CMIP_SCAN_CONFIG";

/// Complete configuration for one process run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cmip_files: CmipFilesConfig,
    pub analyze: AnalyzeConfig,
    pub log: LogConfig,
}

/// Settings for discovering files on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmipFilesConfig {
    /// Newline separated folder-suffix patterns, each whitespace separated into folders
    pub excluded: String,
    /// File every accepted leaf folder must contain; empty disables the check
    pub required_file: String,
}

impl Default for CmipFilesConfig {
    fn default() -> Self {
        Self {
            excluded: String::new(),
            required_file: "merged.nc".to_string(),
        }
    }
}

/// Settings for reductions over the merged variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeConfig {
    /// Comma separated names of the spatial dimensions averaged over
    pub lon_lat_dim: String,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            lon_lat_dim: "lon,lat".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub logging_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            logging_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(p: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(p)?;
        Self::from_toml_str(&text)
    }

    /// Resolve the configuration for this process.
    ///
    /// An explicit path wins over `CMIP_SCAN_CONFIG`; without either the
    /// defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_toml_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_toml_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CmipScanError::Generic(format!("could not serialize configuration: {e}")))
    }

    /// Parsed `[cmip_files] excluded` patterns
    pub fn exclusions(&self) -> Result<ExclusionList> {
        ExclusionList::parse(&self.cmip_files.excluded)
    }

    /// The required file, or `None` when the check is disabled
    #[must_use]
    pub fn required_file(&self) -> Option<String> {
        let name = self.cmip_files.required_file.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    /// Spatial dimension names, in the order they are configured
    #[must_use]
    pub fn lon_lat_dims(&self) -> Vec<String> {
        self.analyze
            .lon_lat_dim
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Log level from the `[log]` section, `Info` if unrecognised
    #[must_use]
    pub fn log_level(&self) -> log::LevelFilter {
        self.log
            .logging_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}
