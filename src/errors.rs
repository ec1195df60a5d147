//! Centralized error handling for cmip_scan
//!
//! All fallible operations in the crate return [`Result`], whose error type is
//! [`CmipScanError`]. Variants are grouped the way callers need to react to them:
//! input mistakes, malformed folder layouts, missing data and internal
//! consistency failures.

use std::fmt;
use std::path::PathBuf;

/// Main error type for cmip_scan operations
#[derive(Debug)]
pub enum CmipScanError {
    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// Malformed glob pattern built from a query
    PatternError(glob::PatternError),

    /// Configuration file could not be parsed
    ConfigError(toml::de::Error),

    /// Caller supplied arguments that cannot be acted on
    InvalidInput { message: String },

    /// Requested mask merge method does not exist
    UnimplementedMethod { method: String },

    /// Path does not follow the expected folder layout
    Format { path: PathBuf, message: String },

    /// Search exhausted without finding anything
    NotFound { message: String },

    /// Result set broke an invariant that should always hold
    Consistency { message: String },

    /// Variable not found in a dataset
    VariableNotFound { var: String },

    /// Dimension not found in variable
    DimensionNotFound { var: String, dim: String },

    /// Dataset lacks a required global attribute
    AttributeNotFound { name: String },

    /// Field cannot be used as a 2-D boolean mask
    InvalidMask { field: String, message: String },

    /// Two arrays that must line up do not
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// Sources disagree on their time axis
    TimeAxisMismatch { var: String, message: String },

    /// None of the mask paths produced a mask
    MissingMask,

    /// Thread pool configuration errors
    ThreadPoolError(String),

    /// Generic error for conversions from strings
    Generic(String),
}

impl fmt::Display for CmipScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmipScanError::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            CmipScanError::IoError(e) => write!(f, "I/O error: {}", e),
            CmipScanError::ArrayError(e) => write!(f, "Array error: {}", e),
            CmipScanError::PatternError(e) => write!(f, "Invalid search pattern: {}", e),
            CmipScanError::ConfigError(e) => write!(f, "Invalid configuration: {}", e),
            CmipScanError::InvalidInput { message } => write!(f, "Invalid input: {}", message),
            CmipScanError::UnimplementedMethod { method } => {
                write!(f, "No such method as {}", method)
            }
            CmipScanError::Format { path, message } => {
                write!(f, "Unexpected folder format for {}: {}", path.display(), message)
            }
            CmipScanError::NotFound { message } => write!(f, "{}", message),
            CmipScanError::Consistency { message } => {
                write!(f, "Internal consistency error: {}", message)
            }
            CmipScanError::VariableNotFound { var } => {
                write!(f, "Variable '{}' not found in dataset", var)
            }
            CmipScanError::DimensionNotFound { var, dim } => {
                write!(f, "Dimension '{}' not found in variable '{}'", dim, var)
            }
            CmipScanError::AttributeNotFound { name } => {
                write!(f, "Attribute '{}' not found in dataset", name)
            }
            CmipScanError::InvalidMask { field, message } => {
                write!(f, "Field '{}' is not a valid mask: {}", field, message)
            }
            CmipScanError::ShapeMismatch { expected, found } => write!(
                f,
                "Shape mismatch: expected {:?}, found {:?}",
                expected, found
            ),
            CmipScanError::TimeAxisMismatch { var, message } => {
                write!(f, "Incompatible time axis for '{}': {}", var, message)
            }
            CmipScanError::MissingMask => write!(f, "No mask could be derived from the mask paths"),
            CmipScanError::ThreadPoolError(msg) => write!(f, "Thread pool error: {}", msg),
            CmipScanError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CmipScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CmipScanError::NetCDFError(e) => Some(e),
            CmipScanError::IoError(e) => Some(e),
            CmipScanError::ArrayError(e) => Some(e),
            CmipScanError::PatternError(e) => Some(e),
            CmipScanError::ConfigError(e) => Some(e),
            _ => None,
        }
    }
}

impl CmipScanError {
    pub(crate) fn format<P: Into<PathBuf>, S: ToString>(path: P, message: S) -> Self {
        CmipScanError::Format {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn invalid_input<S: ToString>(message: S) -> Self {
        CmipScanError::InvalidInput {
            message: message.to_string(),
        }
    }
}

impl From<netcdf::Error> for CmipScanError {
    fn from(error: netcdf::Error) -> Self {
        CmipScanError::NetCDFError(error)
    }
}

impl From<std::io::Error> for CmipScanError {
    fn from(error: std::io::Error) -> Self {
        CmipScanError::IoError(error)
    }
}

impl From<ndarray::ShapeError> for CmipScanError {
    fn from(error: ndarray::ShapeError) -> Self {
        CmipScanError::ArrayError(error)
    }
}

impl From<glob::PatternError> for CmipScanError {
    fn from(error: glob::PatternError) -> Self {
        CmipScanError::PatternError(error)
    }
}

impl From<toml::de::Error> for CmipScanError {
    fn from(error: toml::de::Error) -> Self {
        CmipScanError::ConfigError(error)
    }
}

impl From<String> for CmipScanError {
    fn from(error: String) -> Self {
        CmipScanError::Generic(error)
    }
}

impl From<&str> for CmipScanError {
    fn from(error: &str) -> Self {
        CmipScanError::Generic(error.to_string())
    }
}

/// Result type alias for cmip_scan operations
pub type Result<T> = std::result::Result<T, CmipScanError>;
