//! In-memory labelled datasets
//!
//! A [`Dataset`] is what a [`DatasetLoader`] hands back for one file: named
//! data fields with their dimension names and attributes, one-dimensional
//! coordinates and global attributes. Missing values are stored as `NaN`.

use crate::errors::{CmipScanError, Result};
use indexmap::IndexMap;
use ndarray::ArrayD;
use std::path::{Path, PathBuf};

/// Name of the time dimension and coordinate
pub const TIME_DIM: &str = "time";

/// Attribute value as read from a file
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Strs(Vec<String>),
    Num(f64),
    Nums(Vec<f64>),
}

impl AttrValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Num(v) => Some(*v),
            AttrValue::Nums(vs) if vs.len() == 1 => Some(vs[0]),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Num(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        AttrValue::Strs(value)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(value: Vec<f64>) -> Self {
        AttrValue::Nums(value)
    }
}

/// Attributes in file order
pub type Attributes = IndexMap<String, AttrValue>;

/// A named n-dimensional field
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    pub name: String,
    pub dims: Vec<String>,
    pub data: ArrayD<f64>,
    pub attributes: Attributes,
}

impl DataArray {
    /// Create a field, checking that every axis has a dimension name
    pub fn new<S: Into<String>>(name: S, dims: Vec<String>, data: ArrayD<f64>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(CmipScanError::ShapeMismatch {
                expected: vec![dims.len()],
                found: vec![data.ndim()],
            });
        }
        Ok(Self {
            name: name.into(),
            dims,
            data,
            attributes: Attributes::new(),
        })
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    #[must_use]
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Axis index of `dim`, or [`CmipScanError::DimensionNotFound`]
    pub fn require_axis(&self, dim: &str) -> Result<usize> {
        self.axis_of(dim)
            .ok_or_else(|| CmipScanError::DimensionNotFound {
                var: self.name.clone(),
                dim: dim.to_string(),
            })
    }
}

/// A one-dimensional coordinate such as `time`
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub values: Vec<f64>,
    pub attributes: Attributes,
}

impl Coordinate {
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            attributes: Attributes::new(),
        }
    }

    #[must_use]
    pub fn with_attribute<V: Into<AttrValue>>(mut self, name: &str, value: V) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn units(&self) -> Option<&str> {
        self.attributes.get("units").and_then(AttrValue::as_str)
    }

    #[must_use]
    pub fn calendar(&self) -> Option<&str> {
        self.attributes.get("calendar").and_then(AttrValue::as_str)
    }

    /// Same values expressed in the same units and calendar
    #[must_use]
    pub fn is_compatible(&self, other: &Coordinate) -> bool {
        self.values == other.values
            && self.units() == other.units()
            && self.calendar() == other.calendar()
    }
}

/// Everything loaded from one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    /// Where the dataset was loaded from
    pub path: Option<PathBuf>,
    pub variables: IndexMap<String, DataArray>,
    pub coordinates: IndexMap<String, Coordinate>,
    pub attributes: Attributes,
}

impl Dataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_attribute<V: Into<AttrValue>>(mut self, name: &str, value: V) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Add or replace a field, keyed by its name
    pub fn insert_variable(&mut self, array: DataArray) {
        self.variables.insert(array.name.clone(), array);
    }

    pub fn insert_coordinate<S: Into<String>>(&mut self, name: S, coordinate: Coordinate) {
        self.coordinates.insert(name.into(), coordinate);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Result<&DataArray> {
        self.variables
            .get(name)
            .ok_or_else(|| CmipScanError::VariableNotFound {
                var: name.to_string(),
            })
    }

    #[must_use]
    pub fn coordinate(&self, name: &str) -> Option<&Coordinate> {
        self.coordinates.get(name)
    }

    /// A global attribute that must be a string
    pub fn string_attribute(&self, name: &str) -> Result<&str> {
        self.attributes
            .get(name)
            .and_then(AttrValue::as_str)
            .ok_or_else(|| CmipScanError::AttributeNotFound {
                name: name.to_string(),
            })
    }

    /// The `variable_id` global attribute
    pub fn variable_id(&self) -> Result<&str> {
        self.string_attribute("variable_id")
    }

    /// The `file` global attribute naming the file the data was derived from
    pub fn source_file(&self) -> Result<&str> {
        self.string_attribute("file")
    }

    /// The `path` global attribute, falling back to where the dataset was loaded from
    #[must_use]
    pub fn recorded_path(&self) -> Option<PathBuf> {
        self.attributes
            .get("path")
            .and_then(AttrValue::as_str)
            .map(PathBuf::from)
            .or_else(|| self.path.clone())
    }
}

/// Source of datasets
///
/// Implementations must be shareable between threads so that independent
/// files can be loaded in parallel.
pub trait DatasetLoader: Send + Sync {
    /// Load the dataset stored at `path`
    fn load(&self, path: &Path) -> Result<Dataset>;
}
