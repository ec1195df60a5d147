//! NetCDF reading into [`Dataset`]s and writing of merged results
//!
//! Every numeric variable is read as `f64` with `_FillValue`/`missing_value`
//! replaced by `NaN`. One-dimensional variables named after their own
//! dimension (`time`, `lat`, `lon`, ...) become coordinates.

use crate::dataset::{
    AttrValue, Attributes, Coordinate, DataArray, Dataset, DatasetLoader, TIME_DIM,
};
use crate::errors::{CmipScanError, Result};
use crate::merger::{MergedDataset, CELL_AREA, GLOBAL_MASK};
use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, warn};
use ndarray::{ArrayD, IxDyn};
use netcdf::{create, AttributeValue, File, FileMut};
use std::{fs, path::Path, path::PathBuf};

/// File read when a loader is pointed at a folder
pub const DEFAULT_FILE_NAME: &str = "merged.nc";

/// Loads datasets from NetCDF files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetCDFLoader {
    file_name: String,
}

impl Default for NetCDFLoader {
    fn default() -> Self {
        Self::new(DEFAULT_FILE_NAME)
    }
}

impl NetCDFLoader {
    /// Loader reading `file_name` inside any folder it is given
    #[must_use]
    pub fn new<S: Into<String>>(file_name: S) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// The file a path refers to; folders get the configured file name appended
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(&self.file_name)
        } else {
            path.to_path_buf()
        }
    }
}

impl DatasetLoader for NetCDFLoader {
    fn load(&self, path: &Path) -> Result<Dataset> {
        let file_path = self.resolve(path);
        debug!("Loading {}", file_path.display());
        let file = netcdf::open(&file_path)?;
        read_dataset(&file, &file_path)
    }
}

fn convert_attribute(value: AttributeValue) -> Option<AttrValue> {
    let converted = match value {
        AttributeValue::Str(s) => AttrValue::Str(s),
        AttributeValue::Strs(s) => AttrValue::Strs(s),
        AttributeValue::Double(v) => AttrValue::Num(v),
        AttributeValue::Doubles(v) => AttrValue::Nums(v),
        AttributeValue::Float(v) => AttrValue::Num(f64::from(v)),
        AttributeValue::Floats(v) => AttrValue::Nums(v.into_iter().map(f64::from).collect()),
        AttributeValue::Int(v) => AttrValue::Num(f64::from(v)),
        AttributeValue::Ints(v) => AttrValue::Nums(v.into_iter().map(f64::from).collect()),
        AttributeValue::Short(v) => AttrValue::Num(f64::from(v)),
        AttributeValue::Shorts(v) => AttrValue::Nums(v.into_iter().map(f64::from).collect()),
        _ => return None,
    };
    Some(converted)
}

fn read_attributes<'a, I>(attributes: I, owner: &str) -> Attributes
where
    I: Iterator<Item = netcdf::Attribute<'a>>,
{
    let mut converted = Attributes::new();
    for attr in attributes {
        match attr.value().ok().and_then(convert_attribute) {
            Some(value) => {
                converted.insert(attr.name().to_string(), value);
            }
            None => warn!("Skipped unsupported attribute type for '{}' of {owner}", attr.name()),
        }
    }
    converted
}

/// Read every numeric variable of an open file.
///
/// `path` is recorded as the dataset's location. When the file carries no
/// `file` or `path` global attribute they are filled in from `path`.
///
/// # Errors
///
/// Fails if the data of a variable does not match its dimensions.
pub fn read_dataset(file: &File, path: &Path) -> Result<Dataset> {
    let mut dataset = Dataset::new().with_path(path);
    dataset.attributes = read_attributes(file.attributes(), "the file");

    for var in file.variables() {
        let name = var.name().to_string();
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let mut values = match var.get_values::<f64, _>(..) {
            Ok(values) => values,
            Err(e) => {
                warn!("Skipping '{name}', not readable as numbers: {e}");
                continue;
            }
        };
        let attributes = read_attributes(var.attributes(), &name);
        let missing: Vec<f64> = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|key| attributes.get(*key).and_then(AttrValue::as_f64))
            .collect();
        if !missing.is_empty() {
            for value in &mut values {
                if missing.contains(value) {
                    *value = f64::NAN;
                }
            }
        }

        if dims.len() == 1 && dims[0] == name {
            let mut coordinate = Coordinate::new(values);
            coordinate.attributes = attributes;
            dataset.insert_coordinate(name, coordinate);
            continue;
        }

        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
        dataset.insert_variable(DataArray::new(name, dims, data)?.with_attributes(attributes));
    }

    if !dataset.attributes.contains_key("file") {
        let file_name = path.to_string_lossy().into_owned();
        dataset.attributes.insert("file".to_string(), AttrValue::Str(file_name));
    }
    if !dataset.attributes.contains_key("path") {
        if let Some(folder) = path.parent() {
            let folder = folder.to_string_lossy().into_owned();
            dataset.attributes.insert("path".to_string(), AttrValue::Str(folder));
        }
    }
    Ok(dataset)
}

fn put_attributes(var: &mut netcdf::VariableMut<'_>, attributes: &Attributes) -> Result<()> {
    for (name, value) in attributes {
        match value {
            AttrValue::Str(v) => var.put_attribute(name, v.as_str())?,
            AttrValue::Strs(v) => var.put_attribute(name, v.clone())?,
            AttrValue::Num(v) => var.put_attribute(name, *v)?,
            AttrValue::Nums(v) => var.put_attribute(name, v.clone())?,
        };
    }
    Ok(())
}

/// Add missing dimensions and check the length of existing ones
fn ensure_dimensions(
    file: &mut FileMut,
    known: &mut IndexMap<String, usize>,
    dims: &[String],
    shape: &[usize],
) -> Result<()> {
    for (dim, &len) in dims.iter().zip(shape) {
        match known.get(dim) {
            Some(&existing) if existing != len => {
                return Err(CmipScanError::ShapeMismatch {
                    expected: vec![existing],
                    found: vec![len],
                });
            }
            Some(_) => {}
            None => {
                file.add_dimension(dim, len)?;
                known.insert(dim.clone(), len);
            }
        }
    }
    Ok(())
}

fn add_field(
    file: &mut FileMut,
    known: &mut IndexMap<String, usize>,
    array: &DataArray,
) -> Result<()> {
    ensure_dimensions(file, known, &array.dims, array.shape())?;
    let dim_refs: Vec<&str> = array.dims.iter().map(String::as_str).collect();
    let mut var = file.add_variable::<f64>(&array.name, &dim_refs)?;
    var.put(array.data.view(), ..)?;
    put_attributes(&mut var, &array.attributes)
}

/// Write a merged dataset to `output_path`, replacing any existing file
///
/// The mask is stored as `u8` (1 = selected). Provenance lists become global
/// string-array attributes; empty lists are left out.
pub fn write_merged_dataset(merged: &MergedDataset, output_path: &Path) -> Result<()> {
    if output_path.exists() {
        fs::remove_file(output_path)?;
    }
    let mut file = create(output_path)?;
    let mut known = IndexMap::new();

    let mask = merged.global_mask();
    ensure_dimensions(&mut file, &mut known, mask.dims(), mask.shape())?;
    {
        let dim_refs: Vec<&str> = mask.dims().iter().map(String::as_str).collect();
        let mut var = file.add_variable::<u8>(GLOBAL_MASK, &dim_refs)?;
        let as_bytes = mask.data().mapv(u8::from);
        var.put(as_bytes.view(), ..)?;
    }

    let cell_area = merged.cell_area();
    add_field(&mut file, &mut known, cell_area)?;
    if cell_area.name != CELL_AREA {
        warn!("cell_area was stored as '{}'", cell_area.name);
    }

    if let Some(time) = merged.time() {
        ensure_dimensions(&mut file, &mut known, &[TIME_DIM.to_string()], &[time.len()])?;
        let mut var = file.add_variable::<f64>(TIME_DIM, &[TIME_DIM])?;
        var.put_values(&time.values, ..)?;
        put_attributes(&mut var, &time.attributes)?;
    }

    for array in merged.variables().values() {
        add_field(&mut file, &mut known, array)?;
    }

    let provenance = merged.provenance();
    for (name, values) in [
        ("variables", &provenance.variables),
        ("source_files", &provenance.source_files),
        ("mask_files", &provenance.mask_files),
        ("paths", &provenance.paths),
        ("other_paths", &provenance.other_paths),
    ] {
        if !values.is_empty() {
            file.add_attribute(name, values.clone())?;
        }
    }
    file.add_attribute(
        "history",
        format!("Created by cmip-scan on {}", Utc::now().to_rfc3339()),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_attribute() {
        assert_eq!(
            convert_attribute(AttributeValue::Str("K".to_string())),
            Some(AttrValue::Str("K".to_string()))
        );
        assert_eq!(
            convert_attribute(AttributeValue::Float(1.5)),
            Some(AttrValue::Num(1.5))
        );
        assert_eq!(
            convert_attribute(AttributeValue::Shorts(vec![1, 2])),
            Some(AttrValue::Nums(vec![1.0, 2.0]))
        );
    }

    #[test]
    fn test_resolve_folder() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let loader = NetCDFLoader::default();
        assert_eq!(loader.resolve(dir.path()), dir.path().join("merged.nc"));
        let file = dir.path().join("other.nc");
        assert_eq!(loader.resolve(&file), file);
    }
}
