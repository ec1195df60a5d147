//! Merging of per-variable masks and datasets
//!
//! A [`VariableMerger`] is built from a set of mask files, each derived from
//! one variable. Their masks are folded into a single common mask, and
//! [`VariableMerger::squash_sources`] then averages every variable's source
//! data over that common region, producing one [`MergedDataset`] with a time
//! series per field.

use crate::config::Config;
use crate::dataset::{Coordinate, DataArray, Dataset, DatasetLoader, TIME_DIM};
use crate::errors::{CmipScanError, Result};
use crate::mask::Mask;
use crate::statistics::MaskedReduction;
use indexmap::IndexMap;
use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;

/// Field used as mask when a dataset has one
pub const GLOBAL_MASK: &str = "global_mask";

/// Field used as mask otherwise, and copied into the merged dataset
pub const CELL_AREA: &str = "cell_area";

/// How two masks are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    /// A cell is selected if any mask selects it
    LogicalOr,
}

impl MergeMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogicalOr => "logical_or",
        }
    }

    pub fn fold(self, common: &Mask, other: &Mask) -> Result<Mask> {
        match self {
            Self::LogicalOr => common.logical_or(other),
        }
    }
}

impl FromStr for MergeMethod {
    type Err = CmipScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "logical_or" => Ok(Self::LogicalOr),
            other => Err(CmipScanError::UnimplementedMethod {
                method: other.to_string(),
            }),
        }
    }
}

/// Fold the mask of `dataset` into `common`.
///
/// `field` defaults to `global_mask` when the dataset has it and `cell_area`
/// otherwise. Without a `common` mask the field itself, cast to boolean, is
/// returned and `merge_method` is not consulted.
///
/// # Errors
///
/// - [`CmipScanError::UnimplementedMethod`] for an unknown `merge_method`
/// - [`CmipScanError::VariableNotFound`] if the field is missing
/// - [`CmipScanError::ShapeMismatch`] if the masks differ in shape
pub fn combine_masks(
    merge_method: &str,
    common: Option<Mask>,
    dataset: &Dataset,
    field: Option<&str>,
) -> Result<Mask> {
    let field = field.unwrap_or(if dataset.contains(GLOBAL_MASK) {
        GLOBAL_MASK
    } else {
        CELL_AREA
    });
    let other = Mask::from_data_array(dataset.variable(field)?)?;
    match common {
        None => Ok(other),
        Some(common) => merge_method.parse::<MergeMethod>()?.fold(&common, &other),
    }
}

/// Where the merged variables came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeProvenance {
    /// Merged variable ids, sorted
    pub variables: Vec<String>,
    /// Source file of each entry in `variables`
    pub source_files: Vec<String>,
    /// Mask files, sorted
    pub mask_files: Vec<String>,
    /// Mask paths as requested
    pub paths: Vec<String>,
    /// Additional variable paths as requested
    pub other_paths: Vec<String>,
}

/// Variables averaged over a common mask
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDataset {
    global_mask: Mask,
    cell_area: DataArray,
    variables: IndexMap<String, DataArray>,
    time: Option<Coordinate>,
    provenance: MergeProvenance,
}

impl MergedDataset {
    #[must_use]
    pub fn global_mask(&self) -> &Mask {
        &self.global_mask
    }

    #[must_use]
    pub fn cell_area(&self) -> &DataArray {
        &self.cell_area
    }

    /// Reduced fields in the order they were produced
    #[must_use]
    pub fn variables(&self) -> &IndexMap<String, DataArray> {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Result<&DataArray> {
        self.variables
            .get(name)
            .ok_or_else(|| CmipScanError::VariableNotFound {
                var: name.to_string(),
            })
    }

    #[must_use]
    pub fn time(&self) -> Option<&Coordinate> {
        self.time.as_ref()
    }

    #[must_use]
    pub fn provenance(&self) -> &MergeProvenance {
        &self.provenance
    }
}

/// A reduced field together with the time axis of the dataset it came from
#[derive(Debug, Clone)]
struct SquashedField {
    array: DataArray,
    time: Option<Coordinate>,
}

/// Settings for a [`VariableMerger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergerOptions {
    /// Name of the mask combination method, see [`MergeMethod`]
    pub merge_method: String,
    /// Spatial dimensions averaged over, longitude first
    pub spatial_dims: Vec<String>,
}

impl Default for MergerOptions {
    fn default() -> Self {
        Self {
            merge_method: MergeMethod::LogicalOr.as_str().to_string(),
            spatial_dims: vec!["lon".to_string(), "lat".to_string()],
        }
    }
}

impl MergerOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            spatial_dims: config.lon_lat_dims(),
            ..Self::default()
        }
    }
}

/// Combines masks from several variables and averages their data over the union
pub struct VariableMerger<L: DatasetLoader> {
    loader: L,
    mask_paths: Vec<String>,
    other_paths: Vec<String>,
    options: MergerOptions,
    source_files: IndexMap<String, String>,
    common_mask: Mask,
}

impl<L: DatasetLoader> VariableMerger<L> {
    /// Load all masks and build the common mask.
    ///
    /// # Errors
    ///
    /// Fails if no mask paths are given, a file cannot be loaded or lacks the
    /// `variable_id`/`file` attributes, or the masks cannot be combined.
    pub fn new(
        loader: L,
        mask_paths: Vec<String>,
        other_paths: Vec<String>,
        options: MergerOptions,
    ) -> Result<Self> {
        if mask_paths.is_empty() {
            return Err(CmipScanError::invalid_input("no mask paths given"));
        }
        let (source_files, common_mask) =
            process_masks(&loader, &options.merge_method, &mask_paths, &other_paths)?;
        Ok(Self {
            loader,
            mask_paths,
            other_paths,
            options,
            source_files,
            common_mask,
        })
    }

    /// Variable id to source file, in first-seen order
    #[must_use]
    pub fn source_files(&self) -> &IndexMap<String, String> {
        &self.source_files
    }

    #[must_use]
    pub fn common_mask(&self) -> &Mask {
        &self.common_mask
    }

    /// [`combine_masks`] with this merger's merge method
    pub fn combine_masks(
        &self,
        common: Option<Mask>,
        dataset: &Dataset,
        field: Option<&str>,
    ) -> Result<Mask> {
        combine_masks(&self.options.merge_method, common, dataset, field)
    }

    /// Average every recorded variable over the common mask and assemble the result
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be loaded, a field lacks the spatial
    /// dimensions, the last source has no `cell_area`, or the time axes of the
    /// fields cannot be reconciled.
    pub fn squash_sources(&self) -> Result<MergedDataset> {
        let mask = self.spatial_mask()?;
        let mut fields = Vec::new();
        let mut last_source = None;
        for (variable_id, path) in &self.source_files {
            let source = self.loader.load(Path::new(path))?;
            for (name, array) in &source.variables {
                if !name.contains(variable_id.as_str()) {
                    continue;
                }
                let reduced = array.masked(&mask)?.mean_over_dims(&self.options.spatial_dims)?;
                let time = reduced
                    .axis_of(TIME_DIM)
                    .and_then(|_| source.coordinate(TIME_DIM).cloned());
                fields.push(SquashedField {
                    array: reduced,
                    time,
                });
            }
            last_source = Some(source);
        }

        // The grid is shared by all sources, so one cell_area suffices
        let cell_area = last_source
            .as_ref()
            .ok_or(CmipScanError::MissingMask)?
            .variable(CELL_AREA)?
            .clone();

        let (variables, time) = match assemble_strict(&fields) {
            Ok(assembled) => assembled,
            Err(e @ CmipScanError::TimeAxisMismatch { .. }) => {
                warn!("Ran into {e}, assigning fields one by one");
                assemble_by_field(fields)?
            }
            Err(e) => return Err(e),
        };

        Ok(MergedDataset {
            global_mask: mask,
            cell_area,
            variables,
            time,
            provenance: self.provenance(),
        })
    }

    /// The common mask labelled with the configured spatial dimensions (lat, lon)
    fn spatial_mask(&self) -> Result<Mask> {
        let [lon, lat] = self.options.spatial_dims.as_slice() else {
            return Err(CmipScanError::invalid_input(format!(
                "expected two spatial dimensions, got {:?}",
                self.options.spatial_dims
            )));
        };
        let expected = [lat.clone(), lon.clone()];
        let dims = self.common_mask.dims();
        if dims == &expected {
            return Ok(self.common_mask.clone());
        }
        if dims[0] == *lon && dims[1] == *lat {
            debug!("Transposing mask from {:?} to {:?}", dims, expected);
            return Ok(self.common_mask.transposed());
        }
        debug!(
            "Renaming mask dimensions {:?} to {:?}",
            self.common_mask.dims(),
            expected
        );
        Ok(self.common_mask.renamed(expected))
    }

    fn provenance(&self) -> MergeProvenance {
        let mut variables: Vec<String> = self.source_files.keys().cloned().collect();
        variables.sort();
        let source_files = variables
            .iter()
            .filter_map(|v| self.source_files.get(v).cloned())
            .collect();
        let mut mask_files = self.mask_paths.clone();
        mask_files.sort();
        MergeProvenance {
            variables,
            source_files,
            mask_files,
            paths: self.mask_paths.clone(),
            other_paths: self.other_paths.clone(),
        }
    }
}

/// Load all masks and fold them, recording where each variable came from.
///
/// Mask files register their variable unconditionally (last one wins); other
/// paths only register variables not seen yet and never touch the mask.
fn process_masks<L: DatasetLoader>(
    loader: &L,
    merge_method: &str,
    mask_paths: &[String],
    other_paths: &[String],
) -> Result<(IndexMap<String, String>, Mask)> {
    let mut source_files = IndexMap::new();
    let mut common_mask = None;

    let masks: Vec<Result<Dataset>> = mask_paths
        .par_iter()
        .map(|path| loader.load(Path::new(path)))
        .collect();
    for dataset in masks {
        let dataset = dataset?;
        source_files.insert(
            dataset.variable_id()?.to_string(),
            dataset.source_file()?.to_string(),
        );
        common_mask = Some(combine_masks(merge_method, common_mask, &dataset, None)?);
    }

    let others: Vec<Result<Dataset>> = other_paths
        .par_iter()
        .filter(|path| !path.is_empty())
        .map(|path| loader.load(Path::new(path)))
        .collect();
    for dataset in others {
        let dataset = dataset?;
        let variable_id = dataset.variable_id()?;
        if !source_files.contains_key(variable_id) {
            source_files.insert(variable_id.to_string(), dataset.source_file()?.to_string());
        }
    }

    let common_mask = common_mask.ok_or(CmipScanError::MissingMask)?;
    Ok((source_files, common_mask))
}

type Assembled = (IndexMap<String, DataArray>, Option<Coordinate>);

/// Every time-bearing field must carry an identical time coordinate
///
/// Fields with a time dimension but no coordinate are accepted when their
/// length matches the shared axis.
fn assemble_strict(fields: &[SquashedField]) -> Result<Assembled> {
    let mut time: Option<&Coordinate> = None;
    for field in fields {
        if field.array.axis_of(TIME_DIM).is_none() {
            continue;
        }
        match (time, field.time.as_ref()) {
            (None, Some(coordinate)) => time = Some(coordinate),
            (Some(target), Some(coordinate)) if !target.is_compatible(coordinate) => {
                return Err(CmipScanError::TimeAxisMismatch {
                    var: field.array.name.clone(),
                    message: format!(
                        "{} steps in {:?}/{:?} vs {} steps in {:?}/{:?}",
                        coordinate.len(),
                        coordinate.units(),
                        coordinate.calendar(),
                        target.len(),
                        target.units(),
                        target.calendar()
                    ),
                });
            }
            _ => {}
        }
    }

    if let Some(target) = time {
        for field in fields.iter().filter(|field| field.time.is_none()) {
            if let Some(axis) = field.array.axis_of(TIME_DIM) {
                if field.array.shape()[axis] != target.len() {
                    return Err(CmipScanError::TimeAxisMismatch {
                        var: field.array.name.clone(),
                        message: "field has no time coordinate and a different length"
                            .to_string(),
                    });
                }
            }
        }
    }

    let variables = fields
        .iter()
        .map(|field| (field.array.name.clone(), field.array.clone()))
        .collect();
    Ok((variables, time.cloned()))
}

/// Assign fields one at a time onto the first time axis seen, by position
fn assemble_by_field(fields: Vec<SquashedField>) -> Result<Assembled> {
    let mut time: Option<Coordinate> = None;
    let mut length: Option<usize> = None;
    let mut variables = IndexMap::new();
    for field in fields {
        if let Some(axis) = field.array.axis_of(TIME_DIM) {
            let steps = field.array.shape()[axis];
            match length {
                Some(expected) if expected != steps => {
                    return Err(CmipScanError::TimeAxisMismatch {
                        var: field.array.name.clone(),
                        message: format!(
                            "cannot place {steps} values on a time axis of {expected}"
                        ),
                    });
                }
                _ => length = Some(steps),
            }
            if time.is_none() {
                time = field.time;
            }
        }
        variables.insert(field.array.name.clone(), field.array);
    }
    Ok((variables, time))
}
