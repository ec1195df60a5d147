use cmip_scan::prelude::*;
use cmip_scan::{AttrValue, Config, Coordinate, MergeMethod};
use ndarray::{arr2, Array3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Serves prepared datasets by path
#[derive(Default)]
struct MemoryLoader {
    datasets: HashMap<PathBuf, Dataset>,
}

impl MemoryLoader {
    fn with(mut self, path: &str, dataset: Dataset) -> Self {
        self.datasets.insert(PathBuf::from(path), dataset);
        self
    }
}

impl DatasetLoader for MemoryLoader {
    fn load(&self, path: &Path) -> Result<Dataset> {
        self.datasets
            .get(path)
            .cloned()
            .ok_or_else(|| CmipScanError::Generic(format!("no dataset at {}", path.display())))
    }
}

fn lat_lon() -> Vec<String> {
    vec!["lat".to_string(), "lon".to_string()]
}

fn time_axis(calendar: &str) -> Coordinate {
    Coordinate::new(vec![0.0, 365.0, 730.0])
        .with_attribute("units", "days since 1850-01-01")
        .with_attribute("calendar", calendar)
}

/// A source with `variable_id` data on time x lat x lon, a cell area and a mask
fn source(variable_id: &str, mask: [[f64; 2]; 2], scale: f64) -> Result<Dataset> {
    let values: Vec<f64> = (0..12).map(|i| scale * f64::from(i)).collect();
    let data = Array3::from_shape_vec((3, 2, 2), values)?.into_dyn();
    let field = DataArray::new(
        variable_id,
        vec!["time".into(), "lat".into(), "lon".into()],
        data,
    )?;
    let mut attributes = cmip_scan::Attributes::new();
    attributes.insert("units".to_string(), AttrValue::from("K"));

    let mut dataset = Dataset::new()
        .with_attribute("variable_id", variable_id)
        .with_attribute("file", format!("/source/{variable_id}.nc"));
    dataset.insert_variable(field.with_attributes(attributes));
    dataset.insert_variable(DataArray::new("global_mask", lat_lon(), arr2(&mask).into_dyn())?);
    dataset.insert_variable(DataArray::new(
        "cell_area",
        lat_lon(),
        arr2(&[[1.0, 1.0], [1.0, 1.0]]).into_dyn(),
    )?);
    dataset.insert_coordinate("time", time_axis("noleap"));
    Ok(dataset)
}

fn mask_only(variable_id: &str, mask: [[f64; 2]; 2]) -> Result<Dataset> {
    let mut dataset = Dataset::new()
        .with_attribute("variable_id", variable_id)
        .with_attribute("file", format!("/source/{variable_id}.nc"));
    dataset.insert_variable(DataArray::new("global_mask", lat_lon(), arr2(&mask).into_dyn())?);
    Ok(dataset)
}

fn paths(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_three_masks_or_to_full_grid() -> Result<()> {
    let loader = MemoryLoader::default()
        .with("a", mask_only("tas", [[1.0, 0.0], [0.0, 1.0]])?)
        .with("b", mask_only("pr", [[0.0, 0.0], [1.0, 1.0]])?)
        .with("c", mask_only("siconc", [[0.0, 1.0], [0.0, 0.0]])?);
    let merger = VariableMerger::new(
        loader,
        paths(&["a", "b", "c"]),
        Vec::new(),
        MergerOptions::default(),
    )?;
    assert_eq!(merger.common_mask().data(), &arr2(&[[true, true], [true, true]]));
    assert_eq!(
        merger.source_files().keys().collect::<Vec<_>>(),
        vec!["tas", "pr", "siconc"]
    );
    Ok(())
}

#[test]
fn test_unsupported_method_fails_on_second_mask() -> Result<()> {
    let options = MergerOptions {
        merge_method: "logical_xor".to_string(),
        ..MergerOptions::default()
    };
    let single = MemoryLoader::default().with("a", mask_only("tas", [[1.0, 0.0], [0.0, 1.0]])?);
    assert!(VariableMerger::new(single, paths(&["a"]), Vec::new(), options.clone()).is_ok());

    let double = MemoryLoader::default()
        .with("a", mask_only("tas", [[1.0, 0.0], [0.0, 1.0]])?)
        .with("b", mask_only("pr", [[0.0, 0.0], [1.0, 1.0]])?);
    let result = VariableMerger::new(double, paths(&["a", "b"]), Vec::new(), options);
    assert!(matches!(result, Err(CmipScanError::UnimplementedMethod { .. })));
    Ok(())
}

#[test]
fn test_merger_requires_masks() {
    let result = VariableMerger::new(
        MemoryLoader::default(),
        Vec::new(),
        paths(&["x"]),
        MergerOptions::default(),
    );
    assert!(matches!(result, Err(CmipScanError::InvalidInput { .. })));
}

#[test]
fn test_mask_shape_mismatch() -> Result<()> {
    let mut wide = Dataset::new()
        .with_attribute("variable_id", "pr")
        .with_attribute("file", "/source/pr.nc");
    wide.insert_variable(DataArray::new(
        "global_mask",
        lat_lon(),
        arr2(&[[1.0, 0.0, 1.0], [0.0, 1.0, 0.0]]).into_dyn(),
    )?);
    let loader = MemoryLoader::default()
        .with("a", mask_only("tas", [[1.0, 0.0], [0.0, 1.0]])?)
        .with("b", wide);
    let options = MergerOptions::default();
    let result = VariableMerger::new(loader, paths(&["a", "b"]), Vec::new(), options);
    assert!(matches!(result, Err(CmipScanError::ShapeMismatch { .. })));
    Ok(())
}

#[test]
fn test_other_paths_register_unseen_variables_only() -> Result<()> {
    let mut other_tas = mask_only("tas", [[1.0, 1.0], [1.0, 1.0]])?;
    other_tas
        .attributes
        .insert("file".to_string(), AttrValue::from("/elsewhere/tas.nc"));
    let loader = MemoryLoader::default()
        .with("a", mask_only("tas", [[1.0, 0.0], [0.0, 0.0]])?)
        .with("o1", other_tas)
        .with("o2", mask_only("zos", [[1.0, 1.0], [1.0, 1.0]])?);
    let merger = VariableMerger::new(
        loader,
        paths(&["a"]),
        paths(&["o1", "", "o2"]),
        MergerOptions::default(),
    )?;
    assert_eq!(merger.source_files()["tas"], "/source/tas.nc");
    assert_eq!(merger.source_files()["zos"], "/source/zos.nc");
    // Other paths never widen the mask
    assert_eq!(merger.common_mask().count(), 1);
    Ok(())
}

#[test]
fn test_duplicate_mask_variable_last_wins() -> Result<()> {
    let mut second = mask_only("tas", [[0.0, 0.0], [0.0, 1.0]])?;
    second
        .attributes
        .insert("file".to_string(), AttrValue::from("/second/tas.nc"));
    let loader = MemoryLoader::default()
        .with("a", mask_only("tas", [[1.0, 0.0], [0.0, 0.0]])?)
        .with("b", second);
    let options = MergerOptions::default();
    let merger = VariableMerger::new(loader, paths(&["a", "b"]), Vec::new(), options)?;
    assert_eq!(merger.source_files().len(), 1);
    assert_eq!(merger.source_files()["tas"], "/second/tas.nc");
    assert_eq!(merger.common_mask().count(), 2);
    Ok(())
}

#[test]
fn test_squash_sources() -> Result<()> {
    let loader = MemoryLoader::default()
        .with("mask/tas", source("tas", [[1.0, 0.0], [0.0, 0.0]], 1.0)?)
        .with("mask/pr", source("pr", [[0.0, 0.0], [0.0, 1.0]], 10.0)?)
        .with("/source/tas.nc", source("tas", [[1.0, 0.0], [0.0, 0.0]], 1.0)?)
        .with("/source/pr.nc", source("pr", [[0.0, 0.0], [0.0, 1.0]], 10.0)?);
    let merger = VariableMerger::new(
        loader,
        paths(&["mask/tas", "mask/pr"]),
        Vec::new(),
        MergerOptions::default(),
    )?;
    let merged = merger.squash_sources()?;

    // Diagonal cells of each time step: (0 + 3) / 2, (4 + 7) / 2, (8 + 11) / 2
    let tas = merged.variable("tas")?;
    assert_eq!(tas.dims, vec!["time"]);
    assert_eq!(tas.data.as_slice(), Some(&[1.5, 5.5, 9.5][..]));
    assert_eq!(tas.attributes.get("units"), Some(&AttrValue::from("K")));
    let pr = merged.variable("pr")?;
    assert_eq!(pr.data.as_slice(), Some(&[15.0, 55.0, 95.0][..]));

    assert_eq!(merged.time().map(Coordinate::len), Some(3));
    assert_eq!(merged.cell_area().name, "cell_area");
    assert_eq!(merged.global_mask().count(), 2);

    let provenance = merged.provenance();
    assert_eq!(provenance.variables, vec!["pr", "tas"]);
    assert_eq!(provenance.source_files, vec!["/source/pr.nc", "/source/tas.nc"]);
    assert_eq!(provenance.mask_files, vec!["mask/pr", "mask/tas"]);
    assert_eq!(provenance.paths, vec!["mask/tas", "mask/pr"]);
    assert!(provenance.other_paths.is_empty());
    Ok(())
}

#[test]
fn test_squash_with_conflicting_calendars() -> Result<()> {
    let mut pr = source("pr", [[0.0, 0.0], [0.0, 1.0]], 10.0)?;
    pr.insert_coordinate("time", time_axis("360_day"));
    let loader = MemoryLoader::default()
        .with("mask/tas", source("tas", [[1.0, 0.0], [0.0, 0.0]], 1.0)?)
        .with("/source/tas.nc", source("tas", [[1.0, 0.0], [0.0, 0.0]], 1.0)?)
        .with("/source/pr.nc", pr.clone())
        .with("mask/pr", pr);
    let merger = VariableMerger::new(
        loader,
        paths(&["mask/tas", "mask/pr"]),
        Vec::new(),
        MergerOptions::default(),
    )?;
    let merged = merger.squash_sources()?;
    assert_eq!(merged.time().and_then(Coordinate::calendar), Some("noleap"));
    assert_eq!(merged.variables().len(), 2);
    Ok(())
}

#[test]
fn test_swapped_mask_dims_are_transposed() -> Result<()> {
    // Field value is 10 * lat + lon; the mask is stored as (lon, lat) and picks lon 0, lat 1
    let values: Vec<f64> = (0..3)
        .flat_map(|_| [0.0, 1.0, 10.0, 11.0])
        .collect();
    let data = Array3::from_shape_vec((3, 2, 2), values)?.into_dyn();
    let field = DataArray::new("tas", vec!["time".into(), "lat".into(), "lon".into()], data)?;
    let lon_lat = vec!["lon".to_string(), "lat".to_string()];

    let mut dataset = Dataset::new()
        .with_attribute("variable_id", "tas")
        .with_attribute("file", "/source/tas.nc");
    dataset.insert_variable(field);
    dataset.insert_variable(DataArray::new(
        "global_mask",
        lon_lat.clone(),
        arr2(&[[0.0, 1.0], [0.0, 0.0]]).into_dyn(),
    )?);
    dataset.insert_variable(DataArray::new(
        "cell_area",
        lon_lat,
        arr2(&[[1.0, 1.0], [1.0, 1.0]]).into_dyn(),
    )?);
    dataset.insert_coordinate("time", time_axis("noleap"));

    let loader = MemoryLoader::default()
        .with("mask/tas", dataset.clone())
        .with("/source/tas.nc", dataset);
    let merger = VariableMerger::new(
        loader,
        paths(&["mask/tas"]),
        Vec::new(),
        MergerOptions::default(),
    )?;
    let merged = merger.squash_sources()?;
    assert_eq!(merged.variable("tas")?.data.as_slice(), Some(&[10.0, 10.0, 10.0][..]));
    assert_eq!(merged.global_mask().dims(), &["lat".to_string(), "lon".to_string()]);
    assert!(merged.global_mask().data()[[1, 0]]);
    Ok(())
}

#[test]
fn test_renamed_spatial_dims() -> Result<()> {
    let config = Config::from_toml_str("[analyze]\nlon_lat_dim = \"x,y\"\n")?;
    let options = MergerOptions::from_config(&config);
    assert_eq!(options.spatial_dims, vec!["x", "y"]);
    assert_eq!(options.merge_method, MergeMethod::LogicalOr.as_str());

    // Masks on lat/lon are relabelled to y/x; the data has no such axes
    let loader = MemoryLoader::default()
        .with("mask/tas", source("tas", [[1.0, 0.0], [0.0, 0.0]], 1.0)?)
        .with("/source/tas.nc", source("tas", [[1.0, 0.0], [0.0, 0.0]], 1.0)?);
    let merger = VariableMerger::new(loader, paths(&["mask/tas"]), Vec::new(), options)?;
    assert!(matches!(
        merger.squash_sources(),
        Err(CmipScanError::DimensionNotFound { .. })
    ));
    Ok(())
}

#[test]
fn test_error_display() {
    let error = CmipScanError::UnimplementedMethod {
        method: "logical_and".to_string(),
    };
    assert_eq!(error.to_string(), "No such method as logical_and");

    let error = CmipScanError::VariableNotFound {
        var: "tas".to_string(),
    };
    assert!(error.to_string().contains("tas"));
    assert!(std::error::Error::source(&error).is_none());
}
