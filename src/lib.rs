//! cmip_scan: discovery, association and masked merging of CMIP model output
//!
//! CMIP output is stored in a fixed nine-level folder hierarchy
//! (`activity_id/institution_id/source_id/experiment_id/variant_label/domain/variable_id/grid_label/version`).
//! This library finds leaf folders in such a tree, pairs a scenario run with
//! the matching control run, and merges the masks of several variables to
//! average all of them over the same region.
//!
//! ## Module Organization
//!
//! - [`path_codec`]: decoding folder paths into [`PathQuery`]s and back
//! - [`matches`]: [`MatchFinder`], the filesystem search with version and member caps
//! - [`historical`]: [`HistoricalAssociator`], searching with progressively relaxed queries
//! - [`dataset`]: in-memory labelled datasets and the [`DatasetLoader`] seam
//! - [`mask`]: two-dimensional boolean masks
//! - [`merger`]: [`VariableMerger`], folding masks and squashing variables into one dataset
//! - [`statistics`]: masking and parallel NaN-skipping spatial means
//! - [`netcdf_io`]: NetCDF reading and writing
//! - [`config`], [`logging`], [`parallel`], [`errors`]: process setup and error handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cmip_scan::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> cmip_scan::Result<()> {
//! let finder = MatchFinder::default();
//! let query = PathQuery::default().with(QueryField::SourceId, "CESM2");
//! let found = finder.find_matches(Path::new("/data/CMIP6"), &query)?;
//!
//! let associator = HistoricalAssociator::new(finder);
//! if let Some(first) = found.first() {
//!     let control = associator.associate(None, Some(first.as_path()))?;
//!     println!("{control:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dataset;
pub mod errors;
pub mod historical;
pub mod logging;
pub mod mask;
pub mod matches;
pub mod merger;
pub mod netcdf_io;
pub mod parallel;
pub mod path_codec;
pub mod statistics;

pub use config::{Config, CONFIG_ENV_VAR};
pub use dataset::{AttrValue, Attributes, Coordinate, DataArray, Dataset, DatasetLoader};
pub use errors::{CmipScanError, Result};
pub use historical::{default_query_updates, HistoricalAssociator, QueryUpdate};
pub use logging::init_logging;
pub use mask::Mask;
pub use matches::{ExclusionList, MatchFinder, SearchOptions};
pub use merger::{
    combine_masks, MergeMethod, MergeProvenance, MergedDataset, MergerOptions, VariableMerger,
};
pub use netcdf_io::{read_dataset, write_merged_dataset, NetCDFLoader};
pub use parallel::ParallelConfig;
pub use path_codec::{
    base_from, decode, get_head, parse_version_and_variant, PathQuery, QueryField,
    VersionVariant, WILDCARD,
};

pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::dataset::{DataArray, Dataset, DatasetLoader};
    pub use crate::errors::{CmipScanError, Result};
    pub use crate::historical::HistoricalAssociator;
    pub use crate::mask::Mask;
    pub use crate::matches::{MatchFinder, SearchOptions};
    pub use crate::merger::{MergedDataset, MergerOptions, VariableMerger};
    pub use crate::netcdf_io::NetCDFLoader;
    pub use crate::path_codec::{PathQuery, QueryField};
    pub use crate::statistics::MaskedReduction;
}
