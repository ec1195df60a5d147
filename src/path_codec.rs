//! Encoding and decoding of the CMIP folder hierarchy
//!
//! Model output is stored nine folders deep:
//!
//! ```text
//! <base>/<activity_id>/<institution_id>/<source_id>/<experiment_id>/<variant_label>/<domain>/<variable_id>/<grid_label>/<version>
//! ```
//!
//! This module converts between such paths and [`PathQuery`] values, recovers
//! the base folder a path lives under, and extracts the run-variant number and
//! grid version that determine the ordering of search results.

use crate::errors::{CmipScanError, Result};
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::cmp::Reverse;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Number of folders between a base directory and a version leaf
pub const HIERARCHY_DEPTH: usize = 9;

/// Token matching any single folder name
pub const WILDCARD: &str = "*";

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^v\d{8}$").expect("version pattern is a valid regex"))
}

fn variant_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^r(\d+)i\d+").expect("variant pattern is a valid regex"))
}

/// One level of the folder hierarchy, in on-disk order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryField {
    ActivityId,
    InstitutionId,
    SourceId,
    ExperimentId,
    VariantLabel,
    Domain,
    VariableId,
    GridLabel,
    Version,
}

impl QueryField {
    /// All fields, outermost folder first
    pub const ALL: [QueryField; HIERARCHY_DEPTH] = [
        QueryField::ActivityId,
        QueryField::InstitutionId,
        QueryField::SourceId,
        QueryField::ExperimentId,
        QueryField::VariantLabel,
        QueryField::Domain,
        QueryField::VariableId,
        QueryField::GridLabel,
        QueryField::Version,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ActivityId => "activity_id",
            Self::InstitutionId => "institution_id",
            Self::SourceId => "source_id",
            Self::ExperimentId => "experiment_id",
            Self::VariantLabel => "variant_label",
            Self::Domain => "domain",
            Self::VariableId => "variable_id",
            Self::GridLabel => "grid_label",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryField {
    type Err = CmipScanError;

    fn from_str(s: &str) -> Result<Self> {
        QueryField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| CmipScanError::invalid_input(format!("unknown query field '{s}'")))
    }
}

/// A (possibly wildcarded) description of one leaf folder in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathQuery {
    pub activity_id: String,
    pub institution_id: String,
    pub source_id: String,
    pub experiment_id: String,
    pub variant_label: String,
    pub domain: String,
    pub variable_id: String,
    pub grid_label: String,
    pub version: String,
}

impl Default for PathQuery {
    /// Yearly near-surface temperature of every ssp585 run
    fn default() -> Self {
        Self {
            activity_id: "ScenarioMIP".to_string(),
            institution_id: WILDCARD.to_string(),
            source_id: WILDCARD.to_string(),
            experiment_id: "ssp585".to_string(),
            variant_label: WILDCARD.to_string(),
            domain: "Ayear".to_string(),
            variable_id: "tas".to_string(),
            grid_label: WILDCARD.to_string(),
            version: WILDCARD.to_string(),
        }
    }
}

impl PathQuery {
    /// A query where every field is the wildcard
    #[must_use]
    pub fn wildcard() -> Self {
        let mut query = Self::default();
        for field in QueryField::ALL {
            query.set(field, WILDCARD);
        }
        query
    }

    #[must_use]
    pub fn get(&self, field: QueryField) -> &str {
        match field {
            QueryField::ActivityId => &self.activity_id,
            QueryField::InstitutionId => &self.institution_id,
            QueryField::SourceId => &self.source_id,
            QueryField::ExperimentId => &self.experiment_id,
            QueryField::VariantLabel => &self.variant_label,
            QueryField::Domain => &self.domain,
            QueryField::VariableId => &self.variable_id,
            QueryField::GridLabel => &self.grid_label,
            QueryField::Version => &self.version,
        }
    }

    pub fn set<S: Into<String>>(&mut self, field: QueryField, value: S) {
        let slot = match field {
            QueryField::ActivityId => &mut self.activity_id,
            QueryField::InstitutionId => &mut self.institution_id,
            QueryField::SourceId => &mut self.source_id,
            QueryField::ExperimentId => &mut self.experiment_id,
            QueryField::VariantLabel => &mut self.variant_label,
            QueryField::Domain => &mut self.domain,
            QueryField::VariableId => &mut self.variable_id,
            QueryField::GridLabel => &mut self.grid_label,
            QueryField::Version => &mut self.version,
        };
        *slot = value.into();
    }

    /// Builder-style variant of [`PathQuery::set`]
    #[must_use]
    pub fn with<S: Into<String>>(mut self, field: QueryField, value: S) -> Self {
        self.set(field, value);
        self
    }

    /// Apply a list of `(field, value)` overrides in order
    pub fn update<'a, I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = &'a (QueryField, String)>,
    {
        for (field, value) in overrides {
            self.set(*field, value.clone());
        }
    }

    /// Fields paired with their values, outermost folder first
    pub fn fields(&self) -> impl Iterator<Item = (QueryField, &str)> + '_ {
        QueryField::ALL.into_iter().map(move |field| (field, self.get(field)))
    }

    /// The nine folders as a relative path
    #[must_use]
    pub fn to_relative(&self) -> PathBuf {
        self.fields().map(|(_, value)| value).collect()
    }

    /// The nine folders joined under `base`
    #[must_use]
    pub fn under(&self, base: &Path) -> PathBuf {
        base.join(self.to_relative())
    }

    /// Glob pattern selecting every leaf folder matching this query under `base`.
    ///
    /// The base itself is escaped so that brackets or stars in it are taken literally.
    #[must_use]
    pub fn glob_pattern(&self, base: &Path) -> String {
        let escaped_base = glob::Pattern::escape(&base.to_string_lossy());
        let mut pattern = PathBuf::from(escaped_base);
        pattern.push(self.to_relative());
        pattern.to_string_lossy().into_owned()
    }
}

impl fmt::Display for PathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields()
            .map(|(field, value)| format!("{field}={value}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Grid version and run-variant number of a leaf folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionVariant {
    /// `20190731` for a `v20190731` folder
    pub grid_version: u64,
    /// `3` for a `r3i1p1f1` folder
    pub run_variant: u64,
}

impl VersionVariant {
    /// Ordering key: newest version first, then lowest variant
    #[must_use]
    pub fn sort_key(&self) -> (Reverse<u64>, u64) {
        (Reverse(self.grid_version), self.run_variant)
    }
}

/// True for folder names shaped like `v20190731`
#[must_use]
pub fn is_version_folder(name: &str) -> bool {
    version_regex().is_match(name)
}

/// Run-variant number of a folder shaped like `r3i1p1f1`, if it is one
#[must_use]
pub fn run_variant_number(name: &str) -> Option<u64> {
    variant_regex()
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Normalise a path to the folder it describes.
///
/// Trailing separators are dropped and a path to a file is replaced by its
/// containing directory.
#[must_use]
pub fn get_head(path: &Path) -> PathBuf {
    let as_string = path.to_string_lossy();
    if as_string.len() > 1 && as_string.ends_with(std::path::MAIN_SEPARATOR) {
        debug!("Stripping trailing separator from {}", path.display());
    }
    let mut head: PathBuf = path.components().collect();
    if head.is_file() {
        debug!("Splitting file from {}", head.display());
        head.pop();
    }
    head
}

fn folder_names(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// Decode a leaf folder (or a file inside one) into its nine query fields
///
/// # Errors
///
/// Returns [`CmipScanError::Format`] if the path is shorter than the hierarchy
/// or its last folder is not a version folder.
pub fn decode(path: &Path) -> Result<PathQuery> {
    let head = get_head(path);
    let folders = folder_names(&head);
    let last = folders.last().map(String::as_str).unwrap_or_default();
    if !is_version_folder(last) {
        return Err(CmipScanError::format(
            head,
            "folder does not end with a version (expected e.g. v20190731)",
        ));
    }
    if folders.len() < HIERARCHY_DEPTH {
        return Err(CmipScanError::format(
            head,
            format!("expected at least {HIERARCHY_DEPTH} folders"),
        ));
    }

    let tail = &folders[folders.len() - HIERARCHY_DEPTH..];
    let mut query = PathQuery::wildcard();
    for (field, value) in QueryField::ALL.into_iter().zip(tail) {
        query.set(field, value.as_str());
    }
    Ok(query)
}

/// The directory `path` was found under, i.e. `path` without its last
/// `HIERARCHY_DEPTH + look_back_extra` folders
///
/// # Errors
///
/// Returns [`CmipScanError::Format`] if the path does not have that many folders.
pub fn base_from(path: &Path, look_back_extra: usize) -> Result<PathBuf> {
    let head = get_head(path);
    let drop = HIERARCHY_DEPTH + look_back_extra;
    let components: Vec<Component> = head.components().collect();
    let n_folders = components
        .iter()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    if n_folders < drop {
        return Err(CmipScanError::format(
            head.clone(),
            format!("cannot look back {drop} folders, path only has {n_folders}"),
        ));
    }
    Ok(components[..components.len() - drop].iter().collect())
}

/// Find the grid version and run-variant number anywhere in `path`
///
/// The first matching folder of each kind wins.
///
/// # Errors
///
/// Returns [`CmipScanError::Format`] if either is missing.
pub fn parse_version_and_variant(path: &Path) -> Result<VersionVariant> {
    let mut run_variant = None;
    let mut grid_version = None;
    for folder in folder_names(path) {
        if run_variant.is_none() {
            run_variant = run_variant_number(&folder);
        }
        if grid_version.is_none() && is_version_folder(&folder) {
            grid_version = folder[1..].parse::<u64>().ok();
        }
    }

    match (grid_version, run_variant) {
        (Some(grid_version), Some(run_variant)) => Ok(VersionVariant {
            grid_version,
            run_variant,
        }),
        (grid_version, run_variant) => Err(CmipScanError::format(
            path,
            format!(
                "could not find run and version (run={run_variant:?}, version={grid_version:?})"
            ),
        )),
    }
}
