//! Discovery of model output following the CMIP folder hierarchy
//!
//! [`MatchFinder`] expands a [`PathQuery`] against the filesystem, orders the
//! hits newest version first, keeps a bounded number of versions and members
//! per model and drops folders that lack the required file or are excluded by
//! configuration.

use crate::config::Config;
use crate::errors::{CmipScanError, Result};
use crate::path_codec::{get_head, parse_version_and_variant, PathQuery, WILDCARD};
use indexmap::IndexMap;
use log::{debug, info, warn};
use std::path::{Component, Path, PathBuf};

/// Values accepted for `activity_id`
pub const ACCEPTED_ACTIVITY_IDS: [&str; 4] = ["AerChemMIP", "ScenarioMIP", "CMIP", WILDCARD];

/// Values accepted for `experiment_id`
pub const ACCEPTED_EXPERIMENT_IDS: [&str; 8] = [
    "piControl",
    "historical",
    "ssp119",
    "ssp126",
    "ssp245",
    "ssp370",
    "ssp585",
    WILDCARD,
];

/// Folders between a leaf and its run group (the `source_id` folder)
const RUN_GROUP_DEPTH: usize = 7;

/// Limits applied while collecting matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Distinct versions kept per run group; `None` is unlimited
    pub max_versions: Option<usize>,
    /// Paths kept per version; `None` is unlimited
    pub max_members: Option<usize>,
    /// File that must exist inside a leaf folder; `None` skips the check
    pub required_file: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_versions: Some(1),
            max_members: Some(1),
            required_file: Some("merged.nc".to_string()),
        }
    }
}

impl SearchOptions {
    /// Largest number of paths a search may return
    #[must_use]
    pub fn cap(&self) -> Option<usize> {
        match (self.max_versions, self.max_members) {
            (Some(versions), Some(members)) => Some(versions.saturating_mul(members)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ExclusionPattern {
    n_folders: usize,
    pattern: glob::Pattern,
    raw: String,
}

/// Folder-suffix patterns identifying data that must never be used
///
/// Each line of the configuration is one pattern, split on whitespace into
/// folder tokens. A path is excluded when its last folders, as many as the
/// pattern has tokens, match the pattern. A `*` may span folder separators.
#[derive(Debug, Clone, Default)]
pub struct ExclusionList {
    patterns: Vec<ExclusionPattern>,
}

impl ExclusionList {
    /// Parse newline separated exclusion patterns, skipping blank lines
    ///
    /// # Errors
    ///
    /// Returns [`CmipScanError::PatternError`] if a line is not a valid glob pattern.
    pub fn parse(text: &str) -> Result<Self> {
        let mut patterns = Vec::new();
        for line in text.lines() {
            let folders: Vec<&str> = line.split_whitespace().collect();
            if folders.is_empty() {
                continue;
            }
            let joined = folders.join("/");
            patterns.push(ExclusionPattern {
                n_folders: folders.len(),
                pattern: glob::Pattern::new(&joined)?,
                raw: joined,
            });
        }
        Ok(Self { patterns })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first pattern excluding `path`, if any
    #[must_use]
    pub fn matching(&self, path: &Path) -> Option<&str> {
        let folders = folder_names(&get_head(path));
        self.patterns.iter().find_map(|excluded| {
            let start = folders.len().saturating_sub(excluded.n_folders);
            let tail = folders[start..].join("/");
            excluded
                .pattern
                .matches(&tail)
                .then_some(excluded.raw.as_str())
        })
    }

    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.matching(path).is_some()
    }
}

fn folder_names(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// The run group (`source_id` folder) and version folder of a leaf
fn group_and_version(candidate: &Path) -> Result<(String, String)> {
    let folders = folder_names(candidate);
    if folders.len() < RUN_GROUP_DEPTH {
        return Err(CmipScanError::format(
            candidate,
            "too few folders to determine the run group",
        ));
    }
    let group = folders[folders.len() - RUN_GROUP_DEPTH].clone();
    let version = folders[folders.len() - 1].clone();
    Ok((group, version))
}

fn check_accepts(query: &PathQuery) -> Result<()> {
    if !ACCEPTED_ACTIVITY_IDS.contains(&query.activity_id.as_str()) {
        return Err(CmipScanError::invalid_input(format!(
            "activity_id '{}' not in {:?}",
            query.activity_id, ACCEPTED_ACTIVITY_IDS
        )));
    }
    if !ACCEPTED_EXPERIMENT_IDS.contains(&query.experiment_id.as_str()) {
        return Err(CmipScanError::invalid_input(format!(
            "experiment_id '{}' not in {:?}",
            query.experiment_id, ACCEPTED_EXPERIMENT_IDS
        )));
    }
    Ok(())
}

fn reached(count: usize, limit: Option<usize>) -> bool {
    limit.is_some_and(|limit| count >= limit)
}

/// Searches a base directory for leaf folders matching a [`PathQuery`]
#[derive(Debug, Clone, Default)]
pub struct MatchFinder {
    options: SearchOptions,
    exclusions: ExclusionList,
}

impl MatchFinder {
    #[must_use]
    pub fn new(options: SearchOptions, exclusions: ExclusionList) -> Self {
        Self {
            options,
            exclusions,
        }
    }

    /// Finder with default limits, the configured required file and exclusions
    pub fn from_config(config: &Config) -> Result<Self> {
        let options = SearchOptions {
            required_file: config.required_file(),
            ..SearchOptions::default()
        };
        Ok(Self::new(options, config.exclusions()?))
    }

    #[must_use]
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    #[must_use]
    pub fn exclusions(&self) -> &ExclusionList {
        &self.exclusions
    }

    /// Find all accepted leaf folders under `base` matching `query`.
    ///
    /// Results are ordered newest grid version first, then lowest run-variant
    /// number, and grouped by run group in order of first appearance.
    ///
    /// # Errors
    ///
    /// - [`CmipScanError::InvalidInput`] for an `activity_id` or `experiment_id`
    ///   outside the accepted vocabulary
    /// - [`CmipScanError::Format`] if a matched folder has no version or run variant
    /// - [`CmipScanError::Consistency`] if the result holds more paths than the cap
    pub fn find_matches(&self, base: &Path, query: &PathQuery) -> Result<Vec<PathBuf>> {
        check_accepts(query)?;

        let pattern = query.glob_pattern(base);
        debug!("Searching {}", pattern);

        let mut candidates = Vec::new();
        for entry in glob::glob(&pattern)? {
            match entry {
                Ok(path) if path.is_dir() => {
                    let key = parse_version_and_variant(&path)?.sort_key();
                    candidates.push((key, path));
                }
                Ok(path) => debug!("{} is not a directory", path.display()),
                Err(e) => warn!("Could not read {}: {}", e.path().display(), e.error()),
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut seen: IndexMap<String, IndexMap<String, Vec<PathBuf>>> = IndexMap::new();
        for (_, candidate) in candidates {
            let (group, version) = group_and_version(&candidate)?;
            let members = seen.entry(group).or_default();

            let versions_full = reached(members.len(), self.options.max_versions)
                && !members.contains_key(&version);
            let members_full = reached(
                members.get(&version).map_or(0, Vec::len),
                self.options.max_members,
            );
            if versions_full || members_full {
                continue;
            }
            if let Some(required_file) = &self.options.required_file {
                if !candidate.join(required_file).exists() {
                    warn!("{} not in {}", required_file, candidate.display());
                    continue;
                }
            }
            if let Some(excluded_by) = self.exclusions.matching(&candidate) {
                info!("{} is excluded (matches {})", candidate.display(), excluded_by);
                continue;
            }
            members.entry(version).or_default().push(candidate);
        }

        let found: Vec<PathBuf> = seen
            .into_values()
            .flat_map(IndexMap::into_values)
            .flatten()
            .collect();
        if let Some(cap) = self.options.cap() {
            if found.len() > cap {
                return Err(CmipScanError::Consistency {
                    message: format!(
                        "{} matches for {query}, more than {cap}",
                        found.len()
                    ),
                });
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusion_matches_folder_suffix() -> Result<()> {
        let exclusions = ExclusionList::parse("\nMPI-ESM1-2-LR * r2i1p1f1 * * * *\n\n")?;
        assert_eq!(exclusions.len(), 1);

        let run = "/data/ScenarioMIP/MPI-M/MPI-ESM1-2-LR/ssp585";
        let excluded = format!("{run}/r2i1p1f1/Ayear/tas/gn/v20190710");
        let kept = format!("{run}/r1i1p1f1/Ayear/tas/gn/v20190710");
        assert!(exclusions.is_excluded(Path::new(&excluded)));
        assert!(!exclusions.is_excluded(Path::new(&kept)));
        Ok(())
    }

    #[test]
    fn test_exclusion_star_spans_folders() -> Result<()> {
        let exclusions = ExclusionList::parse("AWI-ESM-1-1-LR *")?;
        let path = Path::new(concat!(
            "/data/CMIP/AWI/AWI-ESM-1-1-LR/piControl",
            "/r1i1p1f1/Ayear/tas/gn/v20200212"
        ));
        // Only two trailing folders are compared, so the source_id does not line up
        assert!(!exclusions.is_excluded(path));

        let exclusions = ExclusionList::parse("*AWI-ESM-1-1-LR*")?;
        assert!(!exclusions.is_excluded(path));

        let exclusions = ExclusionList::parse("CMIP * AWI-ESM-1-1-LR * * * * * *")?;
        assert_eq!(exclusions.matching(path), Some("CMIP/*/AWI-ESM-1-1-LR/*/*/*/*/*/*"));
        Ok(())
    }

    #[test]
    fn test_invalid_exclusion_pattern() {
        assert!(matches!(
            ExclusionList::parse("CMIP [unclosed"),
            Err(CmipScanError::PatternError(_))
        ));
    }

    #[test]
    fn test_check_accepts() {
        assert!(check_accepts(&PathQuery::default()).is_ok());
        assert!(check_accepts(&PathQuery::wildcard()).is_ok());

        let bad_activity = PathQuery::default().with(crate::QueryField::ActivityId, "DAMIP");
        assert!(matches!(
            check_accepts(&bad_activity),
            Err(CmipScanError::InvalidInput { .. })
        ));
        let bad_experiment = PathQuery::default().with(crate::QueryField::ExperimentId, "ssp999");
        assert!(check_accepts(&bad_experiment).is_err());
    }

    #[test]
    fn test_cap() {
        assert_eq!(SearchOptions::default().cap(), Some(1));
        let unlimited = SearchOptions {
            max_versions: None,
            ..SearchOptions::default()
        };
        assert_eq!(unlimited.cap(), None);
    }

    #[test]
    fn test_group_and_version() -> Result<()> {
        let (group, version) = group_and_version(Path::new(
            "/data/CMIP/NCAR/CESM2/historical/r1i1p1f1/Ayear/tas/gn/v20190308",
        ))?;
        assert_eq!(group, "CESM2");
        assert_eq!(version, "v20190308");
        Ok(())
    }
}
