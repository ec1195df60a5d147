//! Association of a scenario run with its control or historical counterpart
//!
//! The path of a dataset is decoded into a [`PathQuery`], its experiment is
//! swapped for the one to associate with, and [`MatchFinder`] is queried. When
//! nothing turns up the query is relaxed step by step (see
//! [`default_query_updates`]) and the search repeated.

use crate::dataset::Dataset;
use crate::errors::{CmipScanError, Result};
use crate::matches::MatchFinder;
use crate::path_codec::{base_from, decode, PathQuery, QueryField, WILDCARD};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// One relaxation step: field overrides applied on top of the previous steps
pub type QueryUpdate = Vec<(QueryField, String)>;

/// Try as-is, then any variant, then any version, then any grid
///
/// Relaxing the grid may pair runs on different grids.
#[must_use]
pub fn default_query_updates() -> Vec<QueryUpdate> {
    vec![
        Vec::new(),
        vec![(QueryField::VariantLabel, WILDCARD.to_string())],
        vec![(QueryField::Version, WILDCARD.to_string())],
        vec![(QueryField::GridLabel, WILDCARD.to_string())],
    ]
}

/// Finds the matching run of another experiment for a given dataset
#[derive(Debug, Clone)]
pub struct HistoricalAssociator {
    finder: MatchFinder,
    match_to: String,
    activity_id: String,
    look_back_extra: usize,
    query_updates: Vec<QueryUpdate>,
    search_overrides: QueryUpdate,
    strict: bool,
}

impl Default for HistoricalAssociator {
    fn default() -> Self {
        Self::new(MatchFinder::default())
    }
}

impl HistoricalAssociator {
    /// Associate with `piControl` under the `CMIP` activity, strictly
    #[must_use]
    pub fn new(finder: MatchFinder) -> Self {
        Self {
            finder,
            match_to: "piControl".to_string(),
            activity_id: "CMIP".to_string(),
            look_back_extra: 0,
            query_updates: default_query_updates(),
            search_overrides: Vec::new(),
            strict: true,
        }
    }

    #[must_use]
    pub fn match_to<S: Into<String>>(mut self, experiment_id: S) -> Self {
        self.match_to = experiment_id.into();
        self
    }

    #[must_use]
    pub fn activity_id<S: Into<String>>(mut self, activity_id: S) -> Self {
        self.activity_id = activity_id.into();
        self
    }

    /// Extra folders to strip when deriving the search base from the path
    #[must_use]
    pub fn look_back_extra(mut self, n: usize) -> Self {
        self.look_back_extra = n;
        self
    }

    #[must_use]
    pub fn query_updates(mut self, updates: Vec<QueryUpdate>) -> Self {
        self.query_updates = updates;
        self
    }

    /// Overrides applied once, before the first search
    #[must_use]
    pub fn search_overrides(mut self, overrides: QueryUpdate) -> Self {
        self.search_overrides = overrides;
        self
    }

    /// When false, self-association and an exhausted search only warn
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Find the associated run for `dataset` or `path`.
    ///
    /// An explicit `path` takes precedence over the path recorded in the
    /// dataset. Returns `Ok(None)` only in non-strict mode when every
    /// relaxation step came up empty.
    ///
    /// # Errors
    ///
    /// - [`CmipScanError::InvalidInput`] if no path can be determined, or in
    ///   strict mode if the run already belongs to the target experiment
    /// - [`CmipScanError::NotFound`] in strict mode if nothing matches
    /// - anything [`MatchFinder::find_matches`] or [`decode`] returns
    pub fn associate(
        &self,
        dataset: Option<&Dataset>,
        path: Option<&Path>,
    ) -> Result<Option<Vec<PathBuf>>> {
        let path = match (path, dataset.and_then(Dataset::recorded_path)) {
            (Some(path), _) => path.to_path_buf(),
            (None, Some(recorded)) => recorded,
            (None, None) => {
                return Err(CmipScanError::invalid_input(
                    "No dataset, no path, can't match if I don't know what I'm looking for",
                ))
            }
        };
        self.associate_path(&path)
    }

    /// [`HistoricalAssociator::associate`] for a known leaf folder
    pub fn associate_path(&self, path: &Path) -> Result<Option<Vec<PathBuf>>> {
        let base = base_from(path, self.look_back_extra)?;
        let mut search = decode(path)?;
        search.set(QueryField::ActivityId, self.activity_id.as_str());

        if search.experiment_id == self.match_to {
            let message = format!("Cannot match {} to itself!", self.match_to);
            if self.strict {
                return Err(CmipScanError::invalid_input(message));
            }
            warn!("{message}");
        }
        search.set(QueryField::ExperimentId, self.match_to.as_str());
        search.update(&self.search_overrides);

        for (try_n, update) in self.query_updates.iter().enumerate() {
            if try_n > 0 {
                info!(
                    "No results after {try_n} tries, retrying with {}",
                    describe(update)
                );
            }
            search.update(update);
            let found = self.finder.find_matches(&base, &search)?;
            if !found.is_empty() {
                debug!("Associated {} with {} path(s)", path.display(), found.len());
                return Ok(Some(found));
            }
        }

        let message = format!("Looked for {search}, in {} found nothing", base.display());
        if self.strict {
            return Err(CmipScanError::NotFound { message });
        }
        warn!("{message}");
        Ok(None)
    }

    /// The query a search for `path` would start with, before any relaxation
    pub fn initial_query(&self, path: &Path) -> Result<PathQuery> {
        let mut search = decode(path)?;
        search.set(QueryField::ActivityId, self.activity_id.as_str());
        search.set(QueryField::ExperimentId, self.match_to.as_str());
        search.update(&self.search_overrides);
        Ok(search)
    }
}

fn describe(update: &[(QueryField, String)]) -> String {
    if update.is_empty() {
        return "no changes".to_string();
    }
    update
        .iter()
        .map(|(field, value)| format!("{field}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str =
        "/data/ScenarioMIP/MPI-M/MPI-ESM1-2-LR/ssp585/r1i1p1f1/Ayear/tas/gn/v20190710";

    #[test]
    fn test_needs_a_path() {
        let associator = HistoricalAssociator::default();
        assert!(matches!(
            associator.associate(None, None),
            Err(CmipScanError::InvalidInput { .. })
        ));
        // A dataset without a recorded path is no better
        let dataset = Dataset::new();
        assert!(matches!(
            associator.associate(Some(&dataset), None),
            Err(CmipScanError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_initial_query() -> Result<()> {
        let query = HistoricalAssociator::default()
            .search_overrides(vec![(QueryField::Domain, "Amon".to_string())])
            .initial_query(Path::new(SCENARIO))?;
        assert_eq!(query.activity_id, "CMIP");
        assert_eq!(query.experiment_id, "piControl");
        assert_eq!(query.source_id, "MPI-ESM1-2-LR");
        assert_eq!(query.domain, "Amon");
        assert_eq!(query.version, "v20190710");
        Ok(())
    }

    #[test]
    fn test_self_match_is_rejected_when_strict() {
        let associator = HistoricalAssociator::default().match_to("ssp585");
        match associator.associate(None, Some(Path::new(SCENARIO))) {
            Err(CmipScanError::InvalidInput { message }) => {
                assert_eq!(message, "Cannot match ssp585 to itself!");
            }
            other => panic!("expected an input error, got {other:?}"),
        }
    }

    #[test]
    fn test_describe_update() {
        assert_eq!(describe(&[]), "no changes");
        assert_eq!(
            describe(&default_query_updates()[1]),
            "variant_label=*"
        );
    }
}
