//! Command-line interface of `cmip-scan`, defined with `clap`.

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use cmip_scan::{PathQuery, QueryField};
use std::path::PathBuf;

/// Find CMIP model output on disk, pair runs across experiments and merge masked variables
#[derive(Parser, Debug)]
#[command(name = "cmip-scan", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML); defaults to $CMIP_SCAN_CONFIG if set
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use for loading and reductions. Defaults to all CPU cores.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a leaf folder into its query fields
    Decode {
        path: PathBuf,

        /// Also print the grid version and run-variant number
        #[arg(long)]
        version_info: bool,
    },

    /// List leaf folders under a base directory matching a query
    Find(FindArgs),

    /// Find the run of another experiment matching the run at PATH
    Associate(AssociateArgs),

    /// Combine masks from several variables and average all variables over them
    Merge(MergeArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    /// Directory holding the activity_id folders
    pub base: PathBuf,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Distinct versions kept per model; 0 for no limit
    #[arg(long, default_value_t = 1)]
    pub max_versions: usize,

    /// Paths kept per version; 0 for no limit
    #[arg(long, default_value_t = 1)]
    pub max_members: usize,

    /// Print the result as JSON instead of one path per line
    #[arg(long)]
    pub json: bool,
}

/// The nine folder levels; unset levels keep their default
#[derive(Args, Debug, Default)]
pub struct QueryArgs {
    #[arg(long)]
    pub activity_id: Option<String>,
    #[arg(long)]
    pub institution_id: Option<String>,
    #[arg(long)]
    pub source_id: Option<String>,
    #[arg(long)]
    pub experiment_id: Option<String>,
    #[arg(long)]
    pub variant_label: Option<String>,
    #[arg(long)]
    pub domain: Option<String>,
    #[arg(long)]
    pub variable_id: Option<String>,
    #[arg(long)]
    pub grid_label: Option<String>,
    #[arg(long)]
    pub version: Option<String>,
}

impl QueryArgs {
    pub fn to_query(&self) -> PathQuery {
        let mut query = PathQuery::default();
        let given = [
            (QueryField::ActivityId, &self.activity_id),
            (QueryField::InstitutionId, &self.institution_id),
            (QueryField::SourceId, &self.source_id),
            (QueryField::ExperimentId, &self.experiment_id),
            (QueryField::VariantLabel, &self.variant_label),
            (QueryField::Domain, &self.domain),
            (QueryField::VariableId, &self.variable_id),
            (QueryField::GridLabel, &self.grid_label),
            (QueryField::Version, &self.version),
        ];
        for (field, value) in given {
            if let Some(value) = value {
                query.set(field, value.as_str());
            }
        }
        query
    }
}

#[derive(Args, Debug)]
pub struct AssociateArgs {
    /// Leaf folder (or a file in it) of the run to associate
    pub path: PathBuf,

    /// Experiment to look for
    #[arg(long, default_value = "piControl")]
    pub match_to: String,

    /// Activity the associated run is filed under
    #[arg(long, default_value = "CMIP")]
    pub activity_id: String,

    /// Extra folders between the search base and the hierarchy
    #[arg(long, default_value_t = 0)]
    pub look_back_extra: usize,

    /// Override a query field before searching, formatted as <field>=<value>
    #[arg(long = "set", value_parser = parse_override)]
    pub overrides: Vec<(QueryField, String)>,

    /// Warn instead of failing on self-association or when nothing is found
    #[arg(long)]
    pub lenient: bool,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Files (or leaf folders) whose masks are combined
    #[arg(long = "mask", required = true)]
    pub masks: Vec<String>,

    /// Files contributing only their variable, not their mask
    #[arg(long = "other")]
    pub others: Vec<String>,

    /// How masks are combined
    #[arg(long, default_value = "logical_or")]
    pub merge_method: String,

    /// Path to save the merged dataset as NetCDF. If not set, prints a summary.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// File read inside folders given as paths
    #[arg(long, default_value = "merged.nc")]
    pub file_name: String,
}

fn parse_override(s: &str) -> Result<(QueryField, String), String> {
    match s.split_once('=') {
        Some((field, value)) => {
            let field = field.trim().parse::<QueryField>().map_err(|e| e.to_string())?;
            Ok((field, value.trim().to_string()))
        }
        None => Err("Invalid format: Expected '<field>=<value>'.".to_string()),
    }
}

/// Zero means no limit
pub fn limit(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("grid_label=*"),
            Ok((QueryField::GridLabel, "*".to_string()))
        );
        assert!(parse_override("grid_label").is_err());
        assert!(parse_override("grid=gn").is_err());
    }

    #[test]
    fn test_find_arguments() {
        let cli = Cli::parse_from([
            "cmip-scan",
            "find",
            "/data",
            "--source-id",
            "CESM2",
            "--max-versions",
            "0",
        ]);
        match cli.command {
            Command::Find(args) => {
                let query = args.query.to_query();
                assert_eq!(query.source_id, "CESM2");
                assert_eq!(query.activity_id, "ScenarioMIP");
                assert_eq!(limit(args.max_versions), None);
                assert_eq!(limit(args.max_members), Some(1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
