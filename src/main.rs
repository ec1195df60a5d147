//! Entry point for the `cmip-scan` application.
//! Handles CLI parsing, configuration and logging setup, and dispatches the subcommands.

use clap::Parser;
use cmip_scan::{
    decode, init_logging, parse_version_and_variant, write_merged_dataset, CmipScanError, Config,
    HistoricalAssociator, MatchFinder, MergerOptions, NetCDFLoader, ParallelConfig, Result,
    SearchOptions, VariableMerger,
};
use log::{info, LevelFilter};
use std::path::Path;

mod cli;

use cli::{limit, AssociateArgs, Cli, Command, FindArgs, MergeArgs};

fn main() {
    let args = Cli::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;

    // Without -v/-q the configured level applies
    let level = match args.verbosity.log_level_filter() {
        LevelFilter::Info => config.log_level(),
        level => level,
    };
    init_logging(level)?;
    let parallel = match args.threads {
        Some(threads) => ParallelConfig::new(Some(threads)),
        None => ParallelConfig::all_cores(),
    };
    parallel.setup_global_pool()?;

    match args.command {
        Command::Decode { path, version_info } => run_decode(&path, version_info),
        Command::Find(find) => run_find(&config, &find),
        Command::Associate(associate) => run_associate(&config, associate),
        Command::Merge(merge) => run_merge(&config, merge),
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn run_decode(path: &Path, version_info: bool) -> Result<()> {
    let query = decode(path)?;
    for (field, value) in query.fields() {
        println!("{:<15} {value}", field.as_str());
    }
    if version_info {
        let parsed = parse_version_and_variant(path)?;
        println!("{:<15} {}", "grid_version", parsed.grid_version);
        println!("{:<15} {}", "run_variant", parsed.run_variant);
    }
    Ok(())
}

fn run_find(config: &Config, args: &FindArgs) -> Result<()> {
    let options = SearchOptions {
        max_versions: limit(args.max_versions),
        max_members: limit(args.max_members),
        required_file: config.required_file(),
    };
    let finder = MatchFinder::new(options, config.exclusions()?);
    let query = args.query.to_query();
    let found = finder.find_matches(&args.base, &query)?;
    info!("Found {} match(es) for {}", found.len(), query);

    if args.json {
        let json = serde_json::json!({ "query": query, "matches": found });
        let text = serde_json::to_string_pretty(&json)
            .map_err(|e| CmipScanError::Generic(format!("Failed to serialize matches: {e}")))?;
        println!("{text}");
    } else {
        for path in found {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_associate(config: &Config, args: AssociateArgs) -> Result<()> {
    let associator = HistoricalAssociator::new(MatchFinder::from_config(config)?)
        .match_to(args.match_to)
        .activity_id(args.activity_id)
        .look_back_extra(args.look_back_extra)
        .search_overrides(args.overrides)
        .strict(!args.lenient);

    if let Some(found) = associator.associate(None, Some(args.path.as_path()))? {
        for path in found {
            println!("{}", path.display());
        }
    }
    Ok(())
}

fn run_merge(config: &Config, args: MergeArgs) -> Result<()> {
    let options = MergerOptions {
        merge_method: args.merge_method,
        ..MergerOptions::from_config(config)
    };
    let merger = VariableMerger::new(
        NetCDFLoader::new(args.file_name),
        args.masks,
        args.others,
        options,
    )?;
    info!(
        "Common mask selects {} of {} cells",
        merger.common_mask().count(),
        merger.common_mask().data().len()
    );
    let merged = merger.squash_sources()?;

    match args.output {
        Some(output) => {
            write_merged_dataset(&merged, &output)?;
            info!("Saved merged dataset to {}", output.display());
        }
        None => {
            for (name, array) in merged.variables() {
                println!("{name}: dims {:?}, shape {:?}", array.dims, array.shape());
            }
        }
    }
    Ok(())
}
