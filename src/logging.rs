//! Logger setup for the command line tool
//!
//! The library only talks to the `log` facade; the binary installs a `log4rs`
//! console logger on stderr so that stdout stays reserved for results.

use crate::errors::{CmipScanError, Result};
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

const LOG_PATTERN: &str = "{d(%m-%d %H:%M)} | {M:<12.12} | {h({l:<5})} | {m} | (l. {L}){n}";

/// Install the process-wide logger at `level`
pub fn init_logging(level: log::LevelFilter) -> Result<()> {
    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .target(Target::Stderr)
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| CmipScanError::Generic(format!("Failed to configure logger: {e}")))?;

    log4rs::init_config(config)
        .map_err(|e| CmipScanError::Generic(format!("Failed to initialize logger: {e}")))?;
    Ok(())
}
