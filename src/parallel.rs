//! Thread pool configuration
//!
//! Mask files are loaded and spatial means computed on Rayon's global pool.
//! [`ParallelConfig`] sizes that pool once per process.

use crate::errors::{CmipScanError, Result};
use log::{debug, info};
use rayon::ThreadPoolBuilder;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Worker threads; `None` leaves Rayon's default in place
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    #[must_use]
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Use every available CPU core
    #[must_use]
    pub fn all_cores() -> Self {
        Self::new(Some(num_cpus::get()))
    }

    /// Set up the global Rayon thread pool.
    ///
    /// # Errors
    ///
    /// Fails if a thread count of zero is requested or the global pool was
    /// already built.
    pub fn setup_global_pool(&self) -> Result<()> {
        match self.num_threads {
            Some(0) => Err(CmipScanError::ThreadPoolError(
                "the number of threads must be at least 1".to_string(),
            )),
            Some(num_threads) => {
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build_global()
                    .map_err(|e| {
                        CmipScanError::ThreadPoolError(format!(
                            "Failed to initialize thread pool with {num_threads} threads: {e}"
                        ))
                    })?;
                info!("Configured parallel processing with {num_threads} threads");
                Ok(())
            }
            None => {
                debug!(
                    "Using default thread pool with {} threads",
                    rayon::current_num_threads()
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_threads_rejected() {
        let config = ParallelConfig::new(Some(0));
        assert!(matches!(
            config.setup_global_pool(),
            Err(CmipScanError::ThreadPoolError(_))
        ));
    }

    #[test]
    fn test_all_cores() {
        assert_eq!(ParallelConfig::all_cores().num_threads, Some(num_cpus::get()));
        assert_eq!(ParallelConfig::default().num_threads, None);
    }
}
