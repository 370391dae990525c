//! Thread pool sizing from the per-worker core layout

use crate::error::{IdsError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of threads (None = use all available)
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// One thread per core across every worker; all-zero layouts fall back
    /// to the rayon default.
    pub fn from_cores(cores: &[usize]) -> Self {
        let total: usize = cores.iter().sum();
        Self {
            n_threads: (total > 0).then_some(total),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.n_threads.unwrap_or_else(rayon::current_num_threads)
    }

    /// Build a dedicated pool; work run through `install` uses it for every
    /// nested rayon call.
    pub fn build_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads())
            .thread_name(|i| format!("kolosal-ids-{}", i))
            .build()
            .map_err(|e| IdsError::invalid_config("threads", self.num_threads(), &e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_from_cores_sums_workers() {
        assert_eq!(ParallelConfig::from_cores(&[4, 0, 2]).n_threads, Some(6));
        assert_eq!(ParallelConfig::from_cores(&[0, 0]).n_threads, None);
    }

    #[test]
    fn test_pool_size() {
        let pool = ParallelConfig::new().with_threads(3).build_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 3);

        let total: u64 = pool.install(|| (0..1000u64).into_par_iter().sum());
        assert_eq!(total, 499_500);
    }
}
