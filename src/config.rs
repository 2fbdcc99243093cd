use std::time::Duration;

use crate::call::SearchBounds;
use crate::node::CachePolicy;

/// Graph-wide settings, fixed when the graph is created.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Under [`CachePolicy::Auto`], results that took less than this are recomputed on demand.
    pub min_seconds_for_cache: Duration,
    /// Under [`CachePolicy::Auto`], results bigger than this per second of compute time are
    /// not worth keeping.
    pub max_bytes_per_second: f64,
    pub default_cache_policy: CachePolicy,
    /// How deep into literal sequences sources still count as data.
    pub max_source_search_depth: usize,
    /// How long a literal sequence may be for sources in it to still count as data.
    pub max_source_search_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        let bounds = SearchBounds::default();
        Self {
            min_seconds_for_cache: Duration::from_millis(1),
            max_bytes_per_second: 1e9,
            default_cache_policy: CachePolicy::Auto,
            max_source_search_depth: bounds.depth,
            max_source_search_length: bounds.length,
        }
    }
}

impl Config {
    pub(crate) fn search_bounds(&self) -> SearchBounds {
        SearchBounds {
            depth: self.max_source_search_depth,
            length: self.max_source_search_length,
        }
    }

    /// Whether a result of `bytes` that took `elapsed` to compute is worth caching.
    pub(crate) fn worth_caching(&self, elapsed: Duration, bytes: usize) -> bool {
        if elapsed <= self.min_seconds_for_cache {
            return false;
        }
        (bytes as f64 / elapsed.as_secs_f64()) < self.max_bytes_per_second
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn auto_caching_thresholds() {
        let config = Config::default();
        assert!(!config.worth_caching(Duration::from_micros(10), 8));
        assert!(config.worth_caching(Duration::from_millis(50), 1024));
        assert!(!config.worth_caching(Duration::from_millis(2), 10_000_000));
    }
}
