use serde::{Deserialize, Serialize};

/// Tunables for [`crate::optimizer::OptimizingBundler`]. Defaults match §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// Minimum number of bundles an asset must appear in (beyond its own
    /// bundle) before it's a candidate for shared-bundle extraction.
    pub min_bundles: usize,
    /// Minimum combined size, in bytes, a shared-bundle candidate must reach
    /// before it's actually extracted.
    pub min_bundle_size: u64,
    /// Maximum number of bundles a single bundle group may hold; the network
    /// request budget the optimizer respects when hoisting or extracting.
    pub max_parallel_requests: usize,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            min_bundles: 1,
            min_bundle_size: 30_000,
            max_parallel_requests: 5,
        }
    }
}

impl BundlerConfig {
    pub fn min_bundles(mut self, value: usize) -> Self {
        self.min_bundles = value;
        self
    }

    pub fn min_bundle_size(mut self, value: u64) -> Self {
        self.min_bundle_size = value;
        self
    }

    pub fn max_parallel_requests(mut self, value: usize) -> Self {
        self.max_parallel_requests = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = BundlerConfig::default();
        assert_eq!(config.min_bundles, 1);
        assert_eq!(config.min_bundle_size, 30_000);
        assert_eq!(config.max_parallel_requests, 5);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let config = BundlerConfig::default().max_parallel_requests(8).min_bundle_size(1_000);
        assert_eq!(config.max_parallel_requests, 8);
        assert_eq!(config.min_bundle_size, 1_000);
        assert_eq!(config.min_bundles, 1);
    }
}
