//! Turns an asset graph into a bundle graph.
//!
//! The pipeline is strictly sequential and single-threaded: [`primary`]
//! opens bundles and bundle groups at the graph's explicit split points,
//! [`optimizer`] rewrites that output to respect size and request budgets,
//! and [`wrap`] propagates a `shouldWrap` marking back onto the assets that
//! need it. Each stage mutates the shared [`bundle_graph::BundleGraph`] in
//! place; later stages observe only the previous stage's output, never the
//! original asset graph's pre-bundling shape.
//!
//! ```no_run
//! use bundle_graph_core::{Bundling, BundlerConfig};
//! use bundle_graph_core::asset_graph::AssetGraph;
//!
//! let mut asset_graph = AssetGraph::new();
//! // ... populate `asset_graph` with assets, dependencies and entries ...
//! let bundle_graph = Bundling::new(BundlerConfig::default()).run(&mut asset_graph)?;
//! # Ok::<(), bundle_graph_core::error::BundlingError>(())
//! ```

pub mod asset;
pub mod asset_graph;
pub mod bundle;
pub mod bundle_graph;
pub mod bundle_group;
pub mod config;
pub mod dependency;
pub mod error;
pub mod hash;
pub mod meta;
pub mod optimizer;
pub mod primary;
pub mod target;
pub mod wrap;

pub use asset_graph::AssetGraph;
pub use bundle_graph::BundleGraph;
pub use config::BundlerConfig;
pub use error::{BundlingError, Result};

use optimizer::OptimizingBundler;
use primary::PrimaryBundler;
use wrap::WrapMarker;

/// Entry point wiring the three passes together. Construct once per build
/// with a [`BundlerConfig`] and call [`Bundling::run`] against each asset
/// graph that build produces.
pub struct Bundling {
    config: BundlerConfig,
}

impl Bundling {
    pub fn new(config: BundlerConfig) -> Self {
        Self { config }
    }

    /// Runs PrimaryBundler, then OptimizingBundler, then WrapMarker over
    /// `asset_graph`, returning the finished bundle graph. `asset_graph`
    /// stays borrowed mutably for the bundle graph's lifetime, since
    /// [`wrap::WrapMarker`] is the one place the core writes back to it
    /// (`meta.shouldWrap`, per §5).
    #[tracing::instrument(skip(self, asset_graph), name = "bundling")]
    pub fn run<'a>(&self, asset_graph: &'a mut AssetGraph) -> Result<BundleGraph<'a>> {
        let mut bundle_graph = PrimaryBundler::new().run(asset_graph)?;
        OptimizingBundler::new(&self.config).run(&mut bundle_graph)?;
        WrapMarker::new().run(&mut bundle_graph);
        bundle_graph.check_invariants()?;
        Ok(bundle_graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset::Asset;
    use dependency::Dependency;
    use target::{Environment, EnvironmentContext, Target};

    fn env() -> Environment {
        Environment::new(EnvironmentContext::Browser)
    }

    fn target() -> Target {
        Target::new(env(), "dist", "/")
    }

    #[test]
    fn full_pipeline_runs_end_to_end() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let b = ag.add_asset(Asset::new("b", "js", env(), 10));
        let style = ag.add_asset(Asset::new("style", "css", env(), 10));
        ag.add_dependency(a, b, Dependency::new());
        ag.add_dependency(a, style, Dependency::new());
        ag.add_entry(a, Dependency::entry(target()));

        let bundle_graph = Bundling::new(BundlerConfig::default()).run(&mut ag).unwrap();
        assert_eq!(bundle_graph.bundle_ids().count(), 2);
        assert!(bundle_graph.find_bundles_with_asset(b)[0] == bundle_graph.find_bundles_with_asset(a)[0]);
    }
}
