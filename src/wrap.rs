use crate::asset_graph::AssetId;
use crate::bundle::BundleId;
use crate::bundle_graph::BundleGraph;
use indexmap::IndexSet;

/// Final pass of the pipeline: propagates `meta.shouldWrap` from dependency
/// edges down onto the assets they resolve to, transitively, within each
/// bundle's own dependency subgraph. Produces a downward-closed marking —
/// once an asset is marked, every asset reachable from it within the same
/// bundle is marked too.
pub struct WrapMarker;

impl WrapMarker {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip(self, bundle_graph), name = "wrap_marker")]
    pub fn run(&self, bundle_graph: &mut BundleGraph<'_>) {
        for bundle_id in bundle_graph.bundle_ids().collect::<Vec<_>>() {
            self.mark_bundle(bundle_graph, bundle_id);
        }
    }

    fn mark_bundle(&self, bundle_graph: &mut BundleGraph<'_>, bundle_id: BundleId) {
        let roots: Vec<AssetId> = bundle_graph.bundle(bundle_id).main_entries().collect();
        let mut visited: IndexSet<(AssetId, bool)> = IndexSet::new();
        for root in roots {
            self.visit(bundle_graph, bundle_id, root, false, &mut visited);
        }
    }

    /// `inherited` is true once any ancestor dependency on this path carried
    /// `meta.shouldWrap`. Each `(asset, inherited)` pair is visited at most
    /// once — an asset reachable both ways is revisited under `true` if the
    /// `false` visit already happened, since that's strictly more marking.
    fn visit(
        &self,
        bundle_graph: &mut BundleGraph<'_>,
        bundle_id: BundleId,
        asset: AssetId,
        inherited: bool,
        visited: &mut IndexSet<(AssetId, bool)>,
    ) {
        if !bundle_graph.bundle(bundle_id).has_asset(asset) {
            return;
        }
        if !visited.insert((asset, inherited)) {
            return;
        }

        let deps: Vec<_> = bundle_graph.asset_graph().outgoing(asset).collect();
        for (dep_id, target) in deps {
            let dep_should_wrap = bundle_graph.asset_graph().dependency(dep_id).meta.should_wrap();
            let should_wrap = inherited || dep_should_wrap;
            if should_wrap {
                bundle_graph.asset_graph_mut().asset_mut(target).meta.set_should_wrap(true);
            }
            self.visit(bundle_graph, bundle_id, target, should_wrap, visited);
        }
    }
}

impl Default for WrapMarker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use crate::asset_graph::AssetGraph;
    use crate::dependency::Dependency;
    use crate::primary::PrimaryBundler;
    use crate::target::{Environment, EnvironmentContext, Target};

    fn env() -> Environment {
        Environment::new(EnvironmentContext::Browser)
    }

    fn target() -> Target {
        Target::new(env(), "dist", "/")
    }

    #[test]
    fn wrap_propagates_transitively_and_nowhere_else() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let b = ag.add_asset(Asset::new("b", "js", env(), 10));
        let c = ag.add_asset(Asset::new("c", "js", env(), 10));
        let d = ag.add_asset(Asset::new("d", "js", env(), 10));
        ag.add_dependency(a, b, Dependency::new().with_should_wrap(true));
        ag.add_dependency(b, c, Dependency::new());
        ag.add_dependency(a, d, Dependency::new());
        ag.add_entry(a, Dependency::entry(target()));

        let mut bundle_graph = PrimaryBundler::new().run(&mut ag).unwrap();
        WrapMarker::new().run(&mut bundle_graph);

        assert!(!bundle_graph.asset_graph().asset(a).meta.should_wrap());
        assert!(bundle_graph.asset_graph().asset(b).meta.should_wrap());
        assert!(bundle_graph.asset_graph().asset(c).meta.should_wrap());
        assert!(!bundle_graph.asset_graph().asset(d).meta.should_wrap());
    }
}
