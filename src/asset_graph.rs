use crate::asset::Asset;
use crate::dependency::Dependency;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::Graph;

/// Stable identity of an asset within an [`AssetGraph`]. A thin newtype over
/// the underlying `petgraph` index so callers never have to reach into
/// `petgraph` directly.
pub type AssetId = NodeIndex;

/// Stable identity of a dependency edge within an [`AssetGraph`].
pub type DependencyId = EdgeIndex;

/// The read-only input to the bundling core: a directed graph of assets
/// connected by dependencies, plus the set of entry points that seed
/// [`crate::primary::PrimaryBundler`].
///
/// Everything here is produced upstream (resolution, parsing, transforms —
/// all out of scope for this crate) and is never mutated by the core, save
/// for `meta` on assets and dependencies.
#[derive(Debug, Default)]
pub struct AssetGraph {
    graph: Graph<Asset, Dependency>,
    entries: Vec<(AssetId, Dependency)>,
}

impl AssetGraph {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            entries: Vec::new(),
        }
    }

    pub fn add_asset(&mut self, asset: Asset) -> AssetId {
        self.graph.add_node(asset)
    }

    pub fn add_dependency(&mut self, from: AssetId, to: AssetId, dependency: Dependency) -> DependencyId {
        self.graph.add_edge(from, to, dependency)
    }

    /// Declare `asset` as a top-level entry, reached by a synthetic
    /// [`Dependency`] with no source asset. `entry_dependency.is_entry` is
    /// forced to `true` and it must carry a `target` or
    /// [`crate::primary::PrimaryBundler`] raises `MissingTarget`.
    pub fn add_entry(&mut self, asset: AssetId, mut entry_dependency: Dependency) {
        entry_dependency.is_entry = true;
        self.entries.push((asset, entry_dependency));
    }

    pub fn entries(&self) -> &[(AssetId, Dependency)] {
        &self.entries
    }

    pub fn asset(&self, id: AssetId) -> &Asset {
        &self.graph[id]
    }

    pub fn asset_mut(&mut self, id: AssetId) -> &mut Asset {
        &mut self.graph[id]
    }

    pub fn dependency(&self, id: DependencyId) -> &Dependency {
        &self.graph[id]
    }

    pub fn dependency_mut(&mut self, id: DependencyId) -> &mut Dependency {
        &mut self.graph[id]
    }

    /// Outgoing (asset, dependency) edges of `asset`, in declaration order —
    /// DFS order over the asset graph must respect this to stay deterministic.
    ///
    /// `petgraph` prepends each new edge to the node's adjacency list, so
    /// `Graph::edges` itself yields edges in *reverse* insertion order;
    /// reverse it back here so callers see dependencies in the order they
    /// were declared.
    pub fn outgoing(&self, asset: AssetId) -> impl Iterator<Item = (DependencyId, AssetId)> + '_ {
        self.graph
            .edges(asset)
            .map(|edge| (edge.id(), edge.target()))
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
    }

    pub fn dependency_endpoints(&self, dep: DependencyId) -> Option<(AssetId, AssetId)> {
        self.graph.edge_endpoints(dep)
    }

    pub fn find_dependency(&self, from: AssetId, to: AssetId) -> Option<DependencyId> {
        self.graph.find_edge(from, to)
    }

    pub(crate) fn inner(&self) -> &Graph<Asset, Dependency> {
        &self.graph
    }

    /// Every asset reachable from `root` (root excluded), stopping at (but
    /// not descending past) any node in `boundaries`.
    pub fn reachable_excluding(
        &self,
        root: AssetId,
        boundaries: &indexmap::IndexSet<AssetId>,
    ) -> indexmap::IndexSet<AssetId> {
        use petgraph::visit::{depth_first_search, Control, DfsEvent};

        let mut reached = indexmap::IndexSet::new();
        depth_first_search(&self.graph, Some(root), |event| {
            if let DfsEvent::Discover(n, _) = event {
                if n == root {
                    return Control::Continue;
                }
                if boundaries.contains(&n) {
                    return Control::<()>::Prune;
                }
                reached.insert(n);
            }
            Control::Continue
        });
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{Environment, EnvironmentContext};

    fn env() -> Environment {
        Environment::new(EnvironmentContext::Browser)
    }

    #[test]
    fn outgoing_preserves_declaration_order() {
        let mut g = AssetGraph::new();
        let a = g.add_asset(Asset::new("a", "js", env(), 10));
        let b = g.add_asset(Asset::new("b", "js", env(), 10));
        let c = g.add_asset(Asset::new("c", "js", env(), 10));
        g.add_dependency(a, c, Dependency::new());
        g.add_dependency(a, b, Dependency::new());

        let order: Vec<AssetId> = g.outgoing(a).map(|(_, to)| to).collect();
        assert_eq!(order, vec![c, b]);
    }
}
