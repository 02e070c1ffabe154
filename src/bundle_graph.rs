use crate::asset::AssetType;
use crate::asset_graph::{AssetGraph, AssetId, DependencyId};
use crate::bundle::{Bundle, BundleId};
use crate::bundle_group::{BundleGroup, BundleGroupId};
use crate::error::{BundlingError, Result};
use crate::target::{Environment, Target};
use indexmap::{IndexMap, IndexSet};

/// Parameters for [`BundleGraph::create_bundle`], mirroring the host's
/// `createBundle({entryAsset|uniqueKey, type, env, target, isEntry, isInline,
/// isSplittable})` call.
pub struct NewBundle {
    pub entry_asset: Option<AssetId>,
    pub unique_key: Option<String>,
    pub bundle_type: AssetType,
    pub env: Environment,
    pub target: Target,
    pub is_entry: bool,
    pub is_inline: bool,
    pub is_splittable: bool,
}

impl NewBundle {
    pub fn for_asset(entry_asset: AssetId, bundle_type: AssetType, env: Environment, target: Target) -> Self {
        Self {
            entry_asset: Some(entry_asset),
            unique_key: None,
            bundle_type,
            env,
            target,
            is_entry: false,
            is_inline: false,
            is_splittable: true,
        }
    }
}

/// What an async dependency's `resolveExternalDependency` call returns
/// before (or absent) internalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalResolution {
    BundleGroup(BundleGroupId),
    Asset(AssetId),
}

/// Whether a content-traversal callback should keep descending into an
/// asset's dependencies or stop at this node (§4.2 step 3's "skip that
/// asset's children").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentControl {
    Continue,
    SkipChildren,
}

/// The mutable output structure the three passes rewrite in place: §6's
/// `MutableBundleGraph` façade, concretely implemented as an arena of
/// bundles/groups addressed by stable indices, alongside the many-to-many
/// membership and containment relations between them.
///
/// All relations are backed by `indexmap` so iteration order is a
/// deterministic function of insertion order, which is what lets the DFS
/// passes produce structurally identical graphs across runs (§8 property 6).
pub struct BundleGraph<'a> {
    asset_graph: &'a mut AssetGraph,
    bundles: Vec<Bundle>,
    bundle_groups: Vec<BundleGroup>,
    removed_groups: IndexSet<BundleGroupId>,

    /// group -> member bundles
    membership: IndexMap<BundleGroupId, IndexSet<BundleId>>,
    /// bundle -> groups it's a member of
    bundle_to_groups: IndexMap<BundleId, IndexSet<BundleGroupId>>,
    /// asset -> bundles containing it
    asset_to_bundles: IndexMap<AssetId, IndexSet<BundleId>>,

    /// dependency -> bundle group it opened (async/type/isolated splits)
    group_by_entry_dependency: IndexMap<DependencyId, BundleGroupId>,
    /// dependency -> asset it was pointed at by `createAssetReference`
    asset_references: IndexMap<DependencyId, AssetId>,
    /// (bundle, dependency) pairs internalized by step 4
    internalized: IndexSet<(BundleId, DependencyId)>,
}

impl<'a> BundleGraph<'a> {
    pub fn new(asset_graph: &'a mut AssetGraph) -> Self {
        Self {
            asset_graph,
            bundles: Vec::new(),
            bundle_groups: Vec::new(),
            removed_groups: IndexSet::new(),
            membership: IndexMap::new(),
            bundle_to_groups: IndexMap::new(),
            asset_to_bundles: IndexMap::new(),
            group_by_entry_dependency: IndexMap::new(),
            asset_references: IndexMap::new(),
            internalized: IndexSet::new(),
        }
    }

    pub fn asset_graph(&self) -> &AssetGraph {
        self.asset_graph
    }

    /// The sole sanctioned mutation of the otherwise-read-only asset graph:
    /// [`crate::wrap::WrapMarker`] writes `meta.shouldWrap` through this.
    pub fn asset_graph_mut(&mut self) -> &mut AssetGraph {
        self.asset_graph
    }

    // ---------------------------------------------------------------- mutations

    pub fn create_bundle_group(&mut self, entry_dependency: Option<DependencyId>, target: Target) -> BundleGroupId {
        let id = BundleGroupId(self.bundle_groups.len());
        self.bundle_groups.push(BundleGroup {
            id,
            entry_dependency,
            target,
        });
        if let Some(dep) = entry_dependency {
            self.group_by_entry_dependency.insert(dep, id);
        }
        self.membership.insert(id, IndexSet::new());
        id
    }

    pub fn create_bundle(&mut self, params: NewBundle) -> BundleId {
        let id = BundleId(self.bundles.len());
        let mut main_entries = IndexSet::new();
        if let Some(entry) = params.entry_asset {
            main_entries.insert(entry);
        }
        self.bundles.push(Bundle {
            id,
            bundle_type: params.bundle_type,
            env: params.env,
            target: params.target,
            is_entry: params.is_entry,
            is_inline: params.is_inline,
            is_splittable: params.is_splittable,
            unique_key: params.unique_key,
            main_entries,
            assets: IndexSet::new(),
        });
        self.bundle_to_groups.insert(id, IndexSet::new());
        id
    }

    pub fn add_bundle_to_bundle_group(&mut self, bundle: BundleId, group: BundleGroupId) {
        self.membership.entry(group).or_default().insert(bundle);
        self.bundle_to_groups.entry(bundle).or_default().insert(group);
    }

    /// Adds `asset` and everything reachable from it (stopping at any other
    /// bundle's main entry, so we never cross a split point) to `bundle`.
    pub fn add_asset_graph_to_bundle(&mut self, asset: AssetId, bundle: BundleId) {
        let boundaries = self.other_bundle_roots(bundle);
        let mut subgraph = self.asset_graph.reachable_excluding(asset, &boundaries);
        subgraph.insert(asset);

        for &a in &subgraph {
            let bundle_data = &mut self.bundles[bundle.0];
            if bundle_data.assets.insert(a) {
                self.asset_to_bundles.entry(a).or_default().insert(bundle);
            }
        }
    }

    /// Inverse of [`Self::add_asset_graph_to_bundle`]: removes `asset` and
    /// its reachable subgraph from `bundle`.
    pub fn remove_asset_graph_from_bundle(&mut self, asset: AssetId, bundle: BundleId) {
        let boundaries = self.other_bundle_roots(bundle);
        let mut subgraph = self.asset_graph.reachable_excluding(asset, &boundaries);
        subgraph.insert(asset);

        for &a in &subgraph {
            let bundle_data = &mut self.bundles[bundle.0];
            if bundle_data.assets.shift_remove(&a) {
                if let Some(bundles) = self.asset_to_bundles.get_mut(&a) {
                    bundles.shift_remove(&bundle);
                }
            }
        }
    }

    pub fn create_asset_reference(&mut self, dep: DependencyId, asset: AssetId) {
        self.asset_references.insert(dep, asset);
    }

    pub fn internalize_async_dependency(&mut self, bundle: BundleId, dep: DependencyId) {
        self.internalized.insert((bundle, dep));
    }

    pub fn is_internalized(&self, bundle: BundleId, dep: DependencyId) -> bool {
        self.internalized.contains(&(bundle, dep))
    }

    pub fn remove_bundle_group(&mut self, group: BundleGroupId) {
        if let Some(bundles) = self.membership.get(&group).cloned() {
            for bundle in bundles {
                if let Some(groups) = self.bundle_to_groups.get_mut(&bundle) {
                    groups.shift_remove(&group);
                }
            }
        }
        self.membership.shift_remove(&group);
        self.removed_groups.insert(group);
    }

    /// The main-entry assets of every bundle other than `bundle` — used as
    /// DFS boundaries so one bundle's subgraph attach never swallows another
    /// bundle's root.
    fn other_bundle_roots(&self, bundle: BundleId) -> IndexSet<AssetId> {
        self.bundles
            .iter()
            .filter(|b| b.id != bundle)
            .flat_map(|b| b.main_entries.iter().copied())
            .collect()
    }

    // ------------------------------------------------------------------ queries

    pub fn bundle(&self, id: BundleId) -> &Bundle {
        &self.bundles[id.0]
    }

    pub fn bundle_mut(&mut self, id: BundleId) -> &mut Bundle {
        &mut self.bundles[id.0]
    }

    pub fn bundle_group(&self, id: BundleGroupId) -> Option<&BundleGroup> {
        if self.removed_groups.contains(&id) {
            return None;
        }
        self.bundle_groups.get(id.0)
    }

    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.iter()
    }

    pub fn bundle_ids(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.bundles.iter().map(|b| b.id)
    }

    pub fn bundle_group_ids(&self) -> impl Iterator<Item = BundleGroupId> + '_ {
        self.bundle_groups
            .iter()
            .map(|g| g.id)
            .filter(move |id| !self.removed_groups.contains(id))
    }

    pub fn get_dependency_assets(&self, dep: DependencyId) -> Vec<AssetId> {
        self.asset_graph
            .dependency_endpoints(dep)
            .map(|(_, to)| vec![to])
            .unwrap_or_default()
    }

    pub fn get_dependency_resolution(&self, dep: DependencyId, _bundle: Option<BundleId>) -> Option<AssetId> {
        self.asset_graph.dependency_endpoints(dep).map(|(_, to)| to)
    }

    pub fn resolve_external_dependency(&self, dep: DependencyId) -> Option<ExternalResolution> {
        if let Some(&group) = self.group_by_entry_dependency.get(&dep) {
            return Some(ExternalResolution::BundleGroup(group));
        }
        if let Some(&asset) = self.asset_references.get(&dep) {
            return Some(ExternalResolution::Asset(asset));
        }
        None
    }

    pub fn find_bundles_with_asset(&self, asset: AssetId) -> Vec<BundleId> {
        self.asset_to_bundles
            .get(&asset)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn find_bundles_with_dependency(&self, dep: DependencyId) -> Vec<BundleId> {
        match self.asset_graph.dependency_endpoints(dep) {
            Some((source, _)) => self.find_bundles_with_asset(source),
            None => Vec::new(),
        }
    }

    pub fn get_bundle_groups_containing_bundle(&self, bundle: BundleId) -> Vec<BundleGroupId> {
        self.bundle_to_groups
            .get(&bundle)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn get_bundles_in_bundle_group(&self, group: BundleGroupId) -> Vec<BundleId> {
        self.membership
            .get(&group)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Bundles containing the asset whose dependency opened `group` — empty
    /// for a group opened directly from an [`AssetGraph`] entry.
    pub fn get_parent_bundles_of_bundle_group(&self, group: BundleGroupId) -> Vec<BundleId> {
        let Some(bundle_group) = self.bundle_group(group) else {
            return Vec::new();
        };
        let Some(dep) = bundle_group.entry_dependency else {
            return Vec::new();
        };
        match self.asset_graph.dependency_endpoints(dep) {
            Some((source, _)) => self.find_bundles_with_asset(source),
            None => Vec::new(),
        }
    }

    pub fn get_sibling_bundles(&self, bundle: BundleId) -> Vec<BundleId> {
        let mut siblings = IndexSet::new();
        for group in self.get_bundle_groups_containing_bundle(bundle) {
            for member in self.get_bundles_in_bundle_group(group) {
                if member != bundle {
                    siblings.insert(member);
                }
            }
        }
        siblings.into_iter().collect()
    }

    /// Walks up the bundle-group parent chain from `bundle` and reports
    /// whether any ancestor bundle already contains `asset`.
    pub fn is_asset_in_ancestor_bundles(&self, bundle: BundleId, asset: AssetId) -> bool {
        let mut visited = IndexSet::new();
        let mut stack: Vec<BundleId> = self
            .get_bundle_groups_containing_bundle(bundle)
            .into_iter()
            .flat_map(|g| self.get_parent_bundles_of_bundle_group(g))
            .collect();

        while let Some(candidate) = stack.pop() {
            if !visited.insert(candidate) {
                continue;
            }
            if self.bundle(candidate).has_asset(asset) {
                return true;
            }
            stack.extend(
                self.get_bundle_groups_containing_bundle(candidate)
                    .into_iter()
                    .flat_map(|g| self.get_parent_bundles_of_bundle_group(g)),
            );
        }
        false
    }

    pub fn get_total_size(&self, asset: AssetId) -> u64 {
        self.asset_graph.asset(asset).size
    }

    /// Defensive post-condition sweep over §3's invariants 1 and 3: every
    /// bundle belongs to at least one bundle group, and every bundle's
    /// assets share its declared `type`. Both are guaranteed by construction
    /// as long as callers only ever reach the arena through this type's own
    /// mutation methods (primary bundling always adds a new bundle to a
    /// group before attaching assets to it, and a type boundary always opens
    /// a new bundle rather than crossing into the current one) — this never
    /// fires against a well-formed asset graph, but it keeps a malformed
    /// host graph from producing a silently-broken bundle graph instead of
    /// an error. Called once at the end of [`crate::Bundling::run`].
    pub fn check_invariants(&self) -> Result<()> {
        for bundle in &self.bundles {
            let in_a_group = self
                .bundle_to_groups
                .get(&bundle.id)
                .is_some_and(|groups| !groups.is_empty());
            if !in_a_group {
                return Err(BundlingError::BrokenInvariant(bundle.id, "bundle belongs to no bundle group"));
            }

            for &asset in &bundle.assets {
                if self.asset_graph.asset(asset).asset_type != bundle.bundle_type {
                    return Err(BundlingError::BrokenInvariant(
                        bundle.id,
                        "bundle contains an asset whose type doesn't match the bundle's own type",
                    ));
                }
            }
        }
        Ok(())
    }

    // --------------------------------------------------------------- traversal

    /// Postorder over bundles, respecting the bundle-group parent/child
    /// relation: a bundle's children are the members of every group it
    /// parents. Used by step 2's ancestor deduplication.
    pub fn traverse_bundles_postorder(&self) -> Vec<BundleId> {
        let mut groups_opened_by: IndexMap<BundleId, Vec<BundleGroupId>> = IndexMap::new();
        let mut top_level_groups = Vec::new();
        for group in self.bundle_group_ids() {
            let parents = self.get_parent_bundles_of_bundle_group(group);
            if parents.is_empty() {
                top_level_groups.push(group);
            }
            for parent in parents {
                groups_opened_by.entry(parent).or_default().push(group);
            }
        }

        let mut order = Vec::new();
        let mut visited = IndexSet::new();
        let roots: Vec<BundleId> = top_level_groups
            .into_iter()
            .flat_map(|g| self.get_bundles_in_bundle_group(g))
            .collect();
        for root in roots {
            self.visit_bundle_postorder(root, &groups_opened_by, &mut visited, &mut order);
        }
        for bundle in self.bundle_ids() {
            if !visited.contains(&bundle) {
                self.visit_bundle_postorder(bundle, &groups_opened_by, &mut visited, &mut order);
            }
        }
        order
    }

    fn visit_bundle_postorder(
        &self,
        bundle: BundleId,
        groups_opened_by: &IndexMap<BundleId, Vec<BundleGroupId>>,
        visited: &mut IndexSet<BundleId>,
        order: &mut Vec<BundleId>,
    ) {
        if !visited.insert(bundle) {
            return;
        }
        if let Some(groups) = groups_opened_by.get(&bundle) {
            for &group in groups {
                for child in self.get_bundles_in_bundle_group(group) {
                    self.visit_bundle_postorder(child, groups_opened_by, visited, order);
                }
            }
        }
        order.push(bundle);
    }

    /// DFS over the distinct assets contained in any bundle, starting from
    /// each bundle's main entries in bundle-id order. `visit` returning
    /// [`ContentControl::SkipChildren`] prunes that asset's dependencies
    /// from the traversal, per step 3's "skip that asset's children".
    pub fn traverse_contents(&self, mut visit: impl FnMut(AssetId) -> ContentControl) {
        let mut visited = IndexSet::new();
        let roots: Vec<AssetId> = self
            .bundle_ids()
            .flat_map(|b| self.bundle(b).main_entries().collect::<Vec<_>>())
            .collect();
        for root in roots {
            self.visit_contents(root, &mut visited, &mut visit);
        }
    }

    fn visit_contents(
        &self,
        asset: AssetId,
        visited: &mut IndexSet<AssetId>,
        visit: &mut impl FnMut(AssetId) -> ContentControl,
    ) {
        if !visited.insert(asset) {
            return;
        }
        if visit(asset) == ContentControl::SkipChildren {
            return;
        }
        for (_, child) in self.asset_graph.outgoing(asset) {
            self.visit_contents(child, visited, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Asset;
    use crate::dependency::Dependency;
    use crate::target::EnvironmentContext;

    fn env() -> Environment {
        Environment::new(EnvironmentContext::Browser)
    }

    fn target() -> Target {
        Target::new(env(), "dist", "/")
    }

    #[test]
    fn check_invariants_passes_on_a_well_formed_graph() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let mut bg = BundleGraph::new(&mut ag);
        let group = bg.create_bundle_group(None, target());
        let bundle = bg.create_bundle(NewBundle::for_asset(a, AssetType::new("js"), env(), target()));
        bg.add_bundle_to_bundle_group(bundle, group);
        bg.add_asset_graph_to_bundle(a, bundle);

        assert!(bg.check_invariants().is_ok());
    }

    #[test]
    fn check_invariants_catches_a_bundle_with_no_group() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let mut bg = BundleGraph::new(&mut ag);
        // Deliberately skip `add_bundle_to_bundle_group` to manufacture an
        // orphan the way a malformed host graph might.
        let bundle = bg.create_bundle(NewBundle::for_asset(a, AssetType::new("js"), env(), target()));

        let err = bg.check_invariants().unwrap_err();
        assert!(matches!(err, crate::error::BundlingError::BrokenInvariant(id, _) if id == bundle));
    }

    #[test]
    fn check_invariants_catches_a_type_mismatched_asset() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let mut bg = BundleGraph::new(&mut ag);
        let group = bg.create_bundle_group(None, target());
        let bundle = bg.create_bundle(NewBundle::for_asset(a, AssetType::new("js"), env(), target()));
        bg.add_bundle_to_bundle_group(bundle, group);
        bg.add_asset_graph_to_bundle(a, bundle);
        // Manufacture a homogeneity violation directly through the bundle's
        // own fields, the way no code path reachable through this type's
        // public mutation methods ever would.
        bg.bundle_mut(bundle).bundle_type = AssetType::new("css");

        let err = bg.check_invariants().unwrap_err();
        assert!(matches!(err, crate::error::BundlingError::BrokenInvariant(id, _) if id == bundle));
    }

    #[test]
    fn add_and_remove_asset_graph_respects_other_bundle_roots() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let b = ag.add_asset(Asset::new("b", "js", env(), 20));
        let c = ag.add_asset(Asset::new("c", "js", env(), 30));
        ag.add_dependency(a, b, Dependency::new());
        ag.add_dependency(b, c, Dependency::new());

        let mut bg = BundleGraph::new(&mut ag);
        let bundle_a = bg.create_bundle(NewBundle::for_asset(a, AssetType::new("js"), env(), target()));
        let bundle_c = bg.create_bundle(NewBundle::for_asset(c, AssetType::new("js"), env(), target()));

        bg.add_asset_graph_to_bundle(a, bundle_a);
        assert!(bg.bundle(bundle_a).has_asset(a));
        assert!(bg.bundle(bundle_a).has_asset(b));
        // `c` is another bundle's main entry, so it's a boundary and is not pulled in.
        assert!(!bg.bundle(bundle_a).has_asset(c));

        bg.remove_asset_graph_from_bundle(a, bundle_a);
        assert!(!bg.bundle(bundle_a).has_asset(a));
        assert!(!bg.bundle(bundle_a).has_asset(b));
        assert!(bg.find_bundles_with_asset(b).is_empty());
        let _ = bundle_c;
    }

    #[test]
    fn parent_and_sibling_queries() {
        let mut ag = AssetGraph::new();
        let entry = ag.add_asset(Asset::new("entry", "js", env(), 10));
        let lazy = ag.add_asset(Asset::new("lazy", "js", env(), 10));
        let dep = ag.add_dependency(entry, lazy, Dependency::async_import());

        let mut bg = BundleGraph::new(&mut ag);
        let entry_group = bg.create_bundle_group(None, target());
        let entry_bundle = bg.create_bundle(NewBundle::for_asset(entry, AssetType::new("js"), env(), target()));
        bg.add_bundle_to_bundle_group(entry_bundle, entry_group);
        bg.add_asset_graph_to_bundle(entry, entry_bundle);

        let lazy_group = bg.create_bundle_group(Some(dep), target());
        let lazy_bundle = bg.create_bundle(NewBundle::for_asset(lazy, AssetType::new("js"), env(), target()));
        bg.add_bundle_to_bundle_group(lazy_bundle, lazy_group);
        bg.add_asset_graph_to_bundle(lazy, lazy_bundle);

        assert_eq!(bg.get_parent_bundles_of_bundle_group(lazy_group), vec![entry_bundle]);
        assert!(bg.get_parent_bundles_of_bundle_group(entry_group).is_empty());
        assert!(bg.get_sibling_bundles(entry_bundle).is_empty());
        assert!(bg.is_asset_in_ancestor_bundles(lazy_bundle, entry));
        assert!(!bg.is_asset_in_ancestor_bundles(entry_bundle, lazy));
    }

    #[test]
    fn traverse_contents_respects_skip_children() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let b = ag.add_asset(Asset::new("b", "js", env(), 10));
        let c = ag.add_asset(Asset::new("c", "js", env(), 10));
        ag.add_dependency(a, b, Dependency::new());
        ag.add_dependency(b, c, Dependency::new());

        let mut bg = BundleGraph::new(&mut ag);
        let bundle = bg.create_bundle(NewBundle::for_asset(a, AssetType::new("js"), env(), target()));
        bg.add_asset_graph_to_bundle(a, bundle);

        let mut seen = Vec::new();
        bg.traverse_contents(|asset| {
            seen.push(asset);
            if asset == b {
                ContentControl::SkipChildren
            } else {
                ContentControl::Continue
            }
        });
        assert_eq!(seen, vec![a, b]);
    }
}
