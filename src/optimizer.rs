use crate::asset_graph::AssetId;
use crate::bundle::BundleId;
use crate::bundle_graph::{BundleGraph, ContentControl, ExternalResolution, NewBundle};
use crate::bundle_group::BundleGroupId;
use crate::config::BundlerConfig;
use crate::error::{BundlingError, Result};
use crate::hash::shared_bundle_key;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

/// A shared-bundle candidate accumulated during step 3's content traversal,
/// keyed by its sorted source-bundle id set.
struct Candidate {
    sources: Vec<BundleId>,
    assets: Vec<AssetId>,
    size: u64,
}

/// Second pass of the pipeline: five sequential rewrites over the bundle
/// graph PrimaryBundler produced. Each step materializes its work list
/// before mutating, per the no-mutate-while-iterating discipline the
/// traversal rules require.
pub struct OptimizingBundler<'c> {
    config: &'c BundlerConfig,
}

impl<'c> OptimizingBundler<'c> {
    pub fn new(config: &'c BundlerConfig) -> Self {
        Self { config }
    }

    #[tracing::instrument(skip(self, bundle_graph), name = "optimizing_bundler")]
    pub fn run(&self, bundle_graph: &mut BundleGraph<'_>) -> Result<()> {
        self.hoist_single_origin_bundles(bundle_graph);
        self.deduplicate_all_ancestors(bundle_graph);
        self.extract_shared_bundles(bundle_graph);
        self.internalize_and_prune(bundle_graph)?;
        Ok(())
    }

    /// Step 1 — if a bundle's main entry is duplicated inside another
    /// splittable bundle, prefer loading the original alongside that
    /// bundle's groups over carrying the duplicate, provided those groups
    /// have request budget to spare.
    fn hoist_single_origin_bundles(&self, bundle_graph: &mut BundleGraph<'_>) {
        let bundle_ids: Vec<BundleId> = bundle_graph.bundle_ids().collect();
        let mut moves = Vec::new();

        for &bundle_id in &bundle_ids {
            let bundle = bundle_graph.bundle(bundle_id);
            if !bundle.is_splittable || bundle.is_inline {
                continue;
            }
            let Some(main_entry) = bundle.main_entry() else {
                continue;
            };

            let candidates: Vec<BundleId> = bundle_graph
                .find_bundles_with_asset(main_entry)
                .into_iter()
                .filter(|&c| {
                    c != bundle_id && {
                        let candidate = bundle_graph.bundle(c);
                        !candidate.is_entry && !candidate.is_inline && candidate.is_splittable
                    }
                })
                .collect();

            let siblings: Vec<BundleId> = bundle_graph
                .get_sibling_bundles(bundle_id)
                .into_iter()
                .filter(|&s| {
                    let sibling = bundle_graph.bundle(s);
                    sibling.is_splittable && !sibling.is_inline
                })
                .collect();

            for candidate in candidates {
                moves.push((bundle_id, main_entry, candidate, siblings.clone()));
            }
        }

        for (bundle_id, main_entry, candidate, siblings) in moves {
            let groups = bundle_graph.get_bundle_groups_containing_bundle(candidate);
            let fits = groups
                .iter()
                .all(|&g| bundle_graph.get_bundles_in_bundle_group(g).len() < self.config.max_parallel_requests);
            if !fits {
                continue;
            }

            debug!(?bundle_id, ?candidate, "hoisting single-origin bundle into candidate's groups");
            bundle_graph.remove_asset_graph_from_bundle(main_entry, candidate);
            for &group in &groups {
                bundle_graph.add_bundle_to_bundle_group(bundle_id, group);
                for &sibling in &siblings {
                    bundle_graph.add_bundle_to_bundle_group(sibling, group);
                }
            }
        }
    }

    /// Step 2 — postorder ancestor deduplication over every bundle.
    fn deduplicate_all_ancestors(&self, bundle_graph: &mut BundleGraph<'_>) {
        for bundle_id in bundle_graph.traverse_bundles_postorder() {
            self.deduplicate_against_ancestors(bundle_graph, bundle_id);
        }
    }

    /// Removes from `bundle_id` any asset subgraph also carried by one of
    /// its ancestor bundles. Isolated environments are exempt — they cannot
    /// share the ancestor's runtime scope, so duplication is required.
    fn deduplicate_against_ancestors(&self, bundle_graph: &mut BundleGraph<'_>, bundle_id: BundleId) {
        let bundle = bundle_graph.bundle(bundle_id);
        if !bundle.is_splittable || bundle.env.is_isolated() {
            return;
        }

        let assets: Vec<_> = bundle_graph.bundle(bundle_id).assets().collect();
        for asset in assets {
            if !bundle_graph.bundle(bundle_id).has_asset(asset) {
                continue; // already removed by an earlier iteration's subgraph removal
            }
            if bundle_graph.is_asset_in_ancestor_bundles(bundle_id, asset) {
                bundle_graph.remove_asset_graph_from_bundle(asset, bundle_id);
            }
        }
    }

    /// Step 3 — extract assets shared across more bundles than `min_bundles`
    /// into dedicated shared bundles, largest-candidate-first.
    fn extract_shared_bundles(&self, bundle_graph: &mut BundleGraph<'_>) {
        let mut candidates: IndexMap<String, Candidate> = IndexMap::new();

        bundle_graph.traverse_contents(|asset| {
            let containing: Vec<BundleId> = bundle_graph
                .find_bundles_with_asset(asset)
                .into_iter()
                .filter(|&b| {
                    let bundle = bundle_graph.bundle(b);
                    !bundle.is_entry && bundle.is_splittable && !bundle.main_entries().any(|m| m == asset)
                })
                .collect();

            if containing.len() <= self.config.min_bundles {
                return ContentControl::Continue;
            }

            let mut sorted = containing;
            sorted.sort_unstable_by_key(|b| b.0);
            let key = sorted.iter().map(|b| b.0.to_string()).collect::<Vec<_>>().join("|");

            let candidate = candidates.entry(key).or_insert_with(|| Candidate {
                sources: sorted,
                assets: Vec::new(),
                size: 0,
            });
            candidate.assets.push(asset);
            candidate.size += bundle_graph.get_total_size(asset);
            ContentControl::SkipChildren
        });

        let mut ordered: Vec<(String, Candidate)> = candidates
            .into_iter()
            .filter(|(_, c)| c.size >= self.config.min_bundle_size)
            .collect();
        // Largest-first; tie-break by key string for determinism (§5).
        ordered.sort_unstable_by(|(key_a, a), (key_b, b)| b.size.cmp(&a.size).then_with(|| key_a.cmp(key_b)));

        for (_, candidate) in ordered {
            let groups: IndexSet<BundleGroupId> = candidate
                .sources
                .iter()
                .flat_map(|&b| bundle_graph.get_bundle_groups_containing_bundle(b))
                .collect();

            let over_budget = groups
                .iter()
                .any(|&g| bundle_graph.get_bundles_in_bundle_group(g).len() >= self.config.max_parallel_requests);
            if over_budget {
                debug!(sources = ?candidate.sources, "skipping shared-bundle candidate: request budget exhausted");
                continue;
            }

            let first = bundle_graph.bundle(candidate.sources[0]);
            let bundle_type = first.bundle_type.clone();
            let env = first.env.clone();
            let target = first.target.clone();
            let unique_key = shared_bundle_key(&candidate.sources);
            let shared = bundle_graph.create_bundle(NewBundle {
                entry_asset: None,
                unique_key: Some(unique_key),
                bundle_type,
                env,
                target,
                is_entry: false,
                is_inline: false,
                is_splittable: true,
            });

            for &group in &groups {
                bundle_graph.add_bundle_to_bundle_group(shared, group);
            }

            for &asset in &candidate.assets {
                for &source in &candidate.sources {
                    if bundle_graph.bundle(source).has_asset(asset) {
                        bundle_graph.remove_asset_graph_from_bundle(asset, source);
                    }
                }
                bundle_graph.add_asset_graph_to_bundle(asset, shared);
            }

            self.deduplicate_against_ancestors(bundle_graph, shared);
        }
    }

    /// Steps 4 and 5 — internalize async dependencies already satisfied by a
    /// bundle or its ancestors, then drop any bundle group that no longer
    /// has a parent still loading it externally.
    fn internalize_and_prune(&self, bundle_graph: &mut BundleGraph<'_>) -> Result<()> {
        let dependency_ids: Vec<_> = bundle_graph
            .asset_graph()
            .inner()
            .edge_indices()
            .collect();

        let mut touched_groups: IndexSet<BundleGroupId> = IndexSet::new();

        for dep_id in dependency_ids {
            let dependency = bundle_graph.asset_graph().dependency(dep_id);
            if !dependency.is_async || dependency.is_entry {
                continue;
            }
            let Some(resolved_asset) = bundle_graph.get_dependency_resolution(dep_id, None) else {
                continue;
            };

            let group = match bundle_graph.resolve_external_dependency(dep_id) {
                Some(ExternalResolution::BundleGroup(group)) => group,
                _ => return Err(BundlingError::ExternalResolutionMismatch(dep_id)),
            };
            touched_groups.insert(group);

            for bundle in bundle_graph.find_bundles_with_dependency(dep_id) {
                let already_satisfied = bundle_graph.bundle(bundle).has_asset(resolved_asset)
                    || bundle_graph.is_asset_in_ancestor_bundles(bundle, resolved_asset);
                if already_satisfied {
                    bundle_graph.internalize_async_dependency(bundle, dep_id);
                }
            }
        }

        for group in touched_groups {
            let Some(bundle_group) = bundle_graph.bundle_group(group) else {
                continue;
            };
            let Some(dep_id) = bundle_group.entry_dependency else {
                continue;
            };
            let parents = bundle_graph.get_parent_bundles_of_bundle_group(group);
            let still_needed = parents
                .iter()
                .any(|&parent| !bundle_graph.is_internalized(parent, dep_id));
            if !still_needed {
                debug!(?group, "removing orphaned bundle group after internalization");
                bundle_graph.remove_bundle_group(group);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Asset, AssetType};
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
    fn step1_hoists_a_duplicated_entry_asset_into_the_candidates_groups() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let c_root = ag.add_asset(Asset::new("c_root", "js", env(), 10));

        let mut bg = BundleGraph::new(&mut ag);

        // B: a splittable, non-entry bundle whose sole main entry is `a`,
        // the shape an async import of `a` would produce.
        let group_b = bg.create_bundle_group(None, target());
        let bundle_b = bg.create_bundle(NewBundle::for_asset(a, AssetType::new("js"), env(), target()));
        bg.add_bundle_to_bundle_group(bundle_b, group_b);
        bg.add_asset_graph_to_bundle(a, bundle_b);

        // C: a different splittable, non-entry bundle that already carries a
        // duplicate copy of `a`'s code, with request budget to spare.
        let group_c = bg.create_bundle_group(None, target());
        let bundle_c = bg.create_bundle(NewBundle::for_asset(c_root, AssetType::new("js"), env(), target()));
        bg.add_bundle_to_bundle_group(bundle_c, group_c);
        bg.add_asset_graph_to_bundle(c_root, bundle_c);
        bg.add_asset_graph_to_bundle(a, bundle_c);
        assert!(bg.bundle(bundle_c).has_asset(a));

        let config = BundlerConfig::default();
        OptimizingBundler::new(&config).hoist_single_origin_bundles(&mut bg);

        // `a`'s duplicate is removed from C, and B is hoisted into C's group
        // instead of carrying its own copy.
        assert!(!bg.bundle(bundle_c).has_asset(a));
        assert!(bg.get_bundles_in_bundle_group(group_c).contains(&bundle_b));
    }

    #[test]
    fn isolated_environment_bundle_is_exempt_from_ancestor_dedup() {
        let mut ag = AssetGraph::new();
        let entry = ag.add_asset(Asset::new("entry", "js", env(), 10));
        let shared = ag.add_asset(Asset::new("shared", "js", env(), 10));
        let worker_entry = ag.add_asset(Asset::new(
            "worker_entry",
            "js",
            Environment::new(EnvironmentContext::Worker),
            10,
        ));
        ag.add_dependency(entry, shared, Dependency::new());
        ag.add_dependency(entry, worker_entry, Dependency::new());
        ag.add_dependency(worker_entry, shared, Dependency::new());
        ag.add_entry(entry, Dependency::entry(target()));

        let mut bundle_graph = PrimaryBundler::new().run(&mut ag).unwrap();
        let config = BundlerConfig::default();
        OptimizingBundler::new(&config).run(&mut bundle_graph).unwrap();

        let worker_bundle = bundle_graph.find_bundles_with_asset(worker_entry)[0];
        // `shared` is also carried by the ancestor entry bundle, but the
        // worker bundle's isolated environment can't share that ancestor's
        // runtime scope, so ancestor dedup must leave its copy in place.
        assert!(bundle_graph.bundle(worker_bundle).has_asset(shared));
    }

    #[test]
    fn shared_asset_above_min_size_is_extracted() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let b = ag.add_asset(Asset::new("b", "js", env(), 10));
        let c = ag.add_asset(Asset::new("c", "js", env(), 10));
        let big = ag.add_asset(Asset::new("big", "js", env(), 60_000));
        ag.add_dependency(a, big, Dependency::new());
        ag.add_dependency(b, big, Dependency::new());
        ag.add_dependency(c, big, Dependency::new());
        ag.add_entry(a, Dependency::entry(target()));
        ag.add_entry(b, Dependency::entry(target()));
        ag.add_entry(c, Dependency::entry(target()));

        let mut bundle_graph = PrimaryBundler::new().run(&mut ag).unwrap();
        let config = BundlerConfig::default();
        OptimizingBundler::new(&config).run(&mut bundle_graph).unwrap();

        let big_bundles = bundle_graph.find_bundles_with_asset(big);
        assert_eq!(big_bundles.len(), 1);
        let shared = big_bundles[0];
        assert!(bundle_graph.bundle(shared).unique_key.is_some());
        assert_eq!(bundle_graph.get_bundle_groups_containing_bundle(shared).len(), 3);

        for entry in [a, b, c] {
            let entry_bundle = bundle_graph.find_bundles_with_asset(entry)[0];
            assert!(!bundle_graph.bundle(entry_bundle).has_asset(big));
        }
    }

    #[test]
    fn shared_asset_below_min_size_stays_duplicated() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let b = ag.add_asset(Asset::new("b", "js", env(), 10));
        let util = ag.add_asset(Asset::new("util", "js", env(), 10_000));
        ag.add_dependency(a, util, Dependency::new());
        ag.add_dependency(b, util, Dependency::new());
        ag.add_entry(a, Dependency::entry(target()));
        ag.add_entry(b, Dependency::entry(target()));

        let mut bundle_graph = PrimaryBundler::new().run(&mut ag).unwrap();
        let config = BundlerConfig::default();
        OptimizingBundler::new(&config).run(&mut bundle_graph).unwrap();

        let util_bundles = bundle_graph.find_bundles_with_asset(util);
        assert_eq!(util_bundles.len(), 2);
    }

    #[test]
    fn async_dependency_already_satisfied_is_internalized_and_group_pruned() {
        let mut ag = AssetGraph::new();
        let a = ag.add_asset(Asset::new("a", "js", env(), 10));
        let x = ag.add_asset(Asset::new("x", "js", env(), 10));
        ag.add_dependency(a, x, Dependency::new());
        let async_dep = ag.add_dependency(a, x, Dependency::async_import());
        ag.add_entry(a, Dependency::entry(target()));

        let mut bundle_graph = PrimaryBundler::new().run(&mut ag).unwrap();
        let config = BundlerConfig::default();
        OptimizingBundler::new(&config).run(&mut bundle_graph).unwrap();

        let a_bundle = bundle_graph.find_bundles_with_asset(a)[0];
        assert!(bundle_graph.is_internalized(a_bundle, async_dep));
    }
}
