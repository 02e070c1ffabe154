use crate::asset_graph::{AssetGraph, AssetId, DependencyId};
use crate::bundle::BundleId;
use crate::bundle_group::BundleGroupId;
use crate::bundle_graph::{BundleGraph, NewBundle};
use crate::error::{BundlingError, Result};
use crate::target::Target;
use indexmap::IndexMap;
use tracing::{debug, trace};

/// Per-branch traversal state, threaded downward through the recursion
/// rather than kept on a thread-local — see Design Notes.
struct Context {
    bundle_group: BundleGroupId,
    /// type -> bundle already opened for it within this group, so a second
    /// asset of a type already seen reuses the existing bundle (§4.1 "different
    /// type, bundle exists").
    bundle_by_type: IndexMap<crate::asset::AssetType, BundleId>,
    current_target: Target,
}

/// First pass of the bundling pipeline: walks the asset graph from its
/// entries and opens a bundle group at every entry, async dependency, or
/// isolated/inline asset, carrying an explicit [`Context`] down through the
/// remaining preorder DFS to decide when to extend an existing bundle,
/// start a new same-group bundle at a type boundary, or skip a shared
/// subtree it's already produced bundles for.
///
/// Holds no state of its own — every read and write goes through the
/// [`BundleGraph`] under construction, which is the sole owner of the
/// mutable borrow on the asset graph.
pub struct PrimaryBundler;

impl PrimaryBundler {
    pub fn new() -> Self {
        Self
    }

    #[tracing::instrument(skip(self, asset_graph), name = "primary_bundler")]
    pub fn run<'a>(&self, asset_graph: &'a mut AssetGraph) -> Result<BundleGraph<'a>> {
        let mut bundle_graph = BundleGraph::new(asset_graph);
        let mut sibling_lists: IndexMap<AssetId, Vec<BundleId>> = IndexMap::new();

        let entries: Vec<(AssetId, crate::dependency::Dependency)> =
            bundle_graph.asset_graph().entries().to_vec();
        for (asset_id, entry_dependency) in entries {
            self.open_entry(asset_id, &entry_dependency, &mut bundle_graph, &mut sibling_lists)?;
        }

        // Every bundle's recorded roots pull in their reachable asset
        // subgraph, stopping at any other bundle's own roots. Doing this
        // once traversal has finished (rather than inline) means a bundle
        // that later gains an additional root via the "different type,
        // bundle exists" branch still gets that root's subtree attached.
        let bundle_ids: Vec<BundleId> = bundle_graph.bundle_ids().collect();
        for bundle_id in bundle_ids {
            let roots: Vec<AssetId> = bundle_graph.bundle(bundle_id).main_entries().collect();
            for root in roots {
                bundle_graph.add_asset_graph_to_bundle(root, bundle_id);
            }
        }

        Ok(bundle_graph)
    }

    fn open_entry(
        &self,
        asset_id: AssetId,
        entry_dependency: &crate::dependency::Dependency,
        bundle_graph: &mut BundleGraph<'_>,
        sibling_lists: &mut IndexMap<AssetId, Vec<BundleId>>,
    ) -> Result<()> {
        let target = entry_dependency
            .target
            .clone()
            .ok_or(BundlingError::MissingTarget(asset_id))?;
        let asset = bundle_graph.asset_graph().asset(asset_id);
        let asset_type = asset.asset_type.clone();
        let asset_env = asset.env.clone();
        let is_isolated = asset.is_isolated;
        let is_inline = asset.is_inline;
        debug!(asset = %asset.id, "opening entry bundle group");

        let group = bundle_graph.create_bundle_group(None, target.clone());
        let bundle = bundle_graph.create_bundle(NewBundle {
            entry_asset: Some(asset_id),
            unique_key: None,
            bundle_type: asset_type.clone(),
            env: asset_env,
            target: target.clone(),
            is_entry: !is_isolated,
            is_inline,
            is_splittable: true,
        });
        bundle_graph.add_bundle_to_bundle_group(bundle, group);

        let mut bundle_by_type = IndexMap::new();
        bundle_by_type.insert(asset_type, bundle);
        let ctx = Context {
            bundle_group: group,
            bundle_by_type,
            current_target: target,
        };

        if !sibling_lists.contains_key(&asset_id) {
            sibling_lists.insert(asset_id, Vec::new());
            self.visit_children(asset_id, &ctx, bundle_graph, sibling_lists)?;
        }
        Ok(())
    }

    fn visit_children(
        &self,
        asset_id: AssetId,
        ctx: &Context,
        bundle_graph: &mut BundleGraph<'_>,
        sibling_lists: &mut IndexMap<AssetId, Vec<BundleId>>,
    ) -> Result<()> {
        let parent_type = bundle_graph.asset_graph().asset(asset_id).asset_type.clone();
        let deps: Vec<(DependencyId, AssetId)> = bundle_graph.asset_graph().outgoing(asset_id).collect();
        let all_same_type = deps
            .iter()
            .all(|(_, target)| bundle_graph.asset_graph().asset(*target).asset_type == parent_type);

        for (dep_id, target_id) in deps {
            self.visit_dependency(
                dep_id,
                asset_id,
                target_id,
                Some(ctx),
                all_same_type,
                bundle_graph,
                sibling_lists,
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_dependency(
        &self,
        dep_id: DependencyId,
        parent_asset: AssetId,
        target_id: AssetId,
        ctx: Option<&Context>,
        all_siblings_same_type: bool,
        bundle_graph: &mut BundleGraph<'_>,
        sibling_lists: &mut IndexMap<AssetId, Vec<BundleId>>,
    ) -> Result<()> {
        let dep_is_entry = bundle_graph.asset_graph().dependency(dep_id).is_entry;
        let dep_is_async = bundle_graph.asset_graph().dependency(dep_id).is_async;
        let dep_target = bundle_graph.asset_graph().dependency(dep_id).target.clone();

        let asset = bundle_graph.asset_graph().asset(target_id);
        let asset_type = asset.asset_type.clone();
        let asset_env = asset.env.clone();
        let asset_is_isolated = asset.is_isolated;
        let asset_is_inline = asset.is_inline;
        let asset_env_isolated = asset.env.is_isolated();
        let asset_log_id = asset.id.clone();

        let opens_group = dep_is_entry || dep_is_async || asset_is_isolated || asset_env_isolated || asset_is_inline;

        if opens_group {
            let inherited_target = ctx.map(|c| c.current_target.clone());
            let target = dep_target
                .or(inherited_target)
                .ok_or(BundlingError::MissingTarget(target_id))?;
            trace!(asset = %asset_log_id, "opening nested bundle group");

            let group = bundle_graph.create_bundle_group(Some(dep_id), target.clone());
            let bundle = bundle_graph.create_bundle(NewBundle {
                entry_asset: Some(target_id),
                unique_key: None,
                bundle_type: asset_type.clone(),
                env: asset_env,
                target: target.clone(),
                is_entry: dep_is_entry && !asset_is_isolated,
                is_inline: asset_is_inline,
                is_splittable: true,
            });
            bundle_graph.add_bundle_to_bundle_group(bundle, group);

            if let Some(existing_siblings) = sibling_lists.get(&target_id).cloned() {
                // Shared subtree reached again through a different path: the
                // bundles it already produced belong in this group too.
                for sibling_bundle in existing_siblings {
                    bundle_graph.add_bundle_to_bundle_group(sibling_bundle, group);
                }
            } else {
                sibling_lists.insert(target_id, Vec::new());
                let mut bundle_by_type = IndexMap::new();
                bundle_by_type.insert(asset_type, bundle);
                let child_ctx = Context {
                    bundle_group: group,
                    bundle_by_type,
                    current_target: target,
                };
                self.visit_children(target_id, &child_ctx, bundle_graph, sibling_lists)?;
            }
            return Ok(());
        }

        let ctx = ctx.ok_or(BundlingError::MissingContext(dep_id))?;
        let parent_type = bundle_graph.asset_graph().asset(parent_asset).asset_type.clone();

        if asset_type == parent_type {
            let has_list = sibling_lists.contains_key(&target_id);
            if all_siblings_same_type && has_list {
                let existing = sibling_lists[&target_id].clone();
                for bundle in existing {
                    bundle_graph.add_bundle_to_bundle_group(bundle, ctx.bundle_group);
                }
            } else if !has_list {
                let initial = if all_siblings_same_type {
                    sibling_lists.get(&parent_asset).cloned().unwrap_or_default()
                } else {
                    Vec::new()
                };
                sibling_lists.insert(target_id, initial);
                self.visit_children(target_id, ctx, bundle_graph, sibling_lists)?;
            }
            // Otherwise: already visited via another path with mixed-type
            // siblings there. Nothing safe to propagate either way.
            return Ok(());
        }

        // Different type from the parent: reuse or open a bundle for it
        // within the current group, then keep descending under that type.
        let bundle_id = if let Some(&existing) = ctx.bundle_by_type.get(&asset_type) {
            bundle_graph.bundle_mut(existing).main_entries.insert(target_id);
            bundle_graph.create_asset_reference(dep_id, target_id);
            existing
        } else {
            let new_bundle = bundle_graph.create_bundle(NewBundle {
                entry_asset: Some(target_id),
                unique_key: None,
                bundle_type: asset_type.clone(),
                env: asset_env,
                target: ctx.current_target.clone(),
                is_entry: false,
                is_inline: asset_is_inline,
                is_splittable: true,
            });
            bundle_graph.add_bundle_to_bundle_group(new_bundle, ctx.bundle_group);
            sibling_lists.entry(parent_asset).or_default().push(new_bundle);
            bundle_graph.create_asset_reference(dep_id, target_id);
            new_bundle
        };

        if !sibling_lists.contains_key(&target_id) {
            sibling_lists.insert(target_id, Vec::new());
            let mut bundle_by_type = ctx.bundle_by_type.clone();
            bundle_by_type.insert(asset_type, bundle_id);
            let child_ctx = Context {
                bundle_group: ctx.bundle_group,
                bundle_by_type,
                current_target: ctx.current_target.clone(),
            };
            self.visit_children(target_id, &child_ctx, bundle_graph, sibling_lists)?;
        }
        Ok(())
    }
}

impl Default for PrimaryBundler {
    fn default() -> Self {
        Self::new()
    }
}
