use crate::asset_graph::DependencyId;
use crate::target::Target;

/// Stable identity of a bundle group. Groups are created by
/// [`crate::primary::PrimaryBundler`] and may be removed by
/// [`crate::optimizer::OptimizingBundler`] step 5 if orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleGroupId(pub(crate) usize);

/// A set of bundles the runtime loads together to satisfy one load point
/// (an entry, or an async import).
#[derive(Debug, Clone)]
pub struct BundleGroup {
    pub id: BundleGroupId,
    /// The dependency that opened this group (`None` for a group opened
    /// directly from an [`crate::asset_graph::AssetGraph`] entry with no
    /// synthetic source asset to attribute it to).
    pub entry_dependency: Option<DependencyId>,
    pub target: Target,
}
