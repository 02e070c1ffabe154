use crate::asset_graph::{AssetId, DependencyId};
use crate::bundle::BundleId;
use thiserror::Error;

/// Failures the bundling core raises. Per §7, these are the only three fatal
/// conditions; everything else the passes encounter (no candidates, budget
/// exhausted, zero-sized assets, ...) is soft and handled by skipping the
/// affected work rather than by returning an error.
#[derive(Debug, Error)]
pub enum BundlingError {
    /// [`crate::primary::PrimaryBundler`] reached a dependency with no
    /// bundle group open on the traversal stack.
    #[error("dependency {0:?} visited with no open bundle group; the asset graph is malformed")]
    MissingContext(DependencyId),

    /// [`crate::primary::PrimaryBundler`] tried to open a bundle group for
    /// this asset but neither the opening dependency nor the enclosing
    /// context carries a target.
    #[error("asset {0:?} would open a bundle group but no target is available")]
    MissingTarget(AssetId),

    /// [`crate::optimizer::OptimizingBundler`] step 4 found an async
    /// dependency whose external resolution was not a bundle group.
    #[error("async dependency {0:?} resolved externally to an asset, not a bundle group")]
    ExternalResolutionMismatch(DependencyId),

    /// Defensive: an internal invariant (§3) was found violated on a bundle
    /// the core itself produced. Never expected to trigger against
    /// well-formed input; kept so the public API never panics.
    #[error("internal invariant violated on bundle {0:?}: {1}")]
    BrokenInvariant(BundleId, &'static str),
}

pub type Result<T> = std::result::Result<T, BundlingError>;
