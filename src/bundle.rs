use crate::asset::AssetType;
use crate::asset_graph::AssetId;
use crate::target::{Environment, Target};
use indexmap::IndexSet;

/// Stable identity of a bundle within a [`crate::bundle_graph::BundleGraph`].
/// Bundles are never destroyed by the core, so an id is valid for the
/// lifetime of the graph once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(pub(crate) usize);

/// An ordered collection of same-typed assets with one or more declared main
/// entries. See `§3 Bundle` in the spec for the attribute list this mirrors.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: BundleId,
    pub bundle_type: AssetType,
    pub env: Environment,
    pub target: Target,
    pub is_entry: bool,
    pub is_inline: bool,
    pub is_splittable: bool,
    pub unique_key: Option<String>,
    pub(crate) main_entries: IndexSet<AssetId>,
    pub(crate) assets: IndexSet<AssetId>,
}

impl Bundle {
    pub fn has_asset(&self, asset: AssetId) -> bool {
        self.assets.contains(&asset)
    }

    /// The bundle's single declared main entry, when unambiguous. Bundles
    /// can gain additional roots during primary bundling (§4.1, "different
    /// type" case); in that case there is no single answer and this
    /// returns `None`.
    pub fn main_entry(&self) -> Option<AssetId> {
        if self.main_entries.len() == 1 {
            self.main_entries.iter().next().copied()
        } else {
            None
        }
    }

    pub fn main_entries(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.main_entries.iter().copied()
    }

    pub fn assets(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.assets.iter().copied()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }
}
