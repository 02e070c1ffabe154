use crate::meta::Meta;
use crate::target::Environment;
use serde::{Deserialize, Serialize};

/// An asset's content type, e.g. `"js"`, `"css"`, `"html"`.
///
/// Kept as an open string rather than a closed enum: the core only ever
/// compares types for equality (bundle homogeneity, type-boundary splits),
/// it never branches on a specific one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetType(pub String);

impl AssetType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<S: Into<String>> From<S> for AssetType {
    fn from(value: S) -> Self {
        AssetType::new(value)
    }
}

/// An atomic transformable unit in the asset graph.
///
/// Everything but `meta` is read-only to the bundling core; `meta` is a
/// write-only bag downstream consumers read (the core itself only ever
/// writes `shouldWrap` there, via [`Meta::set_should_wrap`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub asset_type: AssetType,
    pub is_isolated: bool,
    pub is_inline: bool,
    pub env: Environment,
    pub meta: Meta,
    pub size: u64,
}

impl Asset {
    pub fn new(id: impl Into<String>, asset_type: impl Into<AssetType>, env: Environment, size: u64) -> Self {
        Self {
            id: id.into(),
            asset_type: asset_type.into(),
            is_isolated: false,
            is_inline: false,
            env,
            meta: Meta::new(),
            size,
        }
    }

    pub fn isolated(mut self) -> Self {
        self.is_isolated = true;
        self
    }

    pub fn inline(mut self) -> Self {
        self.is_inline = true;
        self
    }
}
