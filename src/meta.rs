use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value that can be stashed in an asset's or dependency's [`Meta`] bag.
///
/// The core only ever reads and writes the `shouldWrap` boolean itself, but
/// the bag is shared with whatever host produced the asset graph, so it has
/// to tolerate values the core doesn't understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Number(f64),
    Str(String),
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

/// Open string-keyed map carried on [`crate::asset::Asset`] and
/// [`crate::dependency::Dependency`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta(IndexMap<String, MetaValue>);

pub const SHOULD_WRAP: &str = "shouldWrap";

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// `meta.shouldWrap`, defaulting to `false` when unset or of the wrong type.
    pub fn should_wrap(&self) -> bool {
        matches!(self.0.get(SHOULD_WRAP), Some(MetaValue::Bool(true)))
    }

    pub fn set_should_wrap(&mut self, value: bool) {
        self.set(SHOULD_WRAP, value);
    }
}
