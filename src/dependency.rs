use crate::meta::Meta;
use crate::target::Target;
use serde::{Deserialize, Serialize};

/// An edge from a source asset to one or more resolved assets.
///
/// `is_entry` and `is_async` are the two flags [`crate::primary::PrimaryBundler`]
/// inspects to decide whether to open a new bundle group at this edge;
/// `target` carries deployment info down to whatever bundle the edge causes
/// to be created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub is_entry: bool,
    pub is_async: bool,
    pub target: Option<Target>,
    pub meta: Meta,
}

impl Dependency {
    pub fn new() -> Self {
        Self {
            is_entry: false,
            is_async: false,
            target: None,
            meta: Meta::new(),
        }
    }

    pub fn entry(target: Target) -> Self {
        Self {
            is_entry: true,
            is_async: false,
            target: Some(target),
            meta: Meta::new(),
        }
    }

    pub fn async_import() -> Self {
        Self {
            is_entry: false,
            is_async: true,
            target: None,
            meta: Meta::new(),
        }
    }

    pub fn with_should_wrap(mut self, should_wrap: bool) -> Self {
        self.meta.set_should_wrap(should_wrap);
        self
    }
}

impl Default for Dependency {
    fn default() -> Self {
        Self::new()
    }
}
