use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The runtime an asset/bundle is destined for.
///
/// `is_isolated` mirrors the host's `env.isIsolated()` query: contexts that
/// cannot share a module scope with whatever loaded them (workers, in
/// particular) opt out of ancestor deduplication entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvironmentContext {
    Browser,
    Worker,
    ServiceWorker,
    Node,
    ElectronMain,
    ElectronRenderer,
}

impl EnvironmentContext {
    fn is_isolated(self) -> bool {
        matches!(self, EnvironmentContext::Worker | EnvironmentContext::ServiceWorker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    pub context: EnvironmentContext,
}

impl Environment {
    pub fn new(context: EnvironmentContext) -> Self {
        Self { context }
    }

    pub fn is_isolated(&self) -> bool {
        self.context.is_isolated()
    }
}

/// Where a bundle is ultimately written: which environment it runs in, the
/// directory it's emitted to, and the URL it's served from. The core never
/// interprets these beyond carrying them from a dependency/entry onto the
/// bundle it opens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub env: Environment,
    pub dist_dir: PathBuf,
    pub public_url: String,
}

impl Target {
    pub fn new(env: Environment, dist_dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            env,
            dist_dir: dist_dir.into(),
            public_url: public_url.into(),
        }
    }
}
