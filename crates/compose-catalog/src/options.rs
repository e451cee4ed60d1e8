use serde::{Deserialize, Serialize};

pub const DEFAULT_EFIT_TREE: &str = "EFIT01";

/// Construction parameters shared by the entity constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EntityOptions {
    /// Tree holding equilibrium reconstructions (and the limiter outline).
    pub efit_tree: String,
    /// Read the fast-sampled ECE signals (`TECEF*`) instead of `TECE*`.
    pub fast_ece: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            efit_tree: DEFAULT_EFIT_TREE.to_string(),
            fast_ece: false,
        }
    }
}

impl EntityOptions {
    pub fn with_efit_tree(mut self, tree: impl Into<String>) -> Self {
        self.efit_tree = tree.into();
        self
    }

    pub fn with_fast_ece(mut self, fast: bool) -> Self {
        self.fast_ece = fast;
        self
    }
}
