//! Engine configuration loaded from TOML.
//!
//! ```toml
//! max_depth = 10
//! iteration_budget = 10
//!
//! [entities]
//! efit_tree = "EFIT02"
//! fast_ece = true
//! ```
//!
//! Every key is optional.

use crate::error::DriveError;
use compose_catalog::EntityOptions;
use compose_kernel::{DEFAULT_MAX_DEPTH, EngineOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_ITERATION_BUDGET: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    pub max_depth: usize,
    /// Resolve/fetch rounds allowed before the driver gives up.
    pub iteration_budget: usize,
    pub entities: EntityOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            iteration_budget: DEFAULT_ITERATION_BUDGET,
            entities: EntityOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, DriveError> {
        parse(text, "<inline>")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriveError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| DriveError::ReadFile {
            path: display.clone(),
            source,
        })?;
        parse(&text, &display)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_depth: self.max_depth,
        }
    }
}

fn parse(text: &str, path: &str) -> Result<EngineConfig, DriveError> {
    toml::from_str(text).map_err(|source| DriveError::ParseToml {
        path: path.to_string(),
        source,
    })
}
