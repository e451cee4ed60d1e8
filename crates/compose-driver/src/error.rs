use compose_catalog::CatalogError;
use compose_kernel::{EngineError, UnavailableField};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error(
        "requirements still outstanding after {iterations} iterations for: {}",
        .pending.join(", ")
    )]
    BudgetExhausted {
        iterations: usize,
        pending: Vec<String>,
    },

    #[error("derivation can never succeed: {}", describe_unavailable(.fields))]
    Unavailable { fields: Vec<UnavailableField> },

    #[error("derivations still waiting with nothing left to fetch: {}", .fields.join(", "))]
    Stalled { fields: Vec<String> },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

fn describe_unavailable(fields: &[UnavailableField]) -> String {
    fields
        .iter()
        .map(|entry| format!("{} ({})", entry.field, entry.reason))
        .collect::<Vec<_>>()
        .join(", ")
}
