use compose_kernel::EngineError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("unknown entity `{name}` (registered: {registered})")]
    UnknownEntity { name: String, registered: String },

    #[error("entity registered twice: {0}")]
    DuplicateEntity(String),

    #[error("constructor for `{expected}` built registry for `{actual}`")]
    EntityMismatch { expected: String, actual: String },

    #[error("invalid field name: {0:?}")]
    InvalidFieldName(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
