//! # Compose Catalog
//!
//! The set of entities a process can compose, assembled from the static
//! [`ENTITY_TABLE`]. A [`Catalog`] is a [`compose_kernel::SpecLookup`] over
//! every instantiated entity, routing field names by their first segment.

pub mod catalog;
pub mod entities;
pub mod error;
pub mod naming;
pub mod options;
pub mod table;

pub use catalog::Catalog;
pub use error::CatalogError;
pub use naming::{entity_of, is_internal, validate_field_name};
pub use options::{DEFAULT_EFIT_TREE, EntityOptions};
pub use table::{ENTITY_TABLE, EntityConstructor, entity_constructor, entity_names};
