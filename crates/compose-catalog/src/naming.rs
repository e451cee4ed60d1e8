//! Field-name syntax and entity routing.
//!
//! Field names are dotted paths rooted at their entity
//! (`ece.channel.t_e.data`). Segments after the root may start with a digit
//! (array positions such as `description_2d.0`) or an underscore (internal
//! dependency fields such as `ece._numch`).

use crate::error::CatalogError;
use regex::Regex;
use std::sync::OnceLock;

fn field_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*(?:\.[A-Za-z0-9_]+)+$")
            .expect("field-name regex must compile")
    })
}

/// Entity that owns `field`: its first `.`-separated segment.
pub fn entity_of(field: &str) -> &str {
    field.split('.').next().unwrap_or(field)
}

/// Check that `field` is a dotted path with a lowercase entity root.
pub fn validate_field_name(field: &str) -> Result<(), CatalogError> {
    if field_name_re().is_match(field) {
        Ok(())
    } else {
        Err(CatalogError::InvalidFieldName(field.to_string()))
    }
}

/// Internal fields (`entity._name`) exist only as dependencies of others.
pub fn is_internal(field: &str) -> bool {
    field
        .split_once('.')
        .is_some_and(|(_, rest)| rest.starts_with('_'))
}
