//! Domain model: declarations, validated desired state, observed state
//!
//! Every resource kind follows the same shape:
//!
//! - `*Declaration` is the attribute bag read from the manifest. Enumerations
//!   are plain strings so bad values surface as configuration errors with a
//!   field name, not as TOML parse failures.
//! - `*Desired` is built from a declaration by a validated `TryFrom`.
//! - `*Observed` is what the remote API last reported, plus values the API
//!   only returns once (carried forward by the resource kind).
//! - a `*_drift` function compares observed and desired.

pub mod api_key;
pub mod collection;
pub mod index;
pub mod project;

pub use api_key::{ApiKeyDeclaration, ApiKeyDesired, ApiKeyObserved, ApiKeyRequest};
pub use collection::{CollectionDeclaration, CollectionDesired, CollectionObserved};
pub use index::{
    EmbedDesired, IndexDeclaration, IndexDesired, IndexObserved, IndexRequest, Placement,
    PodPlacement,
};
pub use project::{ProjectDeclaration, ProjectDesired, ProjectObserved};

use reconcile::ConfigError;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

/// Index and collection names
static RESOURCE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,43}[a-z0-9])?$").expect("resource name pattern is valid")
});

/// Longest project or API key name the admin API accepts
const MAX_ADMIN_NAME_LEN: usize = 100;

/// Validate an index or collection name.
pub fn validate_resource_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if RESOURCE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::field(
            field,
            format!(
                "'{name}' must be 1-45 lowercase alphanumeric characters or '-', \
                 and must not start or end with '-'"
            ),
        ))
    }
}

/// Validate a project or API key name.
pub fn validate_admin_name(field: &str, name: &str) -> Result<(), ConfigError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_ADMIN_NAME_LEN {
        return Err(ConfigError::field(
            field,
            format!("must be 1-{MAX_ADMIN_NAME_LEN} characters (got {len})"),
        ));
    }
    Ok(())
}

/// Parse an optional enumerated field.
pub(crate) fn parse_enum<T>(field: &str, value: Option<&str>) -> Result<Option<T>, ConfigError>
where
    T: FromStr<Err = String>,
{
    value
        .map(|raw| raw.parse::<T>().map_err(|e| ConfigError::field(field, e)))
        .transpose()
}

/// Render an optional list for drift display.
pub(crate) fn list(values: Option<&Vec<String>>) -> Option<String> {
    values.map(|values| format!("[{}]", values.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinecone::Metric;

    #[test]
    fn test_resource_names() {
        for name in ["docs", "a", "my-index-2", &"x".repeat(45)] {
            assert!(validate_resource_name("name", name).is_ok(), "{name}");
        }
        for name in ["", "-docs", "docs-", "Docs", "my_index", &"x".repeat(46)] {
            assert!(validate_resource_name("name", name).is_err(), "{name}");
        }
    }

    #[test]
    fn test_admin_names() {
        assert!(validate_admin_name("name", "Search Team").is_ok());
        assert!(validate_admin_name("name", &"p".repeat(100)).is_ok());
        assert!(validate_admin_name("name", "").is_err());
        let err = validate_admin_name("name", &"p".repeat(101)).unwrap_err();
        assert!(err.to_string().contains("got 101"));
    }

    #[test]
    fn test_parse_enum_names_field() {
        assert_eq!(
            parse_enum::<Metric>("metric", Some("cosine")).unwrap(),
            Some(Metric::Cosine)
        );
        assert_eq!(parse_enum::<Metric>("metric", None).unwrap(), None);
        let err = parse_enum::<Metric>("metric", Some("hamming")).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("metric"));
    }
}
