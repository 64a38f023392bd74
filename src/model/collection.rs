//! Collection model
//!
//! A collection is a static copy of a pod-based index. Nothing about it can
//! be changed in place.

use super::validate_resource_name;
use pinecone::{Collection, CreateCollectionRequest};
use reconcile::{ChangeKind, ConfigError, DriftPlan};
use serde::{Deserialize, Serialize};

/// A `[[collection]]` table from the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDeclaration {
    pub name: String,
    /// Index to copy vectors from
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDesired {
    pub name: String,
    pub source: String,
}

impl TryFrom<&CollectionDeclaration> for CollectionDesired {
    type Error = ConfigError;

    fn try_from(decl: &CollectionDeclaration) -> Result<Self, Self::Error> {
        validate_resource_name("name", &decl.name)?;
        validate_resource_name("source", &decl.source)?;
        Ok(Self {
            name: decl.name.clone(),
            source: decl.source.clone(),
        })
    }
}

impl CollectionDesired {
    pub fn to_request(&self) -> CreateCollectionRequest {
        CreateCollectionRequest {
            name: self.name.clone(),
            source: self.source.clone(),
        }
    }
}

/// Last known remote state of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionObserved {
    pub id: String,
    pub name: String,
    /// Only known from the create request; describe never returns it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_count: Option<u64>,
    pub environment: String,
}

pub fn observe_collection(collection: Collection, source: Option<String>) -> CollectionObserved {
    CollectionObserved {
        id: collection.name.clone(),
        name: collection.name,
        source,
        status: collection.status,
        size: collection.size,
        dimension: collection.dimension,
        vector_count: collection.vector_count,
        environment: collection.environment,
    }
}

/// Every difference forces replacement. An unknown source is not compared.
pub fn collection_drift(prior: &CollectionObserved, desired: &CollectionDesired) -> DriftPlan {
    let mut plan = DriftPlan::new();
    plan.compare(
        "name",
        ChangeKind::ForcesReplace,
        Some(prior.name.as_str()),
        Some(desired.name.as_str()),
    );
    if prior.source.is_some() {
        plan.compare(
            "source",
            ChangeKind::ForcesReplace,
            prior.source.as_deref(),
            Some(desired.source.as_str()),
        );
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl() -> CollectionDeclaration {
        CollectionDeclaration {
            name: "docs-snapshot".to_string(),
            source: "docs".to_string(),
        }
    }

    fn observed(source: Option<&str>) -> CollectionObserved {
        observe_collection(
            Collection {
                name: "docs-snapshot".to_string(),
                status: "Ready".to_string(),
                size: Some(1024),
                dimension: Some(8),
                vector_count: Some(10),
                environment: "us-east1-gcp".to_string(),
            },
            source.map(str::to_string),
        )
    }

    #[test]
    fn test_request() {
        let desired = CollectionDesired::try_from(&decl()).unwrap();
        assert_eq!(desired.to_request().source, "docs");
    }

    #[test]
    fn test_invalid_source_rejected() {
        let bad = CollectionDeclaration {
            source: String::new(),
            ..decl()
        };
        let err = CollectionDesired::try_from(&bad).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("source"));
    }

    #[test]
    fn test_source_change_forces_replace() {
        let desired = CollectionDesired::try_from(&CollectionDeclaration {
            source: "other".to_string(),
            ..decl()
        })
        .unwrap();
        let plan = collection_drift(&observed(Some("docs")), &desired);
        assert_eq!(plan.replace_fields(), vec!["source"]);

        let plan = collection_drift(&observed(None), &desired);
        assert!(plan.is_empty());
    }
}
