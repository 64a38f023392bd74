//! Wire types for the Pinecone control plane and admin APIs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Parameter map passed through to an embedding model
pub type Parameters = BTreeMap<String, Value>;

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => {
                        let allowed: Vec<&str> = Self::ALL.iter().map(Self::as_str).collect();
                        Err(format!("'{other}' is not one of: {}", allowed.join(", ")))
                    }
                }
            }
        }
    };
}

wire_enum!(
    /// Distance metric of an index
    Metric {
        Cosine => "cosine",
        Euclidean => "euclidean",
        Dotproduct => "dotproduct",
    }
);

wire_enum!(
    /// Whether an index can be deleted
    DeletionProtection {
        Enabled => "enabled",
        Disabled => "disabled",
    }
);

wire_enum!(
    /// Dense or sparse vectors
    VectorType {
        Dense => "dense",
        Sparse => "sparse",
    }
);

wire_enum!(
    /// Cloud provider hosting a serverless index
    Cloud {
        Aws => "aws",
        Gcp => "gcp",
        Azure => "azure",
    }
);

impl Default for DeletionProtection {
    fn default() -> Self {
        Self::Disabled
    }
}

impl Default for VectorType {
    fn default() -> Self {
        Self::Dense
    }
}

/// Provisioning state reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexState {
    Initializing,
    InitializationFailed,
    ScalingUp,
    ScalingDown,
    ScalingUpPodSize,
    ScalingDownPodSize,
    Terminating,
    Ready,
    Disabled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub ready: bool,
    pub state: IndexState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    pub environment: String,
    pub pod_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<u32>,
    /// Computed by the API as replicas × shards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_config: Option<MetadataConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_collection: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerlessSpec {
    pub cloud: Cloud,
    pub region: String,
}

/// Where an index runs. Serialized as `{"pod": {..}}` or `{"serverless": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSpec {
    Pod(PodSpec),
    Serverless(ServerlessSpec),
}

/// Integrated embedding configuration of an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEmbed {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_type: Option<VectorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_map: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_parameters: Option<Parameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    pub metric: Metric,
    #[serde(default)]
    pub deletion_protection: DeletionProtection,
    #[serde(default)]
    pub vector_type: VectorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    pub host: String,
    pub spec: IndexSpec,
    pub status: IndexStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<IndexEmbed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIndexRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    pub deletion_protection: DeletionProtection,
    pub vector_type: VectorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    pub spec: IndexSpec,
}

/// Embedding settings for `create-for-model`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateEmbed {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    pub field_map: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_parameters: Option<Parameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_parameters: Option<Parameters>,
}

/// Create a serverless index backed by a hosted embedding model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIndexForModelRequest {
    pub name: String,
    pub cloud: Cloud,
    pub region: String,
    pub deletion_protection: DeletionProtection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    pub embed: CreateEmbed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigureEmbed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_parameters: Option<Parameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_parameters: Option<Parameters>,
}

/// In-place index update. Tags with an empty value are removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigureIndexRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_protection: Option<DeletionProtection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<ConfigureEmbed>,
}

impl ConfigureIndexRequest {
    pub fn is_empty(&self) -> bool {
        self.deletion_protection.is_none() && self.tags.is_none() && self.embed.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    /// "Initializing", "Ready" or "Terminating"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_count: Option<u64>,
    #[serde(default)]
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    /// Name of the index to copy vectors from
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub max_pods: u32,
    pub force_encryption_with_cmek: bool,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_encryption_with_cmek: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_encryption_with_cmek: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub name: String,
    pub project_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Returned only by key creation; the secret is never readable again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyWithSecret {
    pub key: ApiKey,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateApiKeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

// ============================================================================
// List responses
// ============================================================================

/// `GET /indexes`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexList {
    #[serde(default)]
    pub indexes: Vec<Index>,
}

/// `GET /collections`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionList {
    #[serde(default)]
    pub collections: Vec<Collection>,
}

/// Admin API lists wrap their items in `data`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}
