//! Vector index model

use super::{list, parse_enum, validate_resource_name};
use pinecone::{
    Cloud, ConfigureEmbed, ConfigureIndexRequest, CreateEmbed, CreateIndexForModelRequest,
    CreateIndexRequest, DeletionProtection, Index, IndexEmbed, IndexSpec, IndexStatus,
    MetadataConfig, Metric, Parameters, PodSpec, ServerlessSpec, VectorType,
};
use reconcile::{ChangeKind, ConfigError, DriftPlan};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Declaration
// ============================================================================

/// An `[[index]]` table from the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_protection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub spec: SpecDeclaration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<EmbedDeclaration>,
}

/// Placement block. Exactly one of the two must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<PodDeclaration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serverless: Option<ServerlessDeclaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodDeclaration {
    pub environment: String,
    pub pod_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shards: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_indexed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_collection: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerlessDeclaration {
    pub cloud: String,
    pub region: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedDeclaration {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_map: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_parameters: Option<Parameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_parameters: Option<Parameters>,
}

// ============================================================================
// Desired state
// ============================================================================

/// A validated index specification.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDesired {
    pub name: String,
    /// Optional with an embedding model, which fixes the dimension itself
    pub dimension: Option<u32>,
    /// `None` leaves the choice to the remote side
    pub metric: Option<Metric>,
    pub deletion_protection: DeletionProtection,
    pub vector_type: VectorType,
    pub tags: Option<BTreeMap<String, String>>,
    pub placement: Placement,
    pub embed: Option<EmbedDesired>,
}

/// Where the index runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Pod(PodPlacement),
    Serverless { cloud: Cloud, region: String },
}

impl Placement {
    pub fn variant(&self) -> &'static str {
        match self {
            Self::Pod(_) => "pod",
            Self::Serverless { .. } => "serverless",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodPlacement {
    pub environment: String,
    pub pod_type: String,
    pub shards: Option<u32>,
    pub replicas: Option<u32>,
    pub metadata_indexed: Option<Vec<String>>,
    pub source_collection: Option<String>,
}

/// Integrated embedding, serverless only
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedDesired {
    pub model: String,
    pub field_map: BTreeMap<String, String>,
    pub read_parameters: Option<Parameters>,
    pub write_parameters: Option<Parameters>,
}

impl TryFrom<&IndexDeclaration> for IndexDesired {
    type Error = ConfigError;

    fn try_from(decl: &IndexDeclaration) -> Result<Self, Self::Error> {
        validate_resource_name("name", &decl.name)?;

        let deletion_protection: DeletionProtection =
            parse_enum("deletion_protection", decl.deletion_protection.as_deref())?
                .unwrap_or_default();
        let vector_type: VectorType =
            parse_enum("vector_type", decl.vector_type.as_deref())?.unwrap_or_default();
        let mut metric: Option<Metric> = parse_enum("metric", decl.metric.as_deref())?;

        let placement = placement(&decl.spec)?;

        let embed = match &decl.embed {
            None => None,
            Some(embed) => {
                if matches!(placement, Placement::Pod(_)) {
                    return Err(ConfigError::field(
                        "embed",
                        "integrated embedding requires a serverless index",
                    ));
                }
                let embed_metric: Option<Metric> =
                    parse_enum("embed.metric", embed.metric.as_deref())?;
                match (metric, embed_metric) {
                    (Some(top), Some(nested)) if top != nested => {
                        return Err(ConfigError::field(
                            "embed.metric",
                            format!("'{nested}' conflicts with metric '{top}'"),
                        ));
                    }
                    (None, Some(nested)) => metric = Some(nested),
                    _ => {}
                }
                Some(embed_desired(embed)?)
            }
        };

        if decl.dimension == Some(0) {
            return Err(ConfigError::field("dimension", "must be at least 1"));
        }

        match vector_type {
            VectorType::Sparse => {
                if decl.dimension.is_some() {
                    return Err(ConfigError::field(
                        "dimension",
                        "must not be set for sparse indexes",
                    ));
                }
                if let Some(other) = metric.filter(|m| *m != Metric::Dotproduct) {
                    return Err(ConfigError::field(
                        "metric",
                        format!("sparse indexes require 'dotproduct', got '{other}'"),
                    ));
                }
                if matches!(placement, Placement::Pod(_)) {
                    return Err(ConfigError::field(
                        "spec.pod",
                        "sparse indexes must be serverless",
                    ));
                }
            }
            VectorType::Dense => {
                if decl.dimension.is_none() && embed.is_none() {
                    return Err(ConfigError::field(
                        "dimension",
                        "required for dense indexes without an embedding model",
                    ));
                }
            }
        }

        Ok(Self {
            name: decl.name.clone(),
            dimension: decl.dimension,
            metric,
            deletion_protection,
            vector_type,
            tags: decl.tags.clone(),
            placement,
            embed,
        })
    }
}

fn placement(spec: &SpecDeclaration) -> Result<Placement, ConfigError> {
    match (&spec.pod, &spec.serverless) {
        (Some(pod), None) => {
            if pod.environment.is_empty() {
                return Err(ConfigError::field("spec.pod.environment", "must not be empty"));
            }
            if pod.pod_type.is_empty() {
                return Err(ConfigError::field("spec.pod.pod_type", "must not be empty"));
            }
            for (field, value) in [("spec.pod.shards", pod.shards), ("spec.pod.replicas", pod.replicas)]
            {
                if value == Some(0) {
                    return Err(ConfigError::field(field, "must be at least 1"));
                }
            }
            if pod_count(pod.replicas, pod.shards).is_none() {
                return Err(ConfigError::field(
                    "spec.pod",
                    "replicas times shards exceeds the maximum pod count",
                ));
            }
            if let Some(source) = &pod.source_collection {
                validate_resource_name("spec.pod.source_collection", source)?;
            }
            Ok(Placement::Pod(PodPlacement {
                environment: pod.environment.clone(),
                pod_type: pod.pod_type.clone(),
                shards: pod.shards,
                replicas: pod.replicas,
                metadata_indexed: pod.metadata_indexed.clone(),
                source_collection: pod.source_collection.clone(),
            }))
        }
        (None, Some(serverless)) => {
            let cloud: Cloud = parse_enum("spec.serverless.cloud", Some(serverless.cloud.as_str()))?
                .ok_or_else(|| ConfigError::field("spec.serverless.cloud", "must be set"))?;
            if serverless.region.is_empty() {
                return Err(ConfigError::field("spec.serverless.region", "must not be empty"));
            }
            Ok(Placement::Serverless {
                cloud,
                region: serverless.region.clone(),
            })
        }
        (Some(_), Some(_)) => Err(ConfigError::field(
            "spec",
            "exactly one of 'pod' or 'serverless' may be set, found both",
        )),
        (None, None) => Err(ConfigError::field(
            "spec",
            "exactly one of 'pod' or 'serverless' must be set",
        )),
    }
}

fn embed_desired(embed: &EmbedDeclaration) -> Result<EmbedDesired, ConfigError> {
    if embed.model.is_empty() {
        return Err(ConfigError::field("embed.model", "must not be empty"));
    }
    let field_map = match &embed.field_map {
        Some(map) if !map.is_empty() => map.clone(),
        _ => {
            return Err(ConfigError::field(
                "embed.field_map",
                "must map at least one record field to the model input",
            ));
        }
    };
    Ok(EmbedDesired {
        model: embed.model.clone(),
        field_map,
        read_parameters: embed.read_parameters.clone(),
        write_parameters: embed.write_parameters.clone(),
    })
}

// ============================================================================
// Requests
// ============================================================================

/// Create request for an index: plain, or backed by a hosted model.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexRequest {
    Standard(CreateIndexRequest),
    ForModel(CreateIndexForModelRequest),
}

impl IndexDesired {
    pub fn to_request(&self) -> Result<IndexRequest, ConfigError> {
        if let Some(embed) = &self.embed {
            let Placement::Serverless { cloud, region } = &self.placement else {
                return Err(ConfigError::field(
                    "embed",
                    "integrated embedding requires a serverless index",
                ));
            };
            return Ok(IndexRequest::ForModel(CreateIndexForModelRequest {
                name: self.name.clone(),
                cloud: *cloud,
                region: region.clone(),
                deletion_protection: self.deletion_protection,
                tags: self.tags.clone(),
                embed: CreateEmbed {
                    model: embed.model.clone(),
                    metric: self.metric,
                    field_map: embed.field_map.clone(),
                    read_parameters: embed.read_parameters.clone(),
                    write_parameters: embed.write_parameters.clone(),
                },
            }));
        }

        let metric = match self.vector_type {
            VectorType::Sparse => Some(Metric::Dotproduct),
            VectorType::Dense => self.metric,
        };
        let spec = match &self.placement {
            Placement::Pod(pod) => IndexSpec::Pod(PodSpec {
                environment: pod.environment.clone(),
                pod_type: pod.pod_type.clone(),
                replicas: pod.replicas,
                shards: pod.shards,
                pods: None,
                metadata_config: pod.metadata_indexed.clone().map(|indexed| MetadataConfig {
                    indexed: Some(indexed),
                }),
                source_collection: pod.source_collection.clone(),
            }),
            Placement::Serverless { cloud, region } => IndexSpec::Serverless(ServerlessSpec {
                cloud: *cloud,
                region: region.clone(),
            }),
        };
        Ok(IndexRequest::Standard(CreateIndexRequest {
            name: self.name.clone(),
            dimension: self.dimension,
            metric,
            deletion_protection: self.deletion_protection,
            vector_type: self.vector_type,
            tags: self.tags.clone(),
            spec,
        }))
    }
}

/// Validate a declaration and build its create request.
pub fn to_index_request(decl: &IndexDeclaration) -> Result<IndexRequest, ConfigError> {
    IndexDesired::try_from(decl)?.to_request()
}

// ============================================================================
// Observed state
// ============================================================================

/// Last known remote state of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexObserved {
    /// Indexes are addressed by name
    pub id: String,
    pub name: String,
    pub host: String,
    pub status: IndexStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    pub metric: Metric,
    pub deletion_protection: DeletionProtection,
    pub vector_type: VectorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    pub spec: IndexSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<IndexEmbed>,
}

pub fn observe_index(index: Index) -> IndexObserved {
    IndexObserved {
        id: index.name.clone(),
        name: index.name,
        host: index.host,
        status: index.status,
        dimension: index.dimension,
        metric: index.metric,
        deletion_protection: index.deletion_protection,
        vector_type: index.vector_type,
        tags: index.tags,
        spec: index.spec,
        embed: index.embed,
    }
}

// ============================================================================
// Drift
// ============================================================================

/// Pods an index runs on; `None` when the product does not fit.
fn pod_count(replicas: Option<u32>, shards: Option<u32>) -> Option<u32> {
    replicas.unwrap_or(1).checked_mul(shards.unwrap_or(1))
}

/// Compare an observed index with its desired specification.
pub fn index_drift(prior: &IndexObserved, desired: &IndexDesired) -> DriftPlan {
    let mut plan = DriftPlan::new();

    plan.compare(
        "name",
        ChangeKind::ForcesReplace,
        Some(prior.name.as_str()),
        Some(desired.name.as_str()),
    );
    if desired.dimension.is_some() {
        plan.compare(
            "dimension",
            ChangeKind::ForcesReplace,
            prior.dimension.as_ref(),
            desired.dimension.as_ref(),
        );
    }
    if let Some(metric) = &desired.metric {
        plan.compare("metric", ChangeKind::ForcesReplace, Some(&prior.metric), Some(metric));
    }
    plan.compare(
        "vector_type",
        ChangeKind::ForcesReplace,
        Some(&prior.vector_type),
        Some(&desired.vector_type),
    );
    plan.compare(
        "deletion_protection",
        ChangeKind::MutableUpdate,
        Some(&prior.deletion_protection),
        Some(&desired.deletion_protection),
    );
    plan.set_tags(prior.tags.as_ref(), desired.tags.as_ref());

    placement_drift(&mut plan, &prior.spec, &desired.placement);
    embed_drift(&mut plan, prior.embed.as_ref(), desired.embed.as_ref());
    plan
}

fn placement_drift(plan: &mut DriftPlan, prior: &IndexSpec, desired: &Placement) {
    const REPLACE: ChangeKind = ChangeKind::ForcesReplace;

    match (prior, desired) {
        (IndexSpec::Pod(pod), Placement::Pod(want)) => {
            plan.compare(
                "spec.pod.environment",
                REPLACE,
                Some(pod.environment.as_str()),
                Some(want.environment.as_str()),
            );
            plan.compare(
                "spec.pod.pod_type",
                REPLACE,
                Some(pod.pod_type.as_str()),
                Some(want.pod_type.as_str()),
            );
            if want.shards.is_some() {
                plan.compare("spec.pod.shards", REPLACE, pod.shards.as_ref(), want.shards.as_ref());
            }
            if want.replicas.is_some() {
                plan.compare(
                    "spec.pod.replicas",
                    REPLACE,
                    pod.replicas.as_ref(),
                    want.replicas.as_ref(),
                );
            }
            if want.metadata_indexed.is_some() {
                let indexed = pod.metadata_config.as_ref().and_then(|m| m.indexed.as_ref());
                if indexed != want.metadata_indexed.as_ref() {
                    plan.record(
                        "spec.pod.metadata_indexed",
                        REPLACE,
                        list(indexed),
                        list(want.metadata_indexed.as_ref()),
                    );
                }
            }
            if want.source_collection.is_some() {
                plan.compare(
                    "spec.pod.source_collection",
                    REPLACE,
                    pod.source_collection.as_deref(),
                    want.source_collection.as_deref(),
                );
            }
            let expected = pod_count(want.replicas.or(pod.replicas), want.shards.or(pod.shards));
            if let (Some(pods), Some(expected)) = (pod.pods, expected) {
                plan.compare(
                    "spec.pod.pods",
                    ChangeKind::RemoteComputed,
                    Some(&pods),
                    Some(&expected),
                );
            }
        }
        (IndexSpec::Serverless(serverless), Placement::Serverless { cloud, region }) => {
            plan.compare(
                "spec.serverless.cloud",
                REPLACE,
                Some(&serverless.cloud),
                Some(cloud),
            );
            plan.compare(
                "spec.serverless.region",
                REPLACE,
                Some(serverless.region.as_str()),
                Some(region.as_str()),
            );
        }
        (prior, desired) => {
            let from = match prior {
                IndexSpec::Pod(_) => "pod",
                IndexSpec::Serverless(_) => "serverless",
            };
            plan.record(
                "spec",
                REPLACE,
                Some(from.to_string()),
                Some(desired.variant().to_string()),
            );
        }
    }
}

fn embed_drift(plan: &mut DriftPlan, prior: Option<&IndexEmbed>, desired: Option<&EmbedDesired>) {
    match (prior, desired) {
        (None, None) => {}
        (Some(have), Some(want)) => {
            plan.compare(
                "embed.model",
                ChangeKind::ForcesReplace,
                Some(have.model.as_str()),
                Some(want.model.as_str()),
            );
            if have.field_map.as_ref() != Some(&want.field_map) {
                plan.record(
                    "embed.field_map",
                    ChangeKind::ForcesReplace,
                    have.field_map.as_ref().map(format_map),
                    Some(format_map(&want.field_map)),
                );
            }
            parameters_drift(
                plan,
                "embed.read_parameters",
                have.read_parameters.as_ref(),
                want.read_parameters.as_ref(),
            );
            parameters_drift(
                plan,
                "embed.write_parameters",
                have.write_parameters.as_ref(),
                want.write_parameters.as_ref(),
            );
        }
        (have, want) => plan.record(
            "embed",
            ChangeKind::ForcesReplace,
            have.map(|e| e.model.clone()),
            want.map(|e| e.model.clone()),
        ),
    }
}

/// Parameters are compared only when declared.
fn parameters_drift(
    plan: &mut DriftPlan,
    field: &str,
    have: Option<&Parameters>,
    want: Option<&Parameters>,
) {
    if want.is_some() && have != want {
        plan.record(
            field,
            ChangeKind::MutableUpdate,
            have.map(format_parameters),
            want.map(format_parameters),
        );
    }
}

fn format_map(map: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", pairs.join(", "))
}

fn format_parameters(params: &Parameters) -> String {
    serde_json::to_string(params).unwrap_or_else(|_| format!("{params:?}"))
}

/// Build the configure request for the mutable fields in `plan`.
pub fn index_patch(desired: &IndexDesired, plan: &DriftPlan) -> ConfigureIndexRequest {
    let mut patch = ConfigureIndexRequest {
        tags: plan.tags.clone(),
        ..Default::default()
    };
    if plan.changed("deletion_protection") {
        patch.deletion_protection = Some(desired.deletion_protection);
    }
    if let Some(embed) = &desired.embed {
        let read = plan
            .changed("embed.read_parameters")
            .then(|| embed.read_parameters.clone())
            .flatten();
        let write = plan
            .changed("embed.write_parameters")
            .then(|| embed.write_parameters.clone())
            .flatten();
        if read.is_some() || write.is_some() {
            patch.embed = Some(ConfigureEmbed {
                read_parameters: read,
                write_parameters: write,
            });
        }
    }
    patch
}
