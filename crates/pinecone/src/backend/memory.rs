//! In-memory backend with simulated eventual consistency.
//!
//! New indexes and collections report "not ready" for a configurable number
//! of describes before settling, and deleted ones linger for the same number
//! of describes before disappearing. Every call is counted, and failures can
//! be queued per operation, so tests can assert exactly which remote calls a
//! scenario made.

use crate::backend::ControlPlane;
use crate::error::{Error, Result};
use crate::types::{
    ApiKey, ApiKeyWithSecret, Collection, ConfigureIndexRequest, CreateApiKeyRequest,
    CreateCollectionRequest, CreateIndexForModelRequest, CreateIndexRequest,
    CreateProjectRequest, DeletionProtection, Index, IndexEmbed, IndexSpec, IndexState,
    IndexStatus, Metric, PodSpec, Project, ServerlessSpec, UpdateApiKeyRequest,
    UpdateProjectRequest, VectorType,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Dimension reported for indexes created for a hosted model
const MODEL_DIMENSION: u32 = 1024;

#[derive(Debug, Clone)]
struct Tracked<T> {
    value: T,
    /// Describes left before the object settles
    pending: u32,
    /// Describes left before a deleted object disappears
    deleting: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    settle_after: u32,
    next_id: u64,
    indexes: BTreeMap<String, Tracked<Index>>,
    collections: BTreeMap<String, Tracked<Collection>>,
    projects: BTreeMap<String, Project>,
    api_keys: BTreeMap<String, ApiKey>,
    calls: HashMap<&'static str, u32>,
    failures: HashMap<&'static str, VecDeque<Error>>,
}

impl State {
    /// Count a call and pop a queued failure for it, if any.
    fn enter(&mut self, op: &'static str) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn tracked<T>(&self, value: T) -> Tracked<T> {
        Tracked {
            value,
            pending: self.settle_after,
            deleting: None,
        }
    }
}

/// Advance a tracked object by one describe.
///
/// Returns `None` once a deleted object has disappeared.
fn tick<T: Clone>(
    entries: &mut BTreeMap<String, Tracked<T>>,
    name: &str,
    settle: impl FnOnce(&mut T),
) -> Option<T> {
    let entry = entries.get_mut(name)?;
    if let Some(left) = entry.deleting {
        if left == 0 {
            entries.remove(name);
            return None;
        }
        entry.deleting = Some(left - 1);
        return Some(entry.value.clone());
    }
    if entry.pending == 0 {
        settle(&mut entry.value);
    } else {
        entry.pending -= 1;
    }
    Some(entry.value.clone())
}

/// In-memory Pinecone with simulated eventual consistency.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    /// Create a backend where objects settle on their first describe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of describes an object stays unsettled (or lingers once deleted).
    #[must_use]
    pub fn with_settle_after(self, describes: u32) -> Self {
        self.lock().settle_after = describes;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// How many times an operation (e.g. `"describe_index"`) was called.
    pub fn calls(&self, op: &str) -> u32 {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Total number of calls across all operations.
    pub fn total_calls(&self) -> u32 {
        self.lock().calls.values().sum()
    }

    /// Make the next call to `op` fail with `err`.
    pub fn fail_next(&self, op: &'static str, err: Error) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Insert a project as if it had been created out of band.
    pub fn seed_project(&self, project: Project) {
        self.lock().projects.insert(project.id.clone(), project);
    }

    /// Mutate a stored index behind the client's back (simulates drift).
    pub fn modify_index(&self, name: &str, change: impl FnOnce(&mut Index)) {
        if let Some(entry) = self.lock().indexes.get_mut(name) {
            change(&mut entry.value);
        }
    }

    /// Remove an object behind the client's back.
    pub fn remove_index(&self, name: &str) {
        self.lock().indexes.remove(name);
    }

    fn insert_index(&self, op: &'static str, index: Index) -> Result<Index> {
        let mut state = self.lock();
        state.enter(op)?;
        if state.indexes.contains_key(&index.name) {
            return Err(Error::http(
                format!("HTTP 409: index '{}' already exists", index.name),
                Some(409),
            ));
        }
        log::debug!("memory: created index {}", index.name);
        let tracked = state.tracked(index.clone());
        state.indexes.insert(index.name.clone(), tracked);
        Ok(index)
    }
}

fn initializing() -> IndexStatus {
    IndexStatus {
        ready: false,
        state: IndexState::Initializing,
    }
}

fn host_for(name: &str) -> String {
    format!("{name}-abc1234.svc.pinecone.io")
}

impl ControlPlane for MemoryBackend {
    fn create_index(&self, request: &CreateIndexRequest) -> Result<Index> {
        let spec = match &request.spec {
            IndexSpec::Pod(pod) => {
                let (replicas, shards) = (pod.replicas.unwrap_or(1), pod.shards.unwrap_or(1));
                let pods = replicas
                    .checked_mul(shards)
                    .ok_or_else(|| Error::http("HTTP 400: pod count exceeds quota", Some(400)))?;
                IndexSpec::Pod(PodSpec {
                    replicas: Some(replicas),
                    shards: Some(shards),
                    pods: Some(pods),
                    ..pod.clone()
                })
            }
            serverless @ IndexSpec::Serverless(_) => serverless.clone(),
        };
        let metric = request.metric.unwrap_or(match request.vector_type {
            VectorType::Sparse => Metric::Dotproduct,
            VectorType::Dense => Metric::Cosine,
        });
        let index = Index {
            name: request.name.clone(),
            dimension: request.dimension,
            metric,
            deletion_protection: request.deletion_protection,
            vector_type: request.vector_type,
            tags: request.tags.clone(),
            host: host_for(&request.name),
            spec,
            status: initializing(),
            embed: None,
        };
        self.insert_index("create_index", index)
    }

    fn create_index_for_model(&self, request: &CreateIndexForModelRequest) -> Result<Index> {
        let metric = request.embed.metric.unwrap_or(Metric::Cosine);
        let index = Index {
            name: request.name.clone(),
            dimension: Some(MODEL_DIMENSION),
            metric,
            deletion_protection: request.deletion_protection,
            vector_type: VectorType::Dense,
            tags: request.tags.clone(),
            host: host_for(&request.name),
            spec: IndexSpec::Serverless(ServerlessSpec {
                cloud: request.cloud,
                region: request.region.clone(),
            }),
            status: initializing(),
            embed: Some(IndexEmbed {
                model: request.embed.model.clone(),
                metric: Some(metric),
                dimension: Some(MODEL_DIMENSION),
                vector_type: Some(VectorType::Dense),
                field_map: Some(request.embed.field_map.clone()),
                read_parameters: request.embed.read_parameters.clone(),
                write_parameters: request.embed.write_parameters.clone(),
            }),
        };
        self.insert_index("create_index_for_model", index)
    }

    fn describe_index(&self, name: &str) -> Result<Index> {
        let mut state = self.lock();
        state.enter("describe_index")?;
        tick(&mut state.indexes, name, |index| {
            index.status = IndexStatus {
                ready: true,
                state: IndexState::Ready,
            };
        })
        .ok_or_else(|| Error::not_found(format!("index '{name}'")))
    }

    fn configure_index(&self, name: &str, request: &ConfigureIndexRequest) -> Result<Index> {
        let mut state = self.lock();
        state.enter("configure_index")?;
        let entry = state
            .indexes
            .get_mut(name)
            .filter(|e| e.deleting.is_none())
            .ok_or_else(|| Error::not_found(format!("index '{name}'")))?;
        let index = &mut entry.value;

        if let Some(protection) = request.deletion_protection {
            index.deletion_protection = protection;
        }
        if let Some(patch) = &request.tags {
            let tags = index.tags.get_or_insert_with(BTreeMap::new);
            for (key, value) in patch {
                if value.is_empty() {
                    tags.remove(key);
                } else {
                    tags.insert(key.clone(), value.clone());
                }
            }
        }
        if let Some(embed_patch) = &request.embed {
            let embed = index.embed.as_mut().ok_or_else(|| {
                Error::http(
                    format!("HTTP 400: index '{name}' has no integrated embedding"),
                    Some(400),
                )
            })?;
            if let Some(params) = &embed_patch.read_parameters {
                embed.read_parameters = Some(params.clone());
            }
            if let Some(params) = &embed_patch.write_parameters {
                embed.write_parameters = Some(params.clone());
            }
        }
        Ok(index.clone())
    }

    fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.enter("delete_index")?;
        let linger = state.settle_after;
        let entry = state
            .indexes
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("index '{name}'")))?;
        if entry.value.deletion_protection == DeletionProtection::Enabled {
            return Err(Error::http(
                format!("HTTP 403: deletion protection is enabled for index '{name}'"),
                Some(403),
            ));
        }
        entry.value.status = IndexStatus {
            ready: false,
            state: IndexState::Terminating,
        };
        entry.deleting.get_or_insert(linger);
        Ok(())
    }

    fn create_collection(&self, request: &CreateCollectionRequest) -> Result<Collection> {
        let mut state = self.lock();
        state.enter("create_collection")?;
        let Some(source) = state.indexes.get(&request.source) else {
            return Err(Error::http(
                format!("HTTP 400: source index '{}' does not exist", request.source),
                Some(400),
            ));
        };
        let environment = match &source.value.spec {
            IndexSpec::Pod(pod) => pod.environment.clone(),
            IndexSpec::Serverless(_) => {
                return Err(Error::http(
                    "HTTP 400: collections can only be created from pod-based indexes",
                    Some(400),
                ));
            }
        };
        let dimension = source.value.dimension;
        if state.collections.contains_key(&request.name) {
            return Err(Error::http(
                format!("HTTP 409: collection '{}' already exists", request.name),
                Some(409),
            ));
        }
        let collection = Collection {
            name: request.name.clone(),
            status: "Initializing".to_string(),
            size: None,
            dimension,
            vector_count: None,
            environment,
        };
        let tracked = state.tracked(collection.clone());
        state.collections.insert(request.name.clone(), tracked);
        Ok(collection)
    }

    fn describe_collection(&self, name: &str) -> Result<Collection> {
        let mut state = self.lock();
        state.enter("describe_collection")?;
        tick(&mut state.collections, name, |collection| {
            collection.status = "Ready".to_string();
            collection.size.get_or_insert(3_126_700);
            collection.vector_count.get_or_insert(120);
        })
        .ok_or_else(|| Error::not_found(format!("collection '{name}'")))
    }

    fn delete_collection(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.enter("delete_collection")?;
        let linger = state.settle_after;
        let entry = state
            .collections
            .get_mut(name)
            .ok_or_else(|| Error::not_found(format!("collection '{name}'")))?;
        entry.value.status = "Terminating".to_string();
        entry.deleting.get_or_insert(linger);
        Ok(())
    }

    fn create_project(&self, request: &CreateProjectRequest) -> Result<Project> {
        let mut state = self.lock();
        state.enter("create_project")?;
        let id = state.next_id("proj");
        let project = Project {
            id: id.clone(),
            name: request.name.clone(),
            max_pods: request.max_pods.unwrap_or(0),
            force_encryption_with_cmek: request.force_encryption_with_cmek.unwrap_or(false),
            organization_id: "org-0001".to_string(),
            created_at: Some("2025-01-01T00:00:00Z".to_string()),
        };
        state.projects.insert(id, project.clone());
        Ok(project)
    }

    fn describe_project(&self, id: &str) -> Result<Project> {
        let mut state = self.lock();
        state.enter("describe_project")?;
        state
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("project '{id}'")))
    }

    fn update_project(&self, id: &str, request: &UpdateProjectRequest) -> Result<Project> {
        let mut state = self.lock();
        state.enter("update_project")?;
        let project = state
            .projects
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("project '{id}'")))?;
        if let Some(name) = &request.name {
            project.name = name.clone();
        }
        if let Some(max_pods) = request.max_pods {
            project.max_pods = max_pods;
        }
        if let Some(cmek) = request.force_encryption_with_cmek {
            project.force_encryption_with_cmek = cmek;
        }
        Ok(project.clone())
    }

    fn delete_project(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.enter("delete_project")?;
        if state.projects.remove(id).is_none() {
            return Err(Error::not_found(format!("project '{id}'")));
        }
        state.api_keys.retain(|_, key| key.project_id != id);
        Ok(())
    }

    fn create_api_key(
        &self,
        project_id: &str,
        request: &CreateApiKeyRequest,
    ) -> Result<ApiKeyWithSecret> {
        let mut state = self.lock();
        state.enter("create_api_key")?;
        if !state.projects.contains_key(project_id) {
            return Err(Error::not_found(format!("project '{project_id}'")));
        }
        let id = state.next_id("key");
        let key = ApiKey {
            id: id.clone(),
            name: request.name.clone(),
            project_id: project_id.to_string(),
            roles: request
                .roles
                .clone()
                .unwrap_or_else(|| vec!["ProjectEditor".to_string()]),
        };
        state.api_keys.insert(id.clone(), key.clone());
        Ok(ApiKeyWithSecret {
            key,
            value: format!("pcsk_{id}_secret"),
        })
    }

    fn describe_api_key(&self, id: &str) -> Result<ApiKey> {
        let mut state = self.lock();
        state.enter("describe_api_key")?;
        state
            .api_keys
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("API key '{id}'")))
    }

    fn update_api_key(&self, id: &str, request: &UpdateApiKeyRequest) -> Result<ApiKey> {
        let mut state = self.lock();
        state.enter("update_api_key")?;
        let key = state
            .api_keys
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("API key '{id}'")))?;
        if let Some(name) = &request.name {
            key.name = name.clone();
        }
        if let Some(roles) = &request.roles {
            key.roles = roles.clone();
        }
        Ok(key.clone())
    }

    fn delete_api_key(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        state.enter("delete_api_key")?;
        match state.api_keys.remove(id) {
            Some(_) => Ok(()),
            None => Err(Error::not_found(format!("API key '{id}'"))),
        }
    }

    // Listing does not advance settling; terminating objects are included.

    fn list_indexes(&self) -> Result<Vec<Index>> {
        let mut state = self.lock();
        state.enter("list_indexes")?;
        Ok(state.indexes.values().map(|e| e.value.clone()).collect())
    }

    fn list_collections(&self) -> Result<Vec<Collection>> {
        let mut state = self.lock();
        state.enter("list_collections")?;
        Ok(state.collections.values().map(|e| e.value.clone()).collect())
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let mut state = self.lock();
        state.enter("list_projects")?;
        Ok(state.projects.values().cloned().collect())
    }

    fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKey>> {
        let mut state = self.lock();
        state.enter("list_api_keys")?;
        if !state.projects.contains_key(project_id) {
            return Err(Error::not_found(format!("project '{project_id}'")));
        }
        Ok(state
            .api_keys
            .values()
            .filter(|key| key.project_id == project_id)
            .cloned()
            .collect())
    }
}
