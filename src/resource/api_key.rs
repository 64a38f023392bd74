//! API key resource (admin API)
//!
//! The key secret is only returned by the create call, so it is carried
//! forward across every later describe.

use pinecone::UpdateApiKeyRequest;
use reconcile::{
    ConfigError, DriftPlan, ImportId, PollVerdict, Reconcilable, RemoteError, Timeouts,
};
use std::time::Duration;

use super::{Client, remote};
use crate::model::api_key::{api_key_drift, api_key_patch, observe_api_key};
use crate::model::{ApiKeyDeclaration, ApiKeyDesired, ApiKeyObserved, ApiKeyRequest};

pub struct ApiKeyKind {
    client: Client,
}

impl ApiKeyKind {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Reconcilable for ApiKeyKind {
    type Desired = ApiKeyDeclaration;
    type Observed = ApiKeyObserved;
    type Request = ApiKeyRequest;
    type Patch = UpdateApiKeyRequest;

    fn kind(&self) -> &'static str {
        "api_key"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(2 * 60))
    }

    fn to_request(&self, desired: &ApiKeyDeclaration) -> Result<ApiKeyRequest, ConfigError> {
        Ok(ApiKeyDesired::try_from(desired)?.to_request())
    }

    fn create(&self, request: &ApiKeyRequest) -> Result<ApiKeyObserved, RemoteError> {
        let created = self
            .client
            .create_api_key(&request.project_id, &request.body)
            .map_err(remote)?;
        Ok(observe_api_key(created.key, Some(created.value)))
    }

    fn describe(&self, id: &str) -> Result<ApiKeyObserved, RemoteError> {
        self.client
            .describe_api_key(id)
            .map(|key| observe_api_key(key, None))
            .map_err(remote)
    }

    fn drift(
        &self,
        prior: &ApiKeyObserved,
        desired: &ApiKeyDeclaration,
    ) -> Result<DriftPlan, ConfigError> {
        Ok(api_key_drift(prior, &ApiKeyDesired::try_from(desired)?))
    }

    fn to_patch(
        &self,
        desired: &ApiKeyDeclaration,
        plan: &DriftPlan,
    ) -> Result<UpdateApiKeyRequest, ConfigError> {
        Ok(api_key_patch(&ApiKeyDesired::try_from(desired)?, plan))
    }

    fn update(&self, id: &str, patch: &UpdateApiKeyRequest) -> Result<ApiKeyObserved, RemoteError> {
        self.client
            .update_api_key(id, patch)
            .map(|key| observe_api_key(key, None))
            .map_err(remote)
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.client.delete_api_key(id).map_err(remote)
    }

    fn id(&self, observed: &ApiKeyObserved) -> String {
        observed.id.clone()
    }

    fn readiness(&self, _: &ApiKeyObserved) -> PollVerdict {
        PollVerdict::Done
    }

    fn carry_forward(
        &self,
        prior: Option<&ApiKeyObserved>,
        mut fresh: ApiKeyObserved,
    ) -> ApiKeyObserved {
        if fresh.value.is_none() {
            fresh.value = prior.and_then(|p| p.value.clone());
        }
        fresh
    }

    /// Keys are imported as `<project-id>:<key-id>`
    fn parse_import_id(&self, raw: &str) -> Result<ImportId, ConfigError> {
        ImportId::parse_scoped(raw)
    }

    fn import(&self, id: &ImportId) -> Result<ApiKeyObserved, RemoteError> {
        let observed = self.describe(&id.id)?;
        match id.parent.as_deref() {
            Some(project) if project != observed.project_id => Err(RemoteError::fatal(format!(
                "API key {} belongs to project {}, not {project}",
                observed.id, observed.project_id
            ))),
            _ => Ok(observed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::testing::fast_poll;
    use pinecone::{ControlPlane, CreateProjectRequest, MemoryBackend};
    use reconcile::{Error, MemoryHost, NoProgress, Orchestrator, Outcome, ReconcileContext};
    use std::sync::Arc;

    type Host = MemoryHost<ApiKeyDeclaration, ApiKeyObserved>;

    fn setup() -> (MemoryBackend, Orchestrator<ApiKeyKind>, String) {
        let backend = MemoryBackend::new();
        let project = backend
            .create_project(&CreateProjectRequest {
                name: "search".to_string(),
                max_pods: None,
                force_encryption_with_cmek: None,
            })
            .unwrap();
        let kind = ApiKeyKind::new(Arc::new(backend.clone()));
        (backend, Orchestrator::new(kind), project.id)
    }

    fn decl(project_id: &str, roles: &[&str]) -> ApiKeyDeclaration {
        ApiKeyDeclaration {
            name: "ci".to_string(),
            project_id: project_id.to_string(),
            roles: Some(roles.iter().map(ToString::to_string).collect()),
        }
    }

    #[test]
    fn test_secret_survives_reads_and_updates() {
        let (_backend, orchestrator, project) = setup();
        let mut host = Host::new(Some(decl(&project, &["ProjectEditor"])), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());

        orchestrator.create(&mut host, &mut ctx).unwrap();
        let secret = host.observed.as_ref().unwrap().value.clone().unwrap();
        assert!(secret.starts_with("pcsk_"));

        orchestrator.read(&mut host, &mut ctx).unwrap();
        host.desired = Some(decl(&project, &["ProjectViewer"]));
        assert_eq!(orchestrator.update(&mut host, &mut ctx).unwrap(), Outcome::Updated);

        let observed = host.observed.unwrap();
        assert_eq!(observed.roles, vec!["ProjectViewer"]);
        assert_eq!(observed.value, Some(secret));
    }

    #[test]
    fn test_composite_import() {
        let (backend, orchestrator, project) = setup();
        let mut created = Host::new(Some(decl(&project, &["ProjectEditor"])), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut created, &mut ctx).unwrap();
        let key_id = created.observed.unwrap().id;

        let mut host = Host::new(None, None);
        let raw = format!("{project}:{key_id}");
        assert_eq!(
            orchestrator.import(&raw, &mut host, &mut ctx).unwrap(),
            Outcome::Imported
        );
        let observed = host.observed.unwrap();
        assert_eq!(observed.project_id, project);
        assert_eq!(observed.value, None);

        let err = orchestrator
            .import(&key_id, &mut Host::new(None, None), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));

        let before = backend.calls("describe_api_key");
        let err = orchestrator
            .import(&format!("proj-other:{key_id}"), &mut Host::new(None, None), &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("belongs to project"));
        assert_eq!(backend.calls("describe_api_key"), before + 1);
    }

    #[test]
    fn test_key_gone_with_its_project() {
        let (backend, orchestrator, project) = setup();
        let mut host = Host::new(Some(decl(&project, &["ProjectEditor"])), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();

        backend.delete_project(&project).unwrap();
        assert_eq!(orchestrator.read(&mut host, &mut ctx).unwrap(), Outcome::Gone);
        assert!(host.removed);
    }
}
