//! Index resource

use pinecone::{ConfigureIndexRequest, DeletionProtection, IndexState};
use reconcile::{ConfigError, DriftPlan, PollVerdict, Reconcilable, RemoteError};

use super::{Client, remote};
use crate::model::index::{index_drift, index_patch, observe_index, to_index_request};
use crate::model::{IndexDeclaration, IndexDesired, IndexObserved, IndexRequest};

/// Vector indexes, pod-based or serverless
pub struct IndexKind {
    client: Client,
}

impl IndexKind {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Reconcilable for IndexKind {
    type Desired = IndexDeclaration;
    type Observed = IndexObserved;
    type Request = IndexRequest;
    type Patch = ConfigureIndexRequest;

    fn kind(&self) -> &'static str {
        "index"
    }

    fn to_request(&self, desired: &IndexDeclaration) -> Result<IndexRequest, ConfigError> {
        to_index_request(desired)
    }

    fn create(&self, request: &IndexRequest) -> Result<IndexObserved, RemoteError> {
        let index = match request {
            IndexRequest::Standard(request) => self.client.create_index(request),
            IndexRequest::ForModel(request) => self.client.create_index_for_model(request),
        }
        .map_err(remote)?;
        Ok(observe_index(index))
    }

    fn describe(&self, id: &str) -> Result<IndexObserved, RemoteError> {
        self.client
            .describe_index(id)
            .map(observe_index)
            .map_err(remote)
    }

    fn drift(
        &self,
        prior: &IndexObserved,
        desired: &IndexDeclaration,
    ) -> Result<DriftPlan, ConfigError> {
        Ok(index_drift(prior, &IndexDesired::try_from(desired)?))
    }

    fn to_patch(
        &self,
        desired: &IndexDeclaration,
        plan: &DriftPlan,
    ) -> Result<ConfigureIndexRequest, ConfigError> {
        Ok(index_patch(&IndexDesired::try_from(desired)?, plan))
    }

    fn update(
        &self,
        id: &str,
        patch: &ConfigureIndexRequest,
    ) -> Result<IndexObserved, RemoteError> {
        self.client
            .configure_index(id, patch)
            .map(observe_index)
            .map_err(remote)
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.client.delete_index(id).map_err(remote)
    }

    fn id(&self, observed: &IndexObserved) -> String {
        observed.id.clone()
    }

    fn readiness(&self, observed: &IndexObserved) -> PollVerdict {
        match (observed.status.ready, observed.status.state) {
            (true, IndexState::Ready) => PollVerdict::Done,
            (_, state) => PollVerdict::retry(format!("index is {state}")),
        }
    }

    /// The declaration wins when it parses; otherwise the last observed flag.
    /// Protected when either the declaration or the last observed state
    /// enables it. A declared flag that does not parse also blocks deletion,
    /// whatever the rest of the declaration looks like.
    fn deletion_protected(
        &self,
        desired: Option<&IndexDeclaration>,
        prior: &IndexObserved,
    ) -> bool {
        let declared = desired
            .and_then(|decl| decl.deletion_protection.as_deref())
            .map(str::parse::<DeletionProtection>);
        match declared {
            Some(Ok(DeletionProtection::Enabled) | Err(_)) => true,
            Some(Ok(DeletionProtection::Disabled)) | None => {
                prior.deletion_protection == DeletionProtection::Enabled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::index::{
        EmbedDeclaration, PodDeclaration, ServerlessDeclaration, SpecDeclaration,
    };
    use crate::resource::testing::fast_poll;
    use pinecone::{MemoryBackend, VectorType};
    use reconcile::{
        Error, MemoryHost, NoProgress, Operation, Orchestrator, Outcome, ReconcileContext,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    type Host = MemoryHost<IndexDeclaration, IndexObserved>;

    fn serverless(name: &str) -> IndexDeclaration {
        IndexDeclaration {
            name: name.to_string(),
            dimension: Some(8),
            tags: Some(BTreeMap::from([("env".to_string(), "dev".to_string())])),
            spec: SpecDeclaration {
                serverless: Some(ServerlessDeclaration {
                    cloud: "aws".to_string(),
                    region: "us-east-1".to_string(),
                }),
                pod: None,
            },
            ..Default::default()
        }
    }

    fn setup(settle_after: u32) -> (MemoryBackend, Orchestrator<IndexKind>) {
        let backend = MemoryBackend::new().with_settle_after(settle_after);
        let kind = IndexKind::new(Arc::new(backend.clone()));
        (backend, Orchestrator::new(kind))
    }

    #[test]
    fn test_create_waits_for_ready() {
        let (backend, orchestrator) = setup(2);
        let mut host = Host::new(Some(serverless("docs")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());

        let outcome = orchestrator.create(&mut host, &mut ctx).unwrap();
        assert_eq!(outcome, Outcome::Created);
        assert_eq!(backend.calls("create_index"), 1);
        assert_eq!(backend.calls("describe_index"), 3);

        let observed = host.observed.unwrap();
        assert!(observed.status.ready);
        assert_eq!(observed.host, "docs-abc1234.svc.pinecone.io");
        // initial object plus one per describe
        assert_eq!(host.history.len(), 4);
        assert!(!host.history[0].status.ready);
    }

    #[test]
    fn test_create_for_model_uses_model_endpoint() {
        let (backend, orchestrator) = setup(0);
        let decl = IndexDeclaration {
            dimension: None,
            embed: Some(EmbedDeclaration {
                model: "llama-text-embed-v2".to_string(),
                field_map: Some(BTreeMap::from([("text".to_string(), "body".to_string())])),
                ..Default::default()
            }),
            ..serverless("articles")
        };
        let mut host = Host::new(Some(decl), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());

        orchestrator.create(&mut host, &mut ctx).unwrap();
        assert_eq!(backend.calls("create_index_for_model"), 1);
        assert_eq!(backend.calls("create_index"), 0);

        let observed = host.observed.clone().unwrap();
        assert_eq!(observed.dimension, Some(1024));

        // The model fixed the dimension; leaving it undeclared is not drift
        let plan = orchestrator
            .resource()
            .drift(&observed, host.desired.as_ref().unwrap())
            .unwrap();
        assert!(plan.is_empty(), "{plan:?}");
    }

    #[test]
    fn test_invalid_declaration_makes_no_calls() {
        let (backend, orchestrator) = setup(0);
        let decl = IndexDeclaration {
            spec: SpecDeclaration {
                pod: Some(PodDeclaration {
                    environment: "us-east1-gcp".to_string(),
                    pod_type: "p1.x1".to_string(),
                    ..Default::default()
                }),
                ..serverless("docs").spec
            },
            ..serverless("docs")
        };
        let mut host = Host::new(Some(decl), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());

        let err = orchestrator.create(&mut host, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
        assert_eq!(backend.total_calls(), 0);
        assert!(host.history.is_empty());
    }

    #[test]
    fn test_create_timeout_keeps_partial_state() {
        let (_backend, orchestrator) = setup(1_000);
        let mut host = Host::new(Some(serverless("slow")), None)
            .with_timeout(Operation::Create, Duration::from_millis(20));
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());

        let err = orchestrator.create(&mut host, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "{err}");
        assert_eq!(err.remote_id(), Some("slow"));
        assert!(err.remote_changed());
        assert_eq!(host.observed.unwrap().name, "slow");
    }

    #[test]
    fn test_tag_drift_is_applied_in_place() {
        let (backend, orchestrator) = setup(0);
        let mut host = Host::new(Some(serverless("docs")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();

        let mut decl = serverless("docs");
        decl.tags = Some(BTreeMap::from([("team".to_string(), "search".to_string())]));
        host.desired = Some(decl);

        let outcome = orchestrator.update(&mut host, &mut ctx).unwrap();
        assert_eq!(outcome, Outcome::Updated);
        assert_eq!(backend.calls("configure_index"), 1);
        let tags = host.observed.unwrap().tags.unwrap();
        assert_eq!(tags, BTreeMap::from([("team".to_string(), "search".to_string())]));
    }

    #[test]
    fn test_out_of_band_change_is_detected() {
        let (backend, orchestrator) = setup(0);
        let mut host = Host::new(Some(serverless("docs")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();

        backend.modify_index("docs", |index| {
            index.deletion_protection = DeletionProtection::Enabled;
        });
        assert_eq!(orchestrator.read(&mut host, &mut ctx).unwrap(), Outcome::Refreshed);

        let plan = orchestrator
            .resource()
            .drift(host.observed.as_ref().unwrap(), host.desired.as_ref().unwrap())
            .unwrap();
        assert!(plan.changed("deletion_protection"));
        assert!(!plan.forces_replace());
    }

    #[test]
    fn test_dimension_change_requires_replace_without_calls() {
        let (backend, orchestrator) = setup(0);
        let mut host = Host::new(Some(serverless("docs")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();
        let before = backend.total_calls();

        host.desired = Some(IndexDeclaration {
            dimension: Some(16),
            vector_type: Some(VectorType::Dense.to_string()),
            ..serverless("docs")
        });
        let err = orchestrator.update(&mut host, &mut ctx).unwrap_err();
        assert!(err.is_replace_required());
        assert_eq!(backend.total_calls(), before);
    }

    #[test]
    fn test_protected_index_is_not_deleted() {
        let (backend, orchestrator) = setup(0);
        let decl = IndexDeclaration {
            deletion_protection: Some("enabled".to_string()),
            ..serverless("keep")
        };
        let mut host = Host::new(Some(decl), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();

        let err = orchestrator.delete(&mut host, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::PolicyViolation { .. }));
        assert_eq!(backend.calls("delete_index"), 0);

        // Removed from the manifest: the observed flag still guards it
        host.desired = None;
        assert!(orchestrator.delete(&mut host, &mut ctx).is_err());
        assert_eq!(backend.calls("delete_index"), 0);
    }

    #[test]
    fn test_invalid_declaration_keeps_protection() {
        let (backend, orchestrator) = setup(0);
        let mut host = Host::new(Some(serverless("keep")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();

        // Protection is enabled next to an unrelated typo
        host.desired = Some(IndexDeclaration {
            deletion_protection: Some("enabled".to_string()),
            metric: Some("cosin".to_string()),
            ..serverless("keep")
        });
        let err = orchestrator.delete(&mut host, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::PolicyViolation { .. }));

        // A flag that does not parse is not read as disabled
        host.desired = Some(IndexDeclaration {
            deletion_protection: Some("enabld".to_string()),
            ..serverless("keep")
        });
        let err = orchestrator.delete(&mut host, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::PolicyViolation { .. }));
        assert_eq!(backend.calls("delete_index"), 0);
        assert!(host.observed.is_some());
    }

    #[test]
    fn test_delete_waits_until_gone() {
        let (backend, orchestrator) = setup(2);
        let mut host = Host::new(Some(serverless("docs")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();
        let describes = backend.calls("describe_index");

        let outcome = orchestrator.delete(&mut host, &mut ctx).unwrap();
        assert_eq!(outcome, Outcome::Deleted);
        assert!(host.removed);
        // two lingering describes, then the 404
        assert_eq!(backend.calls("describe_index") - describes, 3);
    }

    #[test]
    fn test_read_of_vanished_index() {
        let (backend, orchestrator) = setup(0);
        let mut host = Host::new(Some(serverless("docs")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut host, &mut ctx).unwrap();

        backend.remove_index("docs");
        assert_eq!(orchestrator.read(&mut host, &mut ctx).unwrap(), Outcome::Gone);
        assert!(host.observed.is_none());
    }

    #[test]
    fn test_import_existing_index() {
        let (backend, orchestrator) = setup(0);
        let mut seeded = Host::new(Some(serverless("legacy")), None);
        let mut progress = NoProgress;
        let mut ctx = ReconcileContext::new(&mut progress).with_poll(fast_poll());
        orchestrator.create(&mut seeded, &mut ctx).unwrap();

        let mut host = Host::new(None, None);
        let outcome = orchestrator.import("legacy", &mut host, &mut ctx).unwrap();
        assert_eq!(outcome, Outcome::Imported);
        assert_eq!(host.observed.unwrap().id, "legacy");

        let err = orchestrator
            .import("proj:legacy", &mut Host::new(None, None), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration { .. }));
        assert!(backend.calls("describe_index") >= 1);
    }
}
