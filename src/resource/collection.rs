//! Collection resource

use pinecone::CreateCollectionRequest;
use reconcile::{ConfigError, DriftPlan, PollVerdict, Reconcilable, RemoteError};

use super::{Client, remote};
use crate::model::collection::{collection_drift, observe_collection};
use crate::model::{CollectionDeclaration, CollectionDesired, CollectionObserved};

/// Static copies of pod-based indexes
pub struct CollectionKind {
    client: Client,
}

impl CollectionKind {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Reconcilable for CollectionKind {
    type Desired = CollectionDeclaration;
    type Observed = CollectionObserved;
    type Request = CreateCollectionRequest;
    type Patch = ();

    fn kind(&self) -> &'static str {
        "collection"
    }

    fn to_request(
        &self,
        desired: &CollectionDeclaration,
    ) -> Result<CreateCollectionRequest, ConfigError> {
        Ok(CollectionDesired::try_from(desired)?.to_request())
    }

    fn create(&self, request: &CreateCollectionRequest) -> Result<CollectionObserved, RemoteError> {
        self.client
            .create_collection(request)
            .map(|collection| observe_collection(collection, Some(request.source.clone())))
            .map_err(remote)
    }

    fn describe(&self, id: &str) -> Result<CollectionObserved, RemoteError> {
        self.client
            .describe_collection(id)
            .map(|collection| observe_collection(collection, None))
            .map_err(remote)
    }

    fn drift(
        &self,
        prior: &CollectionObserved,
        desired: &CollectionDeclaration,
    ) -> Result<DriftPlan, ConfigError> {
        Ok(collection_drift(prior, &CollectionDesired::try_from(desired)?))
    }

    fn to_patch(&self, _: &CollectionDeclaration, _: &DriftPlan) -> Result<(), ConfigError> {
        Ok(())
    }

    fn update(&self, id: &str, _: &()) -> Result<CollectionObserved, RemoteError> {
        Err(RemoteError::fatal(format!(
            "collection '{id}' cannot be updated in place"
        )))
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.client.delete_collection(id).map_err(remote)
    }

    fn id(&self, observed: &CollectionObserved) -> String {
        observed.id.clone()
    }

    fn readiness(&self, observed: &CollectionObserved) -> PollVerdict {
        if observed.status == "Ready" {
            PollVerdict::Done
        } else {
            PollVerdict::retry(format!("collection is {}", observed.status))
        }
    }

    /// Describe never returns the source index.
    fn carry_forward(
        &self,
        prior: Option<&CollectionObserved>,
        mut fresh: CollectionObserved,
    ) -> CollectionObserved {
        if fresh.source.is_none() {
            fresh.source = prior.and_then(|p| p.source.clone());
        }
        fresh
    }
}
