//! Project resource (admin API)

use pinecone::{CreateProjectRequest, UpdateProjectRequest};
use reconcile::{ConfigError, DriftPlan, PollVerdict, Reconcilable, RemoteError, Timeouts};
use std::time::Duration;

use super::{Client, remote};
use crate::model::project::{project_drift, project_patch};
use crate::model::{ProjectDeclaration, ProjectDesired, ProjectObserved};

pub struct ProjectKind {
    client: Client,
}

impl ProjectKind {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Reconcilable for ProjectKind {
    type Desired = ProjectDeclaration;
    type Observed = ProjectObserved;
    type Request = CreateProjectRequest;
    type Patch = UpdateProjectRequest;

    fn kind(&self) -> &'static str {
        "project"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::uniform(Duration::from_secs(5 * 60))
    }

    fn to_request(&self, desired: &ProjectDeclaration) -> Result<CreateProjectRequest, ConfigError> {
        Ok(ProjectDesired::try_from(desired)?.to_request())
    }

    fn create(&self, request: &CreateProjectRequest) -> Result<ProjectObserved, RemoteError> {
        self.client
            .create_project(request)
            .map(ProjectObserved::from)
            .map_err(remote)
    }

    fn describe(&self, id: &str) -> Result<ProjectObserved, RemoteError> {
        self.client
            .describe_project(id)
            .map(ProjectObserved::from)
            .map_err(remote)
    }

    fn drift(
        &self,
        prior: &ProjectObserved,
        desired: &ProjectDeclaration,
    ) -> Result<DriftPlan, ConfigError> {
        Ok(project_drift(prior, &ProjectDesired::try_from(desired)?))
    }

    fn to_patch(
        &self,
        desired: &ProjectDeclaration,
        plan: &DriftPlan,
    ) -> Result<UpdateProjectRequest, ConfigError> {
        Ok(project_patch(&ProjectDesired::try_from(desired)?, plan))
    }

    fn update(&self, id: &str, patch: &UpdateProjectRequest) -> Result<ProjectObserved, RemoteError> {
        self.client
            .update_project(id, patch)
            .map(ProjectObserved::from)
            .map_err(remote)
    }

    fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.client.delete_project(id).map_err(remote)
    }

    fn id(&self, observed: &ProjectObserved) -> String {
        observed.id.clone()
    }

    /// Projects are usable as soon as the create call returns
    fn readiness(&self, _: &ProjectObserved) -> PollVerdict {
        PollVerdict::Done
    }
}
