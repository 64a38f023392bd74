//! Project model (admin API)

use super::validate_admin_name;
use pinecone::{CreateProjectRequest, Project, UpdateProjectRequest};
use reconcile::{ChangeKind, ConfigError, DriftPlan};
use serde::{Deserialize, Serialize};

/// A `[[project]]` table from the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pods: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_encryption_with_cmek: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDesired {
    pub name: String,
    pub max_pods: Option<u32>,
    pub force_encryption_with_cmek: Option<bool>,
}

impl TryFrom<&ProjectDeclaration> for ProjectDesired {
    type Error = ConfigError;

    fn try_from(decl: &ProjectDeclaration) -> Result<Self, Self::Error> {
        validate_admin_name("name", &decl.name)?;
        Ok(Self {
            name: decl.name.clone(),
            max_pods: decl.max_pods,
            force_encryption_with_cmek: decl.force_encryption_with_cmek,
        })
    }
}

impl ProjectDesired {
    pub fn to_request(&self) -> CreateProjectRequest {
        CreateProjectRequest {
            name: self.name.clone(),
            max_pods: self.max_pods,
            force_encryption_with_cmek: self.force_encryption_with_cmek,
        }
    }
}

/// Last known remote state of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectObserved {
    pub id: String,
    pub name: String,
    pub max_pods: u32,
    pub force_encryption_with_cmek: bool,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<Project> for ProjectObserved {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            max_pods: project.max_pods,
            force_encryption_with_cmek: project.force_encryption_with_cmek,
            organization_id: project.organization_id,
            created_at: project.created_at,
        }
    }
}

pub fn project_drift(prior: &ProjectObserved, desired: &ProjectDesired) -> DriftPlan {
    let mut plan = DriftPlan::new();
    plan.compare(
        "name",
        ChangeKind::ForcesReplace,
        Some(prior.name.as_str()),
        Some(desired.name.as_str()),
    );
    if desired.max_pods.is_some() {
        plan.compare(
            "max_pods",
            ChangeKind::MutableUpdate,
            Some(&prior.max_pods),
            desired.max_pods.as_ref(),
        );
    }
    if desired.force_encryption_with_cmek.is_some() {
        plan.compare(
            "force_encryption_with_cmek",
            ChangeKind::MutableUpdate,
            Some(&prior.force_encryption_with_cmek),
            desired.force_encryption_with_cmek.as_ref(),
        );
    }
    plan
}

pub fn project_patch(desired: &ProjectDesired, plan: &DriftPlan) -> UpdateProjectRequest {
    UpdateProjectRequest {
        name: None,
        max_pods: desired.max_pods.filter(|_| plan.changed("max_pods")),
        force_encryption_with_cmek: desired
            .force_encryption_with_cmek
            .filter(|_| plan.changed("force_encryption_with_cmek")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed() -> ProjectObserved {
        ProjectObserved {
            id: "proj-0001".to_string(),
            name: "search".to_string(),
            max_pods: 5,
            force_encryption_with_cmek: false,
            organization_id: "org-0001".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn test_name_length() {
        let long = ProjectDeclaration {
            name: "p".repeat(101),
            ..Default::default()
        };
        assert!(ProjectDesired::try_from(&long).is_err());
    }

    #[test]
    fn test_quota_update_is_minimal() {
        let desired = ProjectDesired::try_from(&ProjectDeclaration {
            name: "search".to_string(),
            max_pods: Some(10),
            force_encryption_with_cmek: Some(false),
        })
        .unwrap();
        let plan = project_drift(&observed(), &desired);
        assert!(!plan.forces_replace());

        let patch = project_patch(&desired, &plan);
        assert_eq!(patch.max_pods, Some(10));
        assert_eq!(patch.force_encryption_with_cmek, None);
        assert_eq!(patch.name, None);
    }

    #[test]
    fn test_rename_forces_replace() {
        let desired = ProjectDesired::try_from(&ProjectDeclaration {
            name: "search-v2".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(project_drift(&observed(), &desired).replace_fields(), vec!["name"]);
    }
}
