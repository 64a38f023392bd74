//! API key model (admin API)

use super::{list, validate_admin_name};
use pinecone::{ApiKey, CreateApiKeyRequest, UpdateApiKeyRequest};
use reconcile::{ChangeKind, ConfigError, DriftPlan};
use serde::{Deserialize, Serialize};

/// Roles the admin API can grant to a key
pub const ROLES: &[&str] = &[
    "ProjectEditor",
    "ProjectViewer",
    "ControlPlaneEditor",
    "ControlPlaneViewer",
    "DataPlaneEditor",
    "DataPlaneViewer",
];

/// An `[[api_key]]` table from the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyDeclaration {
    pub name: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyDesired {
    pub name: String,
    pub project_id: String,
    pub roles: Option<Vec<String>>,
}

impl TryFrom<&ApiKeyDeclaration> for ApiKeyDesired {
    type Error = ConfigError;

    fn try_from(decl: &ApiKeyDeclaration) -> Result<Self, Self::Error> {
        validate_admin_name("name", &decl.name)?;
        if decl.project_id.is_empty() {
            return Err(ConfigError::field("project_id", "must not be empty"));
        }
        if let Some(roles) = &decl.roles {
            if roles.is_empty() {
                return Err(ConfigError::field("roles", "must grant at least one role"));
            }
            if let Some(unknown) = roles.iter().find(|r| !ROLES.contains(&r.as_str())) {
                return Err(ConfigError::field(
                    "roles",
                    format!("'{unknown}' is not one of: {}", ROLES.join(", ")),
                ));
            }
        }
        Ok(Self {
            name: decl.name.clone(),
            project_id: decl.project_id.clone(),
            roles: decl.roles.clone(),
        })
    }
}

/// Key creation is scoped under a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRequest {
    pub project_id: String,
    pub body: CreateApiKeyRequest,
}

impl ApiKeyDesired {
    pub fn to_request(&self) -> ApiKeyRequest {
        ApiKeyRequest {
            project_id: self.project_id.clone(),
            body: CreateApiKeyRequest {
                name: self.name.clone(),
                roles: self.roles.clone(),
            },
        }
    }
}

/// Last known remote state of an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyObserved {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub roles: Vec<String>,
    /// Secret, returned once at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

pub fn observe_api_key(key: ApiKey, value: Option<String>) -> ApiKeyObserved {
    ApiKeyObserved {
        id: key.id,
        name: key.name,
        project_id: key.project_id,
        roles: key.roles,
        value,
    }
}

pub fn api_key_drift(prior: &ApiKeyObserved, desired: &ApiKeyDesired) -> DriftPlan {
    let mut plan = DriftPlan::new();
    plan.compare(
        "name",
        ChangeKind::ForcesReplace,
        Some(prior.name.as_str()),
        Some(desired.name.as_str()),
    );
    plan.compare(
        "project_id",
        ChangeKind::ForcesReplace,
        Some(prior.project_id.as_str()),
        Some(desired.project_id.as_str()),
    );
    if let Some(roles) = &desired.roles {
        let mut have = prior.roles.clone();
        let mut want = roles.clone();
        have.sort();
        want.sort();
        if have != want {
            plan.record(
                "roles",
                ChangeKind::MutableUpdate,
                list(Some(&prior.roles)),
                list(Some(roles)),
            );
        }
    }
    plan
}

pub fn api_key_patch(desired: &ApiKeyDesired, plan: &DriftPlan) -> UpdateApiKeyRequest {
    UpdateApiKeyRequest {
        name: None,
        roles: desired.roles.clone().filter(|_| plan.changed("roles")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(roles: Option<&[&str]>) -> ApiKeyDeclaration {
        ApiKeyDeclaration {
            name: "ci".to_string(),
            project_id: "proj-0001".to_string(),
            roles: roles.map(|roles| roles.iter().map(ToString::to_string).collect()),
        }
    }

    fn observed(roles: &[&str]) -> ApiKeyObserved {
        ApiKeyObserved {
            id: "key-0002".to_string(),
            name: "ci".to_string(),
            project_id: "proj-0001".to_string(),
            roles: roles.iter().map(ToString::to_string).collect(),
            value: Some("pcsk_secret".to_string()),
        }
    }

    #[test]
    fn test_unknown_role_rejected() {
        let err = ApiKeyDesired::try_from(&decl(Some(&["Admin"]))).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("roles"));
        assert!(err.message.contains("ProjectEditor"));
    }

    #[test]
    fn test_role_order_is_not_drift() {
        let desired =
            ApiKeyDesired::try_from(&decl(Some(&["DataPlaneViewer", "ProjectViewer"]))).unwrap();
        let plan = api_key_drift(&observed(&["ProjectViewer", "DataPlaneViewer"]), &desired);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_role_change_is_mutable() {
        let desired = ApiKeyDesired::try_from(&decl(Some(&["ProjectViewer"]))).unwrap();
        let plan = api_key_drift(&observed(&["ProjectEditor"]), &desired);
        assert!(!plan.forces_replace());
        let patch = api_key_patch(&desired, &plan);
        assert_eq!(patch.roles, Some(vec!["ProjectViewer".to_string()]));
    }

    #[test]
    fn test_moving_project_forces_replace() {
        let mut moved = decl(None);
        moved.project_id = "proj-0009".to_string();
        let desired = ApiKeyDesired::try_from(&moved).unwrap();
        let plan = api_key_drift(&observed(&["ProjectEditor"]), &desired);
        assert_eq!(plan.replace_fields(), vec!["project_id"]);
    }
}
