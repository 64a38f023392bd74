//! HTTP backend for the Pinecone control plane and admin APIs.
//!
//! Index and collection calls authenticate with an API key (`Api-Key`
//! header). Project and API key calls go through the admin API and need a
//! bearer token.

use crate::backend::ControlPlane;
use crate::error::{Error, Result};
use crate::types::{
    AdminList, ApiKey, ApiKeyWithSecret, Collection, CollectionList, ConfigureIndexRequest,
    CreateApiKeyRequest, CreateCollectionRequest, CreateIndexForModelRequest, CreateIndexRequest,
    CreateProjectRequest, Index, IndexList, Project, UpdateApiKeyRequest, UpdateProjectRequest,
};

/// Default API host for both planes.
pub const DEFAULT_API_BASE: &str = "https://api.pinecone.io";

/// API version sent with every request.
pub const DEFAULT_API_VERSION: &str = "2025-04";

const USER_AGENT: &str = concat!("pinestate/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy)]
enum Plane {
    Control,
    Admin,
}

/// Pinecone HTTP backend.
///
/// # Example
///
/// ```no_run
/// use pinecone::backend::{ControlPlane, HttpBackend};
///
/// let backend = HttpBackend::new(Some("pcsk_...".to_string()));
/// let index = backend.describe_index("docs").unwrap();
/// println!("{} is {}", index.name, index.status.state);
/// ```
pub struct HttpBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    control_base: String,
    admin_base: String,
    api_version: String,
    api_key: Option<String>,
    admin_token: Option<String>,
}

impl HttpBackend {
    /// Create a backend against the public API.
    #[must_use]
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            control_base: DEFAULT_API_BASE.to_string(),
            admin_base: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_key,
            admin_token: None,
        }
    }

    /// Set the bearer token used for the admin API.
    #[must_use]
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    /// Override the API hosts (for proxies and testing).
    #[must_use]
    pub fn with_api_base(mut self, control: impl Into<String>, admin: impl Into<String>) -> Self {
        self.control_base = trim_base(control.into());
        self.admin_base = trim_base(admin.into());
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Get the control plane base URL.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.control_base
    }

    fn url(&self, plane: Plane, path: &str) -> String {
        let base = match plane {
            Plane::Control => &self.control_base,
            Plane::Admin => &self.admin_base,
        };
        format!("{base}{path}")
    }

    /// Attach credentials and common headers to a request.
    fn prepare<B>(
        &self,
        plane: Plane,
        request: ureq::RequestBuilder<B>,
    ) -> Result<ureq::RequestBuilder<B>> {
        let request = request
            .header("X-Pinecone-API-Version", &self.api_version)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json");

        match plane {
            Plane::Control => {
                let key = self
                    .api_key
                    .as_deref()
                    .ok_or(Error::MissingCredentials("PINECONE_API_KEY"))?;
                Ok(request.header("Api-Key", key))
            }
            Plane::Admin => {
                let token = self
                    .admin_token
                    .as_deref()
                    .ok_or(Error::MissingCredentials("PINECONE_ADMIN_TOKEN"))?;
                Ok(request.header("Authorization", &format!("Bearer {token}")))
            }
        }
    }

    fn get<T: serde::de::DeserializeOwned>(&self, plane: Plane, path: &str) -> Result<T> {
        let url = self.url(plane, path);
        log::debug!("GET {url}");
        let value = self
            .prepare(plane, self.agent.get(&url))?
            .call()?
            .body_mut()
            .read_json()?;
        Ok(value)
    }

    fn post<B, T>(&self, plane: Plane, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(plane, path);
        log::debug!("POST {url}");
        let value = self
            .prepare(plane, self.agent.post(&url))?
            .send_json(body)?
            .body_mut()
            .read_json()?;
        Ok(value)
    }

    fn patch<B, T>(&self, plane: Plane, path: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(plane, path);
        log::debug!("PATCH {url}");
        let value = self
            .prepare(plane, self.agent.patch(&url))?
            .send_json(body)?
            .body_mut()
            .read_json()?;
        Ok(value)
    }

    fn delete(&self, plane: Plane, path: &str) -> Result<()> {
        let url = self.url(plane, path);
        log::debug!("DELETE {url}");
        self.prepare(plane, self.agent.delete(&url))?.call()?;
        Ok(())
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

impl ControlPlane for HttpBackend {
    fn create_index(&self, request: &CreateIndexRequest) -> Result<Index> {
        self.post(Plane::Control, "/indexes", request)
    }

    fn create_index_for_model(&self, request: &CreateIndexForModelRequest) -> Result<Index> {
        self.post(Plane::Control, "/indexes/create-for-model", request)
    }

    fn describe_index(&self, name: &str) -> Result<Index> {
        self.get(Plane::Control, &format!("/indexes/{name}"))
    }

    fn configure_index(&self, name: &str, request: &ConfigureIndexRequest) -> Result<Index> {
        self.patch(Plane::Control, &format!("/indexes/{name}"), request)
    }

    fn delete_index(&self, name: &str) -> Result<()> {
        self.delete(Plane::Control, &format!("/indexes/{name}"))
    }

    fn create_collection(&self, request: &CreateCollectionRequest) -> Result<Collection> {
        self.post(Plane::Control, "/collections", request)
    }

    fn describe_collection(&self, name: &str) -> Result<Collection> {
        self.get(Plane::Control, &format!("/collections/{name}"))
    }

    fn delete_collection(&self, name: &str) -> Result<()> {
        self.delete(Plane::Control, &format!("/collections/{name}"))
    }

    fn create_project(&self, request: &CreateProjectRequest) -> Result<Project> {
        self.post(Plane::Admin, "/admin/projects", request)
    }

    fn describe_project(&self, id: &str) -> Result<Project> {
        self.get(Plane::Admin, &format!("/admin/projects/{id}"))
    }

    fn update_project(&self, id: &str, request: &UpdateProjectRequest) -> Result<Project> {
        self.patch(Plane::Admin, &format!("/admin/projects/{id}"), request)
    }

    fn delete_project(&self, id: &str) -> Result<()> {
        self.delete(Plane::Admin, &format!("/admin/projects/{id}"))
    }

    fn create_api_key(
        &self,
        project_id: &str,
        request: &CreateApiKeyRequest,
    ) -> Result<ApiKeyWithSecret> {
        self.post(
            Plane::Admin,
            &format!("/admin/projects/{project_id}/api-keys"),
            request,
        )
    }

    fn describe_api_key(&self, id: &str) -> Result<ApiKey> {
        self.get(Plane::Admin, &format!("/admin/api-keys/{id}"))
    }

    fn update_api_key(&self, id: &str, request: &UpdateApiKeyRequest) -> Result<ApiKey> {
        self.patch(Plane::Admin, &format!("/admin/api-keys/{id}"), request)
    }

    fn delete_api_key(&self, id: &str) -> Result<()> {
        self.delete(Plane::Admin, &format!("/admin/api-keys/{id}"))
    }

    fn list_indexes(&self) -> Result<Vec<Index>> {
        let list: IndexList = self.get(Plane::Control, "/indexes")?;
        Ok(list.indexes)
    }

    fn list_collections(&self) -> Result<Vec<Collection>> {
        let list: CollectionList = self.get(Plane::Control, "/collections")?;
        Ok(list.collections)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let list: AdminList<Project> = self.get(Plane::Admin, "/admin/projects")?;
        Ok(list.data)
    }

    fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKey>> {
        let list: AdminList<ApiKey> =
            self.get(Plane::Admin, &format!("/admin/projects/{project_id}/api-keys"))?;
        Ok(list.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_api_base() {
        let backend = HttpBackend::new(None);
        assert_eq!(backend.api_base(), DEFAULT_API_BASE);
    }

    #[test]
    fn test_custom_api_base_trims_slash() {
        let backend =
            HttpBackend::new(None).with_api_base("http://localhost:5080/", "http://localhost:5081");
        assert_eq!(
            backend.url(Plane::Control, "/indexes/docs"),
            "http://localhost:5080/indexes/docs"
        );
        assert_eq!(
            backend.url(Plane::Admin, "/admin/projects"),
            "http://localhost:5081/admin/projects"
        );
    }

    #[test]
    fn test_missing_api_key_fails_before_request() {
        let backend = HttpBackend::new(None).with_api_base("http://127.0.0.1:9", "http://127.0.0.1:9");
        let err = backend.describe_index("docs").unwrap_err();
        assert_eq!(err, Error::MissingCredentials("PINECONE_API_KEY"));
    }

    #[test]
    fn test_missing_admin_token_fails_before_request() {
        let backend = HttpBackend::new(Some("key".to_string()))
            .with_api_base("http://127.0.0.1:9", "http://127.0.0.1:9");
        let err = backend.describe_project("p-1").unwrap_err();
        assert_eq!(err, Error::MissingCredentials("PINECONE_ADMIN_TOKEN"));
    }
}
