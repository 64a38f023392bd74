//! Backend trait and implementations for the Pinecone APIs.
//!
//! [`ControlPlane`] is the seam every resource kind talks through.
//! [`http::HttpBackend`] calls the real service; [`memory::MemoryBackend`]
//! keeps everything in process and simulates eventual consistency for tests.
//!
//! ```
//! use pinecone::backend::{ControlPlane, MemoryBackend};
//! use pinecone::{CreateCollectionRequest, Error};
//!
//! let backend = MemoryBackend::new();
//! let err = backend
//!     .create_collection(&CreateCollectionRequest {
//!         name: "snap".to_string(),
//!         source: "missing".to_string(),
//!     })
//!     .unwrap_err();
//! assert!(matches!(err, Error::HttpError { status: Some(400), .. }));
//! ```

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use crate::error::Result;
use crate::types::{
    ApiKey, ApiKeyWithSecret, Collection, ConfigureIndexRequest, CreateApiKeyRequest,
    CreateCollectionRequest, CreateIndexForModelRequest, CreateIndexRequest,
    CreateProjectRequest, Index, Project, UpdateApiKeyRequest, UpdateProjectRequest,
};

/// Remote API client contract.
///
/// Every call is blocking and attempted once; retrying is the caller's
/// decision. Errors carry enough status information to be classified with
/// [`Error::category`](crate::Error::category).
pub trait ControlPlane: Send + Sync {
    fn create_index(&self, request: &CreateIndexRequest) -> Result<Index>;

    fn create_index_for_model(&self, request: &CreateIndexForModelRequest) -> Result<Index>;

    fn describe_index(&self, name: &str) -> Result<Index>;

    fn configure_index(&self, name: &str, request: &ConfigureIndexRequest) -> Result<Index>;

    fn delete_index(&self, name: &str) -> Result<()>;

    fn create_collection(&self, request: &CreateCollectionRequest) -> Result<Collection>;

    fn describe_collection(&self, name: &str) -> Result<Collection>;

    fn delete_collection(&self, name: &str) -> Result<()>;

    fn create_project(&self, request: &CreateProjectRequest) -> Result<Project>;

    fn describe_project(&self, id: &str) -> Result<Project>;

    fn update_project(&self, id: &str, request: &UpdateProjectRequest) -> Result<Project>;

    fn delete_project(&self, id: &str) -> Result<()>;

    /// Create a key under a project. The secret is only returned here.
    fn create_api_key(
        &self,
        project_id: &str,
        request: &CreateApiKeyRequest,
    ) -> Result<ApiKeyWithSecret>;

    fn describe_api_key(&self, id: &str) -> Result<ApiKey>;

    fn update_api_key(&self, id: &str, request: &UpdateApiKeyRequest) -> Result<ApiKey>;

    fn delete_api_key(&self, id: &str) -> Result<()>;

    fn list_indexes(&self) -> Result<Vec<Index>>;

    fn list_collections(&self) -> Result<Vec<Collection>>;

    fn list_projects(&self) -> Result<Vec<Project>>;

    /// Keys of one project. Secrets are never included.
    fn list_api_keys(&self, project_id: &str) -> Result<Vec<ApiKey>>;
}
