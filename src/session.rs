//! Everything one command run works with: provider settings, the manifest,
//! the state store and the remote client, plus the managed instances built
//! from them.

use anyhow::{Context as _, Result, bail};
use pinecone::HttpBackend;
use reconcile::{PollConfig, Reconcilable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::Context;
use crate::config::ProviderConfig;
use crate::engine::Target;
use crate::manifest::{Entry, Manifest, TimeoutOverrides, full_address};
use crate::resource::{
    ApiKeyKind, Client, CollectionKind, IndexKind, Instance, Kind, Managed, ProjectKind,
};
use crate::state::{RecordHost, StateStore};

pub struct Session {
    pub config: ProviderConfig,
    pub manifest: Manifest,
    pub store: Arc<StateStore>,
    client: Client,
    poll: PollConfig,
}

impl Session {
    /// Load config, manifest and state, and connect the HTTP client.
    ///
    /// Commands that only act on tracked state pass `require_manifest =
    /// false`; a missing manifest then counts as an empty one.
    pub fn open(ctx: &Context, require_manifest: bool) -> Result<Self> {
        let config = ProviderConfig::load()?;
        let manifest = load_manifest(&ctx.manifest, require_manifest)?;
        let store = StateStore::load(&ctx.state)?;

        let backend = HttpBackend::new(ctx.api_key.clone())
            .with_admin_token(ctx.admin_token.clone())
            .with_api_base(config.control_url.clone(), config.admin_url.clone())
            .with_api_version(config.api_version.clone());
        log::debug!("Using control plane at {}", backend.api_base());

        Self::new(config, manifest, Arc::new(store), Arc::new(backend))
    }

    pub fn new(
        config: ProviderConfig,
        manifest: Manifest,
        store: Arc<StateStore>,
        client: Client,
    ) -> Result<Self> {
        let poll = config.poll.to_poll_config()?;
        Ok(Self {
            config,
            manifest,
            store,
            client,
            poll,
        })
    }

    pub fn poll(&self) -> PollConfig {
        self.poll.clone()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Every declared or tracked instance matching the target, in address order
    pub fn instances(&self, target: Option<&Target>) -> Result<Vec<Box<dyn Managed>>> {
        let mut instances: BTreeMap<String, Box<dyn Managed>> = BTreeMap::new();

        for entry in &self.manifest.index {
            let kind = IndexKind::new(self.client.clone());
            self.declare(&mut instances, Kind::Index, kind, entry)?;
        }
        for entry in &self.manifest.collection {
            let kind = CollectionKind::new(self.client.clone());
            self.declare(&mut instances, Kind::Collection, kind, entry)?;
        }
        for entry in &self.manifest.project {
            let kind = ProjectKind::new(self.client.clone());
            self.declare(&mut instances, Kind::Project, kind, entry)?;
        }
        for entry in &self.manifest.api_key {
            let kind = ApiKeyKind::new(self.client.clone());
            self.declare(&mut instances, Kind::ApiKey, kind, entry)?;
        }

        // Tracked but no longer declared
        for (address, record) in self.store.records() {
            if !instances.contains_key(&address) {
                let instance = self.orphan(&address, record.kind);
                instances.insert(address, instance);
            }
        }

        Ok(instances
            .into_values()
            .filter(|instance| target.is_none_or(|t| t.matches(instance.kind(), instance.address())))
            .collect())
    }

    /// A single instance by full address, declared or not
    pub fn instance(&self, kind: Kind, address: &str) -> Result<Box<dyn Managed>> {
        let full = full_address(kind, address);
        let target = Target::parse(&full)?;
        match self.instances(Some(&target))?.into_iter().next() {
            Some(instance) => Ok(instance),
            None => Ok(self.orphan(&full, kind)),
        }
    }

    fn declare<R>(
        &self,
        instances: &mut BTreeMap<String, Box<dyn Managed>>,
        kind: Kind,
        resource: R,
        entry: &Entry<R::Desired>,
    ) -> Result<()>
    where
        R: Reconcilable + 'static,
        R::Desired: Serialize + Send + 'static,
        R::Observed: Serialize + DeserializeOwned + Send + 'static,
    {
        let address = full_address(kind, &entry.address);
        let timeouts = entry
            .timeouts
            .resolve()
            .with_context(|| format!("In {address}"))?;
        let host = RecordHost::new(
            self.store.clone(),
            address.clone(),
            kind,
            Some(entry.declaration.clone()),
            timeouts,
        );
        instances.insert(address, Box::new(Instance::new(kind, resource, host)));
        Ok(())
    }

    fn orphan(&self, address: &str, kind: Kind) -> Box<dyn Managed> {
        let client = self.client.clone();
        let store = self.store.clone();
        let timeouts = TimeoutOverrides::default();
        match kind {
            Kind::Index => Box::new(Instance::new(
                kind,
                IndexKind::new(client),
                RecordHost::new(store, address, kind, None, timeouts),
            )),
            Kind::Collection => Box::new(Instance::new(
                kind,
                CollectionKind::new(client),
                RecordHost::new(store, address, kind, None, timeouts),
            )),
            Kind::Project => Box::new(Instance::new(
                kind,
                ProjectKind::new(client),
                RecordHost::new(store, address, kind, None, timeouts),
            )),
            Kind::ApiKey => Box::new(Instance::new(
                kind,
                ApiKeyKind::new(client),
                RecordHost::new(store, address, kind, None, timeouts),
            )),
        }
    }
}

fn load_manifest(path: &Path, required: bool) -> Result<Manifest> {
    if path.exists() {
        return Manifest::load(path);
    }
    if required {
        bail!(
            "No manifest at {}. Create one or pass --manifest",
            path.display()
        );
    }
    log::debug!("No manifest at {}, acting on tracked state only", path.display());
    Ok(Manifest::default())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::resource::testing::fast_poll;
    use pinecone::MemoryBackend;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A session over a temporary state file and an in-memory backend
    pub struct Fixture {
        pub backend: MemoryBackend,
        pub dir: TempDir,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                backend: MemoryBackend::new(),
                dir: TempDir::new().unwrap(),
            }
        }

        pub fn state_path(&self) -> PathBuf {
            self.dir.path().join("pinestate.state.json")
        }

        /// Fresh session reading the manifest text and the state on disk
        pub fn session(&self, manifest: &str) -> Session {
            let manifest = Manifest::parse(manifest).unwrap();
            let store = StateStore::load(&self.state_path()).unwrap();
            let mut session = Session::new(
                ProviderConfig::default(),
                manifest,
                Arc::new(store),
                Arc::new(self.backend.clone()),
            )
            .unwrap();
            session.poll = fast_poll();
            session
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Fixture;
    use super::*;

    const MANIFEST: &str = r#"
[[project]]
address = "search"
name = "search"

[[index]]
address = "docs"
name = "docs"
dimension = 8
spec.serverless = { cloud = "aws", region = "us-east-1" }
"#;

    #[test]
    fn test_instances_sorted_by_address() {
        let fixture = Fixture::new();
        let session = fixture.session(MANIFEST);
        let instances = session.instances(None).unwrap();
        let addresses: Vec<_> = instances.iter().map(|i| i.address().to_string()).collect();
        assert_eq!(addresses, vec!["index.docs", "project.search"]);
        assert!(instances.iter().all(|i| i.is_declared() && !i.is_tracked()));
    }

    #[test]
    fn test_tracked_records_become_orphans() {
        let fixture = Fixture::new();
        let session = fixture.session(MANIFEST);
        session
            .store
            .put(
                "collection.old",
                Kind::Collection,
                None,
                serde_json::json!({"id": "old", "name": "old", "status": "Ready", "environment": "us-east1-gcp"}),
            )
            .unwrap();

        let instances = session.instances(None).unwrap();
        let orphan = instances
            .iter()
            .find(|i| i.address() == "collection.old")
            .unwrap();
        assert!(!orphan.is_declared());
        assert!(orphan.is_tracked());
        assert_eq!(orphan.remote_id().as_deref(), Some("old"));
    }

    #[test]
    fn test_target_filters_instances() {
        let fixture = Fixture::new();
        let session = fixture.session(MANIFEST);
        let target = Target::parse("project").unwrap();
        let instances = session.instances(Some(&target)).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].kind(), Kind::Project);
    }

    #[test]
    fn test_instance_outside_manifest() {
        let fixture = Fixture::new();
        let session = fixture.session(MANIFEST);
        let instance = session.instance(Kind::Index, "adopted").unwrap();
        assert_eq!(instance.address(), "index.adopted");
        assert!(!instance.is_declared());
        assert!(!instance.is_tracked());
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pinestate.toml");
        assert!(load_manifest(&path, true).is_err());
        assert_eq!(load_manifest(&path, false).unwrap(), Manifest::default());
    }
}
