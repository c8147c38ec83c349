//! Client entry point and the class descriptor cache.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use remora_core::config::{RemoraConfig, ServerAddress};
use remora_core::{ClassDescriptor, Command, ResultId, Value};
use remora_services::{CheckpointStore, Engine, PoolSettings, Registry};

use crate::backend::{Backend, HttpBackend, LocalBackend};
use crate::error::{ClientError, Result};
use crate::handle::RemoteHandle;
use crate::proxy::ProxyClass;

/// Descriptors by qualified class name.
///
/// Each class is stored once, so every handle typed with a class shares the
/// same `Arc`. Return-type hints are looked up here by name when a call is
/// made, which lets class graphs refer to themselves.
#[derive(Clone, Default)]
pub struct Catalogue {
    classes: Arc<DashMap<String, Arc<ClassDescriptor>>>,
    loaded: Arc<OnceCell<()>>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the server's contract on first use.
    pub async fn load(&self, backend: &dyn Backend) -> Result<()> {
        self.loaded
            .get_or_try_init(|| async {
                let contract = backend.contract().await?;
                tracing::debug!(classes = contract.classes.len(), "contract loaded");
                for class in contract.classes {
                    self.insert(class);
                }
                Ok::<(), ClientError>(())
            })
            .await?;
        Ok(())
    }

    /// Cache `class`, keeping an existing entry of the same name.
    pub fn insert(&self, class: ClassDescriptor) -> Arc<ClassDescriptor> {
        self.classes
            .entry(class.qualified_name())
            .or_insert_with(|| Arc::new(class))
            .clone()
    }

    pub fn get(&self, qualified_name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(qualified_name).map(|c| c.clone())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
    catalogue: Catalogue,
}

impl Client {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            catalogue: Catalogue::new(),
        }
    }

    /// Talk to a remote server.
    pub fn connect(addr: &ServerAddress) -> Self {
        Self::new(Arc::new(HttpBackend::new(addr)))
    }

    /// Execute in-process on `engine`.
    pub fn local(engine: Engine) -> Self {
        Self::new(Arc::new(LocalBackend::new(engine)))
    }

    /// Connect to $REMORA_SERVER, or start an in-process engine with the
    /// builtin classes when it is unset. Must be called inside a tokio runtime.
    pub fn discover() -> Result<Self> {
        match ServerAddress::from_env()? {
            Some(addr) => Self::discover_from(Some(addr), &RemoraConfig::default()),
            None => Self::discover_from(None, &RemoraConfig::load()?),
        }
    }

    /// `discover` with the address and config already resolved.
    pub fn discover_from(server: Option<ServerAddress>, config: &RemoraConfig) -> Result<Self> {
        if let Some(addr) = server {
            tracing::info!(server = %addr, "using remote server");
            return Ok(Self::connect(&addr));
        }
        let checkpoints = CheckpointStore::new(&config.checkpoints.path)
            .map_err(|e| ClientError::Local(e.to_string()))?;
        tracing::info!("no server configured, executing in-process");
        let engine = Engine::start(
            Registry::with_builtins(),
            checkpoints,
            PoolSettings::from(&config.executor),
        );
        Ok(Self::local(engine))
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    /// A typed proxy for `module.Class`, as published by the server.
    pub async fn class(&self, qualified_name: &str) -> Result<ProxyClass> {
        self.catalogue.load(self.backend.as_ref()).await?;
        let descriptor = self
            .catalogue
            .get(qualified_name)
            .ok_or_else(|| ClientError::UnknownClass(qualified_name.to_string()))?;
        Ok(ProxyClass::typed(self.clone(), descriptor))
    }

    /// A proxy that accepts any member name, without consulting the server.
    pub fn untyped_class(&self, module: &str, class: &str) -> ProxyClass {
        ProxyClass::untyped(self.clone(), module, class)
    }

    /// Upload a value and get a handle to it.
    pub async fn upload(&self, value: &Value) -> Result<RemoteHandle> {
        let id = self.backend.upload(value).await?;
        Ok(self.handle(id))
    }

    /// An untyped handle for an existing id.
    pub fn handle(&self, id: ResultId) -> RemoteHandle {
        RemoteHandle::new(self.clone(), id, None)
    }

    /// Submit a raw command.
    pub async fn submit(&self, command: &Command) -> Result<RemoteHandle> {
        let id = self.backend.submit(command).await?;
        Ok(self.handle(id))
    }

    /// Wait for `id` and turn stored failures into errors.
    pub(crate) async fn fetch_value(&self, id: &ResultId) -> Result<Value> {
        match self.backend.fetch(id).await? {
            Value::Failure(failure) => Err(ClientError::Remote(failure)),
            value => Ok(value),
        }
    }

    /// Typed descriptor for a return-type hint, if the class is known.
    pub(crate) fn hinted(&self, class: Option<&str>) -> Option<Arc<ClassDescriptor>> {
        class.and_then(|name| self.catalogue.get(name))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    pub(crate) fn local_client() -> (tempfile::TempDir, Client) {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::start(
            Registry::with_builtins(),
            CheckpointStore::new(dir.path()).unwrap(),
            PoolSettings {
                workers: 2,
                poll_interval: Duration::from_millis(10),
            },
        );
        (dir, Client::local(engine))
    }

    #[tokio::test]
    async fn same_class_shares_one_descriptor() {
        let (_dir, client) = local_client();
        let a = client.class("builtins.str").await.unwrap();
        let b = client.class("builtins.str").await.unwrap();
        assert!(Arc::ptr_eq(
            a.descriptor().unwrap(),
            b.descriptor().unwrap()
        ));
        assert!(client.catalogue().len() >= 6);
    }

    #[tokio::test]
    async fn unknown_class_is_an_error() {
        let (_dir, client) = local_client();
        assert!(matches!(
            client.class("builtins.set").await,
            Err(ClientError::UnknownClass(_))
        ));
    }

    #[tokio::test]
    async fn upload_then_operate() {
        let (_dir, client) = local_client();
        let uploaded = client.upload(&Value::from("x y")).await.unwrap();
        let parts = uploaded.method("split", vec![]).await.unwrap();
        assert_eq!(parts.get().await.unwrap(), Value::from(vec!["x", "y"]));
    }

    #[tokio::test]
    async fn no_server_executes_in_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RemoraConfig::default();
        config.checkpoints.path = dir.path().join("checkpoints");
        config.executor.workers = 1;
        config.executor.poll_interval_ms = 10;

        let client = Client::discover_from(None, &config).unwrap();
        let str_class = client.class("builtins.str").await.unwrap();
        let text = str_class.new_instance(vec![Value::from("abc")]).await.unwrap();
        let upper = text.method("upper", vec![]).await.unwrap();
        assert_eq!(upper.get().await.unwrap(), Value::from("ABC"));
        assert!(config.checkpoints.path.is_dir());
    }

    #[tokio::test]
    async fn configured_server_goes_over_http() {
        let addr = ServerAddress::parse("127.0.0.1:1").unwrap();
        let client = Client::discover_from(Some(addr), &RemoraConfig::default()).unwrap();
        assert!(matches!(
            client.upload(&Value::Int(1)).await,
            Err(ClientError::Transport(_))
        ));
    }
}
