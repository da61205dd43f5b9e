use std::sync::Arc;

use async_trait::async_trait;

use crate::contract::SubAttester;
use crate::errors::Result;
use crate::loader::PluginLoader;

/// Registry façade the compositor talks to.
///
/// `init` runs once at start-up; afterwards the registry is read-only and
/// lookups need no locking. `close` must only run once in-flight requests
/// have drained.
#[async_trait]
pub trait PluginManager: Send + Sync {
    async fn init(&mut self) -> Result<()>;

    /// Names of the loaded sub-attesters
    fn plugin_list(&self) -> Vec<String>;

    fn lookup_by_name(&self, name: &str) -> Result<Arc<dyn SubAttester>>;

    async fn close(&self) -> Result<()>;
}

/// [`PluginManager`] over out-of-process plugins
pub struct SubAttesterManager {
    loader: PluginLoader,
}

impl SubAttesterManager {
    pub fn new(loader: PluginLoader) -> Self {
        Self { loader }
    }

    /// Build a manager and run discovery.
    pub async fn create(loader: PluginLoader) -> Result<Self> {
        let mut manager = Self::new(loader);
        manager.init().await?;
        Ok(manager)
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }
}

#[async_trait]
impl PluginManager for SubAttesterManager {
    async fn init(&mut self) -> Result<()> {
        self.loader.discover().await
    }

    fn plugin_list(&self) -> Vec<String> {
        self.loader.names()
    }

    fn lookup_by_name(&self, name: &str) -> Result<Arc<dyn SubAttester>> {
        self.loader.lookup(name)
    }

    async fn close(&self) -> Result<()> {
        self.loader.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_directory_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SubAttesterManager::create(PluginLoader::new(dir.path()))
            .await
            .unwrap();

        assert!(manager.plugin_list().is_empty());
        assert!(manager.lookup_by_name("tsm-report").is_err());
        manager.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_directory_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let loader = PluginLoader::new(dir.path().join("absent"));
        assert!(SubAttesterManager::create(loader).await.is_err());
    }
}
