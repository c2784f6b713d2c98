//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::assistant::{BackendRegistry, EchoBackend};
use crate::config::AppConfig;
use crate::store::{AllowList, EntityStore, SqliteEntityStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backends: Arc<BackendRegistry>,
    /// Absent when no database is configured; entity updates then return 503.
    pub store: Option<Arc<dyn EntityStore>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        backends: BackendRegistry,
        store: Option<Arc<dyn EntityStore>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            backends: Arc::new(backends),
            store,
        }
    }

    /// Build the state a configured server runs with: the echo backend and,
    /// when `store.database_path` is set, the SQLite entity store.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let backends = BackendRegistry::new(config.assistant.default_model.clone()).with(
            EchoBackend::new(Duration::from_millis(config.assistant.echo_delay_ms)),
        );
        if backends.resolve(None).is_none() {
            return Err(anyhow!(
                "default model `{}` has no backend (available: {})",
                backends.default_model(),
                backends.models().collect::<Vec<_>>().join(", ")
            ));
        }

        let store: Option<Arc<dyn EntityStore>> = match &config.store.database_path {
            Some(path) => {
                let allow = AllowList::new(config.store.tables.clone());
                Some(Arc::new(SqliteEntityStore::open(path, allow).await?))
            }
            None => None,
        };

        Ok(Self::new(config, backends, store))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backends", &self.backends)
            .field("store", &self.store.is_some())
            .field("dev_mode", &self.config.dev_mode)
            .finish()
    }
}
