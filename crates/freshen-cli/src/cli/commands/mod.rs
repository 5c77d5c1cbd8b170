//! CLI command handlers, one file per command, sharing an [`Env`].

mod check;
mod list;
mod reset;
mod status;
mod sync;

pub use check::run_check;
pub use list::run_list;
pub use reset::run_reset;
pub use status::run_status;
pub use sync::run_sync;

use anyhow::{bail, Context, Result};
use freshen_core::config::FreshenConfig;
use freshen_core::host;
use freshen_core::loader::{Collaborators, LoaderRegistry, ReloadHook, UpdateLoader};
use freshen_core::state_db::StateDb;
use freshen_core::storage::LocalStorage;
use freshen_core::transport::CurlTransport;
use std::sync::Arc;

/// Everything a command needs to open loaders.
#[derive(Clone)]
pub struct Env {
    cfg: FreshenConfig,
    server: String,
    storage: Arc<LocalStorage>,
    transport: Arc<CurlTransport>,
    store: Arc<StateDb>,
    registry: LoaderRegistry,
}

impl Env {
    pub async fn new(cfg: FreshenConfig, server_flag: Option<&str>) -> Result<Self> {
        let preferred = server_flag.or(cfg.server.as_deref());
        let server = host::choose_server(preferred, &cfg.default_server);
        let root = cfg.cache_root()?;
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create cache dir {}", root.display()))?;
        let store = StateDb::open_default().await.context("open state db")?;
        tracing::debug!(server = %server, cache = %root.display(), "environment ready");
        Ok(Self {
            cfg,
            server,
            storage: Arc::new(LocalStorage::new(root)),
            transport: Arc::new(CurlTransport::default()),
            store: Arc::new(store),
            registry: LoaderRegistry::new(),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_default_server(&self) -> bool {
        self.server == self.cfg.default_server
    }

    /// Same environment pointed at the default server.
    pub fn with_default_server(&self) -> Env {
        Env {
            server: self.cfg.default_server.clone(),
            ..self.clone()
        }
    }

    /// Requested loader ids, or every configured loader when none are given.
    pub fn loader_ids(&self, filter: &[String]) -> Result<Vec<String>> {
        if filter.is_empty() {
            return Ok(self.cfg.loaders.keys().cloned().collect());
        }
        for id in filter {
            if !self.cfg.loaders.contains_key(id) {
                bail!("no loader `{id}` in config");
            }
        }
        Ok(filter.to_vec())
    }

    pub async fn open(&self, id: &str) -> Result<UpdateLoader> {
        let Some(cfg) = self.cfg.loader(id, &self.server) else {
            bail!("no loader `{id}` in config");
        };
        UpdateLoader::open(id, cfg, &self.registry, self.collaborators())
            .await
            .with_context(|| format!("open loader `{id}`"))
    }

    fn collaborators(&self) -> Collaborators {
        // A CLI run is the whole host lifetime; a reload only needs noting.
        let reload: Arc<dyn ReloadHook> = Arc::new(|| tracing::info!("host reload requested"));
        Collaborators {
            storage: self.storage.clone(),
            transport: self.transport.clone(),
            store: self.store.clone(),
            reload: Some(reload),
        }
    }
}
