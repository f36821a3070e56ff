//! Engine: scoped runtime state for one process
//!
//! Owns the configuration, the open index DB, the optional embedding
//! and expansion backends, and the lazily launched headless browser
//! session. Built once at start-up and torn down on shutdown; there
//! are no hidden singletons.

use crate::config::{self, Config};
use crate::crawl::HeadlessSession;
use crate::db::{IndexDb, LibraryDb, Source};
use crate::embed::{Embedder, HttpEmbedder, HttpQueryExpander, QueryExpander};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

pub struct Engine {
    config: Config,
    index_db: IndexDb,
    embedder: Option<Arc<dyn Embedder>>,
    expander: Option<Arc<dyn QueryExpander>>,
    headless: OnceCell<Option<Arc<HeadlessSession>>>,
}

impl Engine {
    /// Build the engine: open the index DB and wire up whatever
    /// models the configuration names. Missing models degrade search
    /// rather than failing start-up.
    pub fn new(config: Config) -> Result<Self> {
        let index_db = IndexDb::open(config::index_db_path())?;

        let embedder: Option<Arc<dyn Embedder>> = match &config.models.embed {
            Some(model) => match HttpEmbedder::new(model) {
                Ok(embedder) => Some(Arc::new(embedder)),
                Err(e) => {
                    warn!(error = %e, "embedding backend unavailable");
                    None
                }
            },
            None => None,
        };
        let expander: Option<Arc<dyn QueryExpander>> = match &config.models.query {
            Some(model) => match HttpQueryExpander::new(model) {
                Ok(expander) => Some(Arc::new(expander)),
                Err(e) => {
                    warn!(error = %e, "query expansion backend unavailable");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            config,
            index_db,
            embedder,
            expander,
            headless: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index_db(&self) -> &IndexDb {
        &self.index_db
    }

    /// Open (creating and migrating as needed) a source's library DB
    pub fn open_library(&self, source: &Source) -> Result<LibraryDb> {
        LibraryDb::open(config::library_db_dir().join(&source.db_file))
    }

    pub fn embedder(&self) -> Option<Arc<dyn Embedder>> {
        self.embedder.clone()
    }

    pub fn expander(&self) -> Option<Arc<dyn QueryExpander>> {
        self.expander.clone()
    }

    /// The shared headless browser session, launched on first use.
    /// `None` when disabled, not installed, or failing to launch.
    pub async fn headless(&self) -> Option<Arc<HeadlessSession>> {
        self.headless
            .get_or_init(|| async {
                HeadlessSession::launch(&self.config.headless)
                    .await
                    .map(Arc::new)
            })
            .await
            .clone()
    }

    /// Tear down owned runtime state
    pub async fn shutdown(&self) {
        if let Some(Some(session)) = self.headless.get() {
            session.close().await;
        }
    }
}
