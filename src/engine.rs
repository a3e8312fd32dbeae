//! Entry point for serving layers: validated queries against the current
//! generation, status, and rebuild control.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{info, warn};

use crate::{
    bundle,
    config::EngineConfig,
    error::{Error, PersistError, Result},
    exact::QueryResult,
    generation::IndexGeneration,
    rebuild::{
        DirectoryBuilder,
        EngineStatus,
        GenerationBuilder,
        IndexStore,
        RebuildCoordinator,
        RebuildRequest,
    },
    similarity::SimilarityHit,
};

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    store: Arc<IndexStore>,
    coordinator: RebuildCoordinator,
}

impl Engine {
    /// An engine with no generation that rebuilds from directories.
    pub fn new(config: EngineConfig) -> Self {
        let builder = DirectoryBuilder::new(config.vectorizer.clone());
        Self::with_builder(config, builder, None)
    }

    /// Like [`Engine::new`], but every successful rebuild is saved to
    /// `bundle_path` before it is published.
    pub fn with_persistence(config: EngineConfig, bundle_path: PathBuf) -> Self {
        let builder = DirectoryBuilder::new(config.vectorizer.clone());
        Self::with_builder(config, builder, Some(bundle_path))
    }

    pub fn with_builder(
        config: EngineConfig,
        builder: impl GenerationBuilder,
        persist_to: Option<PathBuf>,
    ) -> Self {
        let store = Arc::new(IndexStore::new());
        let coordinator =
            RebuildCoordinator::new(Arc::clone(&store), builder, persist_to);
        Self {
            config,
            store,
            coordinator,
        }
    }

    /// Open an engine backed by `bundle_path`, serving the saved generation
    /// if there is one. A missing bundle is a cold start; an unreadable one
    /// is logged and also starts cold.
    pub fn open(config: EngineConfig, bundle_path: &Path) -> Self {
        let engine = Self::with_persistence(config, bundle_path.to_path_buf());
        match engine.load_from(bundle_path) {
            Ok(()) => {}
            Err(Error::Persist(PersistError::Io(e)))
                if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %bundle_path.display(), error = %e, "ignoring saved index");
            }
        }
        engine
    }

    /// Load a saved bundle and serve it.
    pub fn load_from(&self, path: &Path) -> Result<()> {
        let generation = bundle::load(path)?;
        info!(
            generation = generation.id(),
            documents = generation.document_count(),
            "serving saved index"
        );
        self.store.publish(Arc::new(generation));
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Snapshot of the served generation.
    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.store.current()
    }

    /// Similarity query. `k` defaults to the configured `top_k`.
    pub fn query(
        &self,
        text: &str,
        k: Option<usize>,
    ) -> Result<Vec<SimilarityHit>> {
        let text = self.config.limits.validate(text)?;
        let generation = self.current().ok_or(Error::NoIndex)?;
        let k = k.unwrap_or(self.config.limits.default_k);
        Ok(generation.query(text, k)?)
    }

    /// Tolerant exact search across every document.
    pub fn search(&self, text: &str) -> Result<Vec<QueryResult>> {
        let text = self.config.limits.validate(text)?;
        let generation = self.current().ok_or(Error::NoIndex)?;
        Ok(generation.search(text, self.config.context_lines)?)
    }

    pub fn status(&self) -> EngineStatus {
        self.coordinator.status()
    }

    pub fn request_rebuild(&self, root: &Path) -> RebuildRequest {
        self.coordinator.request_rebuild(root)
    }
}
