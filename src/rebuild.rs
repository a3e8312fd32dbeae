//! The index store and the rebuild coordinator.
//!
//! Readers take an `Arc` snapshot of the current generation and keep using
//! it for as long as they like; a rebuild constructs a new generation off
//! to the side and publishes it with a single pointer swap.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, mpsc},
    thread,
};

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    bundle,
    config::VectorizerConfig,
    error::BuildError,
    generation::{self, Build, IndexGeneration},
};

/// Holder of the generation currently being served.
#[derive(Debug, Default)]
pub struct IndexStore {
    current: RwLock<Option<Arc<IndexGeneration>>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the served generation, if any.
    pub fn current(&self) -> Option<Arc<IndexGeneration>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the served generation. Returns the one it replaced.
    pub fn publish(
        &self,
        generation: Arc<IndexGeneration>,
    ) -> Option<Arc<IndexGeneration>> {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        current.replace(generation)
    }
}

/// Produces a new generation from a document root.
pub trait GenerationBuilder: Send + Sync + 'static {
    fn build(&self, root: &Path) -> Result<Build, BuildError>;
}

/// Builds generations by loading a directory from disk.
#[derive(Debug, Clone, Default)]
pub struct DirectoryBuilder {
    pub config: VectorizerConfig,
}

impl DirectoryBuilder {
    pub fn new(config: VectorizerConfig) -> Self {
        Self { config }
    }
}

impl GenerationBuilder for DirectoryBuilder {
    fn build(&self, root: &Path) -> Result<Build, BuildError> {
        generation::build(root, &self.config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RebuildState {
    Idle,
    /// A rebuild is running; `prior_error` survives until it succeeds.
    InProgress { prior_error: Option<String> },
    Failed { error: String },
}

impl RebuildState {
    fn last_error(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::InProgress { prior_error } => prior_error.as_deref(),
            Self::Failed { error } => Some(error),
        }
    }
}

/// How a finished rebuild ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Published {
        generation_id: u64,
        document_count: usize,
        warnings: usize,
    },
    Failed(String),
}

/// Handle to an accepted rebuild.
#[derive(Debug)]
pub struct RebuildHandle {
    done: mpsc::Receiver<RebuildOutcome>,
}

impl RebuildHandle {
    /// Block until the rebuild finishes.
    pub fn wait(self) -> RebuildOutcome {
        self.done.recv().unwrap_or_else(|_| {
            RebuildOutcome::Failed("rebuild worker exited".to_string())
        })
    }
}

#[derive(Debug)]
pub enum RebuildRequest {
    Accepted(RebuildHandle),
    AlreadyInProgress,
}

impl RebuildRequest {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Health snapshot of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub has_generation: bool,
    pub rebuilding: bool,
    pub last_error: Option<String>,
    pub generation_id: Option<u64>,
    pub document_count: Option<usize>,
    /// Files skipped by the last successful rebuild.
    pub last_warnings: usize,
}

#[derive(Debug)]
struct CoordinatorState {
    rebuild: RebuildState,
    last_warnings: usize,
}

struct Shared {
    store: Arc<IndexStore>,
    builder: Box<dyn GenerationBuilder>,
    persist_to: Option<PathBuf>,
    state: Mutex<CoordinatorState>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serialises rebuilds: at most one runs at a time, and queries keep
/// reading the previous generation until the new one is published.
#[derive(Clone)]
pub struct RebuildCoordinator {
    shared: Arc<Shared>,
}

impl RebuildCoordinator {
    pub fn new(
        store: Arc<IndexStore>,
        builder: impl GenerationBuilder,
        persist_to: Option<PathBuf>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                builder: Box::new(builder),
                persist_to,
                state: Mutex::new(CoordinatorState {
                    rebuild: RebuildState::Idle,
                    last_warnings: 0,
                }),
            }),
        }
    }

    pub fn state(&self) -> RebuildState {
        self.shared.state().rebuild.clone()
    }

    /// Snapshot of the served generation and rebuild state. Publishing
    /// happens under the state lock, so both halves come from the same
    /// moment.
    pub fn status(&self) -> EngineStatus {
        let state = self.shared.state();
        let current = self.shared.store.current();
        EngineStatus {
            has_generation: current.is_some(),
            rebuilding: matches!(state.rebuild, RebuildState::InProgress { .. }),
            last_error: state.rebuild.last_error().map(str::to_string),
            generation_id: current.as_ref().map(|g| g.id()),
            document_count: current.as_ref().map(|g| g.document_count()),
            last_warnings: state.last_warnings,
        }
    }

    /// Start a rebuild from `root` on a background thread, unless one is
    /// already running.
    pub fn request_rebuild(&self, root: &Path) -> RebuildRequest {
        {
            let mut state = self.shared.state();
            let prior_error = match &state.rebuild {
                RebuildState::InProgress { .. } => {
                    return RebuildRequest::AlreadyInProgress;
                }
                RebuildState::Idle => None,
                RebuildState::Failed { error } => Some(error.clone()),
            };
            state.rebuild = RebuildState::InProgress { prior_error };
        }

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let root = root.to_path_buf();
        let spawned = thread::Builder::new()
            .name("docsift-rebuild".to_string())
            .spawn(move || {
                let outcome = run_rebuild(&shared, &root);
                let _ = tx.send(outcome);
            });

        if let Err(e) = spawned {
            let error = format!("cannot start rebuild thread: {e}");
            warn!("{error}");
            self.shared.state().rebuild = RebuildState::Failed { error };
        }
        RebuildRequest::Accepted(RebuildHandle { done: rx })
    }
}

impl std::fmt::Debug for RebuildCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildCoordinator")
            .field("persist_to", &self.shared.persist_to)
            .finish_non_exhaustive()
    }
}

fn run_rebuild(shared: &Shared, root: &Path) -> RebuildOutcome {
    info!(root = %root.display(), "rebuild started");
    let result = catch_unwind(AssertUnwindSafe(|| prepare(shared, root)))
        .unwrap_or_else(|_| Err("rebuild panicked".to_string()));

    let mut state = shared.state();
    match result {
        Ok(build) => {
            let generation = Arc::new(build.generation);
            let outcome = RebuildOutcome::Published {
                generation_id: generation.id(),
                document_count: generation.document_count(),
                warnings: build.warnings.len(),
            };
            shared.store.publish(generation);
            state.rebuild = RebuildState::Idle;
            state.last_warnings = build.warnings.len();
            info!(?outcome, "rebuild published");
            outcome
        }
        Err(error) => {
            warn!(root = %root.display(), %error, "rebuild failed");
            state.rebuild = RebuildState::Failed {
                error: error.clone(),
            };
            RebuildOutcome::Failed(error)
        }
    }
}

/// Build and, when configured, persist a generation without touching the
/// served one.
fn prepare(shared: &Shared, root: &Path) -> Result<Build, String> {
    let build = shared.builder.build(root).map_err(|e| e.to_string())?;
    if let Some(path) = &shared.persist_to {
        bundle::save(&build.generation, path).map_err(|e| e.to_string())?;
    }
    Ok(build)
}
