use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("no index loaded")]
    NoIndex,

    #[error("rebuild failed: {0}")]
    Rebuild(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// A single file that could not be turned into a document.
///
/// Never fatal: the loader collects these and reports them as warnings
/// next to a successful build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("unsupported file type: {path}")]
    Unsupported { path: PathBuf },

    #[error("cannot extract PDF text from {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("cannot extract word-processor text from {path}: {message}")]
    Word { path: PathBuf, message: String },

    #[error("no text content in {path}")]
    EmptyText { path: PathBuf },
}

impl LoadError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. }
            | Self::Unsupported { path }
            | Self::Pdf { path, .. }
            | Self::Word { path, .. }
            | Self::EmptyText { path } => path,
        }
    }
}

/// Failure of one build attempt. The served generation is unaffected.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("cannot read document root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no readable documents under {root} ({skipped} file(s) skipped)")]
    NoDocuments { root: PathBuf, skipped: usize },

    #[error("feature space is empty: documents contain no indexable terms")]
    EmptyVocabulary,

    #[error("cannot assemble index: {0}")]
    Inconsistent(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bundle database error: {0}")]
    Database(#[from] redb::Error),

    #[error("incompatible bundle format: found version {found}, expected {expected}")]
    Incompatible { found: u32, expected: u32 },

    #[error("corrupt bundle: {0}")]
    Corrupt(String),

    #[error("cannot encode bundle: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cannot replace bundle at {path}: {source}")]
    Replace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A query rejected before it reaches the search functions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("query is empty")]
    Empty,

    #[error("query too long: {length} characters, max {max}")]
    TooLong { length: usize, max: usize },

    #[error("query cannot be compiled into a search pattern: {0}")]
    Pattern(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
