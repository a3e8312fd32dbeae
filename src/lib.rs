//! docsift - index a directory of mixed-format documents and search it.
//!
//! Documents (text, logs, source code, PDF, Word) are loaded into an
//! immutable [`IndexGeneration`] holding a TF-IDF feature space and one
//! sparse vector per document. A generation answers two kinds of query:
//! cosine similarity ranking, and an exact search that tolerates hyphens
//! and spaces (`bowtie` finds `bow-tie`) and returns line context.
//!
//! # Quick start
//!
//! ```no_run
//! use docsift::{Engine, config::EngineConfig, rebuild::RebuildRequest};
//!
//! let engine = Engine::new(EngineConfig::default());
//! if let RebuildRequest::Accepted(handle) =
//!     engine.request_rebuild("/srv/docs".as_ref())
//! {
//!     handle.wait();
//! }
//!
//! for r in engine.search("habitat initialization failed").unwrap() {
//!     println!("{} ({}): {}", r.document_id, r.locator_label, r.context_lines[0]);
//! }
//! ```

pub mod bundle;
pub mod config;
pub mod config_db;
pub mod data_dir;
pub mod doc_id;
pub mod document;
pub mod engine;
pub mod error;
pub mod exact;
pub mod format;
pub mod generation;
pub mod loader;
pub mod rebuild;
pub mod similarity;
pub mod text_util;
pub mod vectorizer;
pub mod walker;

pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use doc_id::DocumentId;
pub use engine::Engine;
pub use error::{Error, Result};
pub use generation::IndexGeneration;
