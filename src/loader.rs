use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    doc_id::DocumentId,
    document::Document,
    error::{BuildError, LoadError},
    walker::{self, DiscoveredFile},
};

/// Documents loaded from one root, plus the files that were skipped.
#[derive(Debug, Default)]
pub struct Loaded {
    /// In walker order (sorted by relative path).
    pub documents: Vec<Document>,
    pub warnings: Vec<LoadError>,
}

/// Load every eligible file under `root`.
///
/// Files are read and extracted in parallel, but the output keeps the
/// walker's order. Per-file failures are collected as warnings; only an
/// unreadable root fails the call.
pub fn load_documents(root: &Path) -> Result<Loaded, BuildError> {
    let files =
        walker::discover_files(root).map_err(|source| BuildError::Root {
            path: root.to_path_buf(),
            source,
        })?;
    debug!(root = %root.display(), files = files.len(), "discovered files");

    let outcomes: Vec<Result<Document, LoadError>> =
        files.par_iter().map(load_file).collect();

    let mut loaded = Loaded::default();
    for outcome in outcomes {
        match outcome {
            Ok(document) => loaded.documents.push(document),
            Err(e) => {
                warn!("skipping {e}");
                loaded.warnings.push(e);
            }
        }
    }

    info!(
        root = %root.display(),
        documents = loaded.documents.len(),
        skipped = loaded.warnings.len(),
        "loaded documents"
    );
    Ok(loaded)
}

/// Read and extract a single discovered file.
pub fn load_file(file: &DiscoveredFile) -> Result<Document, LoadError> {
    let path = &file.absolute_path;
    let bytes = std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.clone(),
        message: e.to_string(),
    })?;

    let extracted = file.format.extract(path, &bytes)?;
    if extracted.text.trim().is_empty() {
        return Err(LoadError::EmptyText { path: path.clone() });
    }

    Ok(Document {
        id: DocumentId::new(&file.relative_path).path,
        path: path.clone(),
        format: file.format,
        raw_text: extracted.text,
        locators: extracted.locators,
    })
}
