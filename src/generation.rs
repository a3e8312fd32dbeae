//! One immutable build of the index and the build pipeline that makes it.

use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use rayon::prelude::*;
use tracing::info;

use crate::{
    config::VectorizerConfig,
    document::Document,
    error::{BuildError, LoadError, QueryError},
    exact::{self, QueryResult},
    loader,
    similarity::{DocumentVector, SimilarityHit, SimilarityIndex},
    vectorizer::{self, FeatureSpace},
};

/// A complete, internally consistent index: documents, their vectors and
/// the feature space that produced them. Never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexGeneration {
    id: u64,
    built_at: u64,
    documents: Vec<Document>,
    feature_space: FeatureSpace,
    index: SimilarityIndex,
}

impl IndexGeneration {
    /// Assemble a generation from its parts, checking that they agree.
    pub fn from_parts(
        id: u64,
        built_at: u64,
        documents: Vec<Document>,
        feature_space: FeatureSpace,
        vectors: Vec<DocumentVector>,
    ) -> Result<Self, String> {
        if documents.len() != vectors.len() {
            return Err(format!(
                "{} documents but {} vectors",
                documents.len(),
                vectors.len()
            ));
        }
        feature_space.check()?;
        for doc in &documents {
            doc.check_locators()?;
        }
        let index = SimilarityIndex::new(feature_space.dimension(), vectors)
            .map_err(|e| e.to_string())?;

        Ok(Self {
            id,
            built_at,
            documents,
            feature_space,
            index,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unix milliseconds at which the build finished.
    pub fn built_at(&self) -> u64 {
        self.built_at
    }

    /// Documents in load order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn feature_space(&self) -> &FeatureSpace {
        &self.feature_space
    }

    /// One vector per document, in load order.
    pub fn vectors(&self) -> &[DocumentVector] {
        self.index.vectors()
    }

    /// The `k` documents most similar to `text`, best first.
    pub fn query(
        &self,
        text: &str,
        k: usize,
    ) -> Result<Vec<SimilarityHit>, QueryError> {
        let vector = self.feature_space.embed(text);
        let neighbors = self.index.query(&vector, k)?;
        Ok(neighbors
            .into_iter()
            .enumerate()
            .map(|(pos, n)| SimilarityHit {
                document_id: self.documents[n.index].id.clone(),
                similarity: n.similarity,
                rank: pos + 1,
            })
            .collect())
    }

    /// Tolerant exact search over every document's raw text.
    pub fn search(
        &self,
        text: &str,
        context_lines: usize,
    ) -> Result<Vec<QueryResult>, QueryError> {
        exact::search(self, text, context_lines)
    }
}

/// A freshly built generation plus the files skipped while loading.
#[derive(Debug)]
pub struct Build {
    pub generation: IndexGeneration,
    pub warnings: Vec<LoadError>,
}

/// Load, fit and embed everything under `root` into a new generation.
pub fn build(
    root: &Path,
    config: &VectorizerConfig,
) -> Result<Build, BuildError> {
    let loaded = loader::load_documents(root)?;
    if loaded.documents.is_empty() {
        return Err(BuildError::NoDocuments {
            root: root.to_path_buf(),
            skipped: loaded.warnings.len(),
        });
    }

    let feature_space = vectorizer::fit(&loaded.documents, config)?;
    let vectors: Vec<DocumentVector> = loaded
        .documents
        .par_iter()
        .map(|doc| vectorizer::embed(&feature_space, &doc.raw_text))
        .collect();

    let built_at = unix_millis();
    let id = next_generation_id(built_at);
    let document_count = loaded.documents.len();
    let index = SimilarityIndex::new(feature_space.dimension(), vectors)
        .map_err(|e| BuildError::Inconsistent(e.to_string()))?;
    let generation = IndexGeneration {
        id,
        built_at,
        documents: loaded.documents,
        feature_space,
        index,
    };

    info!(
        generation = generation.id,
        documents = document_count,
        features = generation.feature_space.len(),
        skipped = loaded.warnings.len(),
        "built index generation"
    );
    Ok(Build {
        generation,
        warnings: loaded.warnings,
    })
}

static LAST_GENERATION_ID: AtomicU64 = AtomicU64::new(0);

/// Generation ids are build timestamps, bumped so that they strictly
/// increase within a process.
fn next_generation_id(now: u64) -> u64 {
    let mut last = LAST_GENERATION_ID.load(Ordering::Relaxed);
    loop {
        let id = now.max(last + 1);
        match LAST_GENERATION_ID.compare_exchange_weak(
            last,
            id,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return id,
            Err(actual) => last = actual,
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("reactor.txt"),
            "reactor coolant pump offline\ncoolant pressure nominal",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("garden.md"),
            "tomato seedlings need water\nwater the garden daily",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("habitat.log"),
            "habitat airlock cycled\nairlock pressure nominal",
        )
        .unwrap();
        tmp
    }

    #[test]
    fn build_produces_consistent_generation() {
        let tmp = corpus();
        let build = build(tmp.path(), &VectorizerConfig::default()).unwrap();
        let generation = build.generation;

        assert!(build.warnings.is_empty());
        assert_eq!(generation.document_count(), 3);
        assert_eq!(generation.vectors().len(), 3);
        for v in generation.vectors() {
            assert_eq!(v.dimension(), generation.feature_space().dimension());
        }
        let ids: Vec<_> =
            generation.documents().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["garden.md", "habitat.log", "reactor.txt"]);
    }

    #[test]
    fn query_ranks_the_relevant_document_first() {
        let tmp = corpus();
        let generation = build(tmp.path(), &VectorizerConfig::default())
            .unwrap()
            .generation;

        let hits = generation.query("coolant pump", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document_id, "reactor.txt");
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[1].rank, 2);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn query_k_is_clamped() {
        let tmp = corpus();
        let generation = build(tmp.path(), &VectorizerConfig::default())
            .unwrap()
            .generation;
        assert_eq!(generation.query("water", 50).unwrap().len(), 3);
    }

    #[test]
    fn empty_directory_is_a_build_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = build(tmp.path(), &VectorizerConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::NoDocuments { skipped: 0, .. }));
    }

    #[test]
    fn unreadable_only_directory_reports_skips() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("empty.txt"), "   ").unwrap();
        let err = build(tmp.path(), &VectorizerConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::NoDocuments { skipped: 1, .. }));
    }

    #[test]
    fn generation_ids_increase() {
        let tmp = corpus();
        let config = VectorizerConfig::default();
        let first = build(tmp.path(), &config).unwrap().generation;
        let second = build(tmp.path(), &config).unwrap().generation;
        assert!(second.id() > first.id());
    }

    #[test]
    fn from_parts_rejects_mismatched_counts() {
        let tmp = corpus();
        let generation = build(tmp.path(), &VectorizerConfig::default())
            .unwrap()
            .generation;

        let mut vectors = generation.vectors().to_vec();
        vectors.pop();
        assert!(
            IndexGeneration::from_parts(
                1,
                1,
                generation.documents().to_vec(),
                generation.feature_space().clone(),
                vectors,
            )
            .is_err()
        );
    }

    #[test]
    fn from_parts_rebuilds_an_equal_generation() {
        let tmp = corpus();
        let generation = build(tmp.path(), &VectorizerConfig::default())
            .unwrap()
            .generation;

        let copy = IndexGeneration::from_parts(
            generation.id(),
            generation.built_at(),
            generation.documents().to_vec(),
            generation.feature_space().clone(),
            generation.vectors().to_vec(),
        )
        .unwrap();
        assert_eq!(copy, generation);
    }
}
