//! Persist and load an [`IndexGeneration`] as a single redb file.
//!
//! The bundle is written to a temporary file next to the target and moved
//! into place only after the write transaction commits, so an existing
//! bundle is never partially overwritten.
//!
//! Layout:
//! - `meta`: `format_version` (u32 LE), `header` and `feature_space` (JSON)
//! - `documents`: position → JSON [`Document`]
//! - `vectors`: position → `[nnz u32 LE][dimension u32 LE][indices][values]`

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    document::Document,
    error::PersistError,
    generation::IndexGeneration,
    similarity::DocumentVector,
    vectorizer::FeatureSpace,
};

/// Bumped whenever the on-disk layout changes.
pub const FORMAT_VERSION: u32 = 1;

const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const DOCUMENTS: TableDefinition<u32, &[u8]> =
    TableDefinition::new("documents");
const VECTORS: TableDefinition<u32, &[u8]> = TableDefinition::new("vectors");

const VERSION_KEY: &str = "format_version";
const HEADER_KEY: &str = "header";
const FEATURE_SPACE_KEY: &str = "feature_space";

/// Header size of a vector entry: 4 bytes nnz + 4 bytes dimension.
const VECTOR_HEADER_SIZE: usize = 8;

/// Summary stored alongside the bundle contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleHeader {
    pub format_version: u32,
    pub generation_id: u64,
    pub built_at: u64,
    pub document_count: usize,
    pub feature_count: usize,
}

impl BundleHeader {
    fn of(generation: &IndexGeneration) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            generation_id: generation.id(),
            built_at: generation.built_at(),
            document_count: generation.document_count(),
            feature_count: generation.feature_space().len(),
        }
    }
}

/// Write `generation` to `path`, atomically replacing any existing bundle.
pub fn save(generation: &IndexGeneration, path: &Path) -> Result<(), PersistError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let header = serde_json::to_vec(&BundleHeader::of(generation))?;
    let feature_space = serde_json::to_vec(generation.feature_space())?;
    let documents = generation
        .documents()
        .iter()
        .map(serde_json::to_vec)
        .collect::<Result<Vec<_>, _>>()?;

    let tmp = tempfile::Builder::new()
        .prefix(".docsift-bundle")
        .suffix(".redb")
        .tempfile_in(parent)?;
    {
        let db = Database::create(tmp.path()).map_err(redb::Error::from)?;
        write_tables(&db, &header, &feature_space, &documents, generation)?;
    }

    tmp.persist(path).map_err(|e| PersistError::Replace {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    info!(
        path = %path.display(),
        generation = generation.id(),
        documents = generation.document_count(),
        "saved index bundle"
    );
    Ok(())
}

fn write_tables(
    db: &Database,
    header: &[u8],
    feature_space: &[u8],
    documents: &[Vec<u8>],
    generation: &IndexGeneration,
) -> Result<(), redb::Error> {
    let txn = db.begin_write()?;
    {
        let mut meta = txn.open_table(META)?;
        meta.insert(VERSION_KEY, FORMAT_VERSION.to_le_bytes().as_slice())?;
        meta.insert(HEADER_KEY, header)?;
        meta.insert(FEATURE_SPACE_KEY, feature_space)?;

        let mut docs = txn.open_table(DOCUMENTS)?;
        for (pos, bytes) in documents.iter().enumerate() {
            docs.insert(pos as u32, bytes.as_slice())?;
        }

        let mut vectors = txn.open_table(VECTORS)?;
        for (pos, vector) in generation.vectors().iter().enumerate() {
            let byte_len = VECTOR_HEADER_SIZE + vector.nnz() * 8;
            let mut guard = vectors.insert_reserve(pos as u32, byte_len)?;
            encode_vector(vector, guard.as_mut());
        }
    }
    txn.commit()?;
    Ok(())
}

fn encode_vector(vector: &DocumentVector, dest: &mut [u8]) {
    let nnz = vector.nnz();
    let values_at = VECTOR_HEADER_SIZE + nnz * 4;

    dest[0..4].copy_from_slice(&(nnz as u32).to_le_bytes());
    dest[4..8].copy_from_slice(&vector.dimension().to_le_bytes());
    dest[VECTOR_HEADER_SIZE..values_at]
        .copy_from_slice(bytemuck::cast_slice(vector.indices()));
    dest[values_at..].copy_from_slice(bytemuck::cast_slice(vector.values()));
}

fn decode_vector(bytes: &[u8]) -> Result<DocumentVector, String> {
    if bytes.len() < VECTOR_HEADER_SIZE {
        return Err("truncated vector header".to_string());
    }
    let nnz = read_u32(&bytes[0..4]) as usize;
    let dimension = read_u32(&bytes[4..8]);
    if bytes.len() != VECTOR_HEADER_SIZE + nnz * 8 {
        return Err(format!("vector length does not match {nnz} entries"));
    }

    let values_at = VECTOR_HEADER_SIZE + nnz * 4;
    // Stored bytes carry no alignment guarantee.
    let indices = bytes[VECTOR_HEADER_SIZE..values_at]
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<u32>)
        .collect();
    let values = bytes[values_at..]
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<f32>)
        .collect();
    DocumentVector::from_parts(dimension, indices, values)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Read a bundle back into a generation.
///
/// Fails with [`PersistError::Incompatible`] for another format version
/// and [`PersistError::Corrupt`] for anything that does not decode into a
/// consistent generation.
pub fn load(path: &Path) -> Result<IndexGeneration, PersistError> {
    let db = open(path)?;
    let header = read_header(&db)?;

    let raw = read_contents(&db)?;
    if raw.documents.len() != header.document_count
        || raw.vectors.len() != header.document_count
    {
        return Err(PersistError::Corrupt(format!(
            "header lists {} documents, found {} documents and {} vectors",
            header.document_count,
            raw.documents.len(),
            raw.vectors.len()
        )));
    }

    let feature_space: FeatureSpace =
        serde_json::from_slice(&raw.feature_space).map_err(corrupt)?;
    let documents = raw
        .documents
        .iter()
        .map(|bytes| serde_json::from_slice::<Document>(bytes))
        .collect::<Result<Vec<_>, _>>()
        .map_err(corrupt)?;
    let vectors = raw
        .vectors
        .iter()
        .map(|bytes| decode_vector(bytes))
        .collect::<Result<Vec<_>, _>>()
        .map_err(PersistError::Corrupt)?;

    let generation = IndexGeneration::from_parts(
        header.generation_id,
        header.built_at,
        documents,
        feature_space,
        vectors,
    )
    .map_err(PersistError::Corrupt)?;

    debug!(
        path = %path.display(),
        generation = generation.id(),
        "loaded index bundle"
    );
    Ok(generation)
}

/// Read only the header of a bundle.
pub fn inspect(path: &Path) -> Result<BundleHeader, PersistError> {
    let db = open(path)?;
    read_header(&db)
}

fn open(path: &Path) -> Result<Database, PersistError> {
    if !path.is_file() {
        return Err(PersistError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no index bundle at {}", path.display()),
        )));
    }
    Database::open(path).map_err(corrupt)
}

fn read_header(db: &Database) -> Result<BundleHeader, PersistError> {
    let (version, header) = read_meta(db).map_err(corrupt)?;
    let version = version
        .filter(|v| v.len() == 4)
        .map(|v| read_u32(&v))
        .ok_or_else(|| {
            PersistError::Corrupt("missing format version".to_string())
        })?;
    if version != FORMAT_VERSION {
        return Err(PersistError::Incompatible {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let header = header.ok_or_else(|| {
        PersistError::Corrupt("missing bundle header".to_string())
    })?;
    serde_json::from_slice(&header).map_err(corrupt)
}

type MetaEntries = (Option<Vec<u8>>, Option<Vec<u8>>);

fn read_meta(db: &Database) -> Result<MetaEntries, redb::Error> {
    let txn = db.begin_read()?;
    let meta = txn.open_table(META)?;
    let version = meta.get(VERSION_KEY)?.map(|v| v.value().to_vec());
    let header = meta.get(HEADER_KEY)?.map(|v| v.value().to_vec());
    Ok((version, header))
}

struct RawContents {
    feature_space: Vec<u8>,
    documents: Vec<Vec<u8>>,
    vectors: Vec<Vec<u8>>,
}

fn read_contents(db: &Database) -> Result<RawContents, PersistError> {
    let txn = db.begin_read().map_err(corrupt)?;
    let meta = txn.open_table(META).map_err(corrupt)?;
    let feature_space = meta
        .get(FEATURE_SPACE_KEY)
        .map_err(corrupt)?
        .map(|v| v.value().to_vec())
        .ok_or_else(|| {
            PersistError::Corrupt("missing feature space".to_string())
        })?;

    let documents =
        read_positional(&txn.open_table(DOCUMENTS).map_err(corrupt)?)?;
    let vectors = read_positional(&txn.open_table(VECTORS).map_err(corrupt)?)?;
    Ok(RawContents {
        feature_space,
        documents,
        vectors,
    })
}

/// Values of a position-keyed table; keys must run `0..n` without gaps.
fn read_positional(
    table: &impl ReadableTable<u32, &'static [u8]>,
) -> Result<Vec<Vec<u8>>, PersistError> {
    let mut values = Vec::new();
    for entry in table.iter().map_err(corrupt)? {
        let (k, v) = entry.map_err(corrupt)?;
        if k.value() as usize != values.len() {
            return Err(PersistError::Corrupt(format!(
                "unexpected entry at position {}",
                k.value()
            )));
        }
        values.push(v.value().to_vec());
    }
    Ok(values)
}

fn corrupt(e: impl std::fmt::Display) -> PersistError {
    PersistError::Corrupt(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::VectorizerConfig, generation};

    fn sample_generation() -> (tempfile::TempDir, IndexGeneration) {
        let tmp = tempfile::tempdir().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "alpha reactor coolant\nline two")
            .unwrap();
        std::fs::write(docs.join("b.md"), "# Beta\nhabitat airlock pressure")
            .unwrap();
        let generation =
            generation::build(&docs, &VectorizerConfig::default())
                .unwrap()
                .generation;
        (tmp, generation)
    }

    #[test]
    fn save_then_load_is_identical() {
        let (tmp, generation) = sample_generation();
        let path = tmp.path().join("index.redb");

        save(&generation, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, generation);
    }

    #[test]
    fn save_replaces_existing_bundle() {
        let (tmp, generation) = sample_generation();
        let path = tmp.path().join("index.redb");
        std::fs::write(&path, "previous contents").unwrap();

        save(&generation, &path).unwrap();
        assert_eq!(load(&path).unwrap().id(), generation.id());

        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".docsift"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn inspect_reads_header() {
        let (tmp, generation) = sample_generation();
        let path = tmp.path().join("index.redb");
        save(&generation, &path).unwrap();

        let header = inspect(&path).unwrap();
        assert_eq!(header.format_version, FORMAT_VERSION);
        assert_eq!(header.generation_id, generation.id());
        assert_eq!(header.document_count, 2);
        assert_eq!(header.feature_count, generation.feature_space().len());
    }

    #[test]
    fn missing_bundle_is_io_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load(&tmp.path().join("absent.redb")).unwrap_err();
        assert!(matches!(
            err,
            PersistError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound
        ));
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("index.redb");
        std::fs::write(&path, vec![0xAB; 8192]).unwrap();
        assert!(matches!(load(&path).unwrap_err(), PersistError::Corrupt(_)));
    }

    #[test]
    fn other_format_version_is_incompatible() {
        let (tmp, generation) = sample_generation();
        let path = tmp.path().join("index.redb");
        save(&generation, &path).unwrap();

        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut meta = txn.open_table(META).unwrap();
                meta.insert(VERSION_KEY, 99u32.to_le_bytes().as_slice())
                    .unwrap();
            }
            txn.commit().unwrap();
        }

        assert!(matches!(
            load(&path).unwrap_err(),
            PersistError::Incompatible {
                found: 99,
                expected: FORMAT_VERSION
            }
        ));
    }

    #[test]
    fn missing_vector_is_corrupt() {
        let (tmp, generation) = sample_generation();
        let path = tmp.path().join("index.redb");
        save(&generation, &path).unwrap();

        {
            let db = Database::create(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut vectors = txn.open_table(VECTORS).unwrap();
                vectors.remove(1).unwrap();
            }
            txn.commit().unwrap();
        }

        assert!(matches!(load(&path).unwrap_err(), PersistError::Corrupt(_)));
    }

    #[test]
    fn vector_codec_rejects_truncation() {
        let vector =
            DocumentVector::from_parts(10, vec![1, 4], vec![0.5, 0.25]).unwrap();
        let mut bytes = vec![0; VECTOR_HEADER_SIZE + 16];
        encode_vector(&vector, &mut bytes);
        assert_eq!(decode_vector(&bytes).unwrap(), vector);
        assert!(decode_vector(&bytes[..bytes.len() - 1]).is_err());
    }
}
