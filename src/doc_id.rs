use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    path::{Component, Path},
};

/// A stable document identifier derived from the path relative to the
/// indexed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentId {
    /// Relative path with `/` separators on every platform.
    pub path: String,
    /// The short hex string for human display (e.g. "a1b2c3").
    pub short: String,
}

impl DocumentId {
    /// Generate a document ID from a path relative to the indexed root.
    pub fn new(relative_path: &Path) -> Self {
        let path = normalize(relative_path);
        let short = Self::short_hex(Self::hash_path(&path), 6);
        Self { path, short }
    }

    /// Rebuild the ID of an already normalised path string.
    pub fn from_normalized(path: &str) -> Self {
        Self {
            path: path.to_string(),
            short: Self::short_hex(Self::hash_path(path), 6),
        }
    }

    fn hash_path(path: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish()
    }

    fn short_hex(value: u64, len: usize) -> String {
        let full = format!("{value:016x}");
        full[..len].to_string()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}

fn normalize(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
