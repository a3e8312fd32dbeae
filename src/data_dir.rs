//! Location of the settings store and the saved index.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{
    config::env_var_name,
    error::{Error, Result},
};

pub const CONFIG_DB_FILE: &str = "config.redb";
pub const INDEX_BUNDLE_FILE: &str = "index.redb";

/// What selected the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDirSource {
    Flag,
    Env,
    Xdg,
}

impl fmt::Display for DataDirSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => f.write_str("--data-dir"),
            Self::Env => f.write_str(&env_var_name("data_dir")),
            Self::Xdg => f.write_str("XDG data home"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    source: DataDirSource,
}

impl DataDir {
    /// Use `explicit` (the `--data-dir` flag) if given, else
    /// `DOCSIFT_DATA_DIR`, else `~/.local/share/docsift/`. The directory is
    /// created if missing.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_from(
            explicit,
            std::env::var_os(env_var_name("data_dir")),
            xdg_data_home,
        )
    }

    /// [`DataDir::resolve`] with the environment value and the XDG lookup
    /// supplied by the caller. An empty environment value counts as unset.
    pub fn resolve_from(
        explicit: Option<&Path>,
        env: Option<OsString>,
        xdg: impl FnOnce() -> Result<PathBuf>,
    ) -> Result<Self> {
        let (root, source) = match (explicit, env.filter(|v| !v.is_empty())) {
            (Some(path), _) => (path.to_path_buf(), DataDirSource::Flag),
            (None, Some(value)) => (PathBuf::from(value), DataDirSource::Env),
            (None, None) => (xdg()?, DataDirSource::Xdg),
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root, source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> DataDirSource {
        self.source
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join(CONFIG_DB_FILE)
    }

    /// The persisted index generation.
    pub fn index_bundle(&self) -> PathBuf {
        self.root.join(INDEX_BUNDLE_FILE)
    }
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("docsift")
        .get_data_home()
        .ok_or_else(|| {
            Error::Config("could not determine XDG data home directory".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_xdg() -> Result<PathBuf> {
        Err(Error::Config("no XDG in tests".into()))
    }

    #[test]
    fn flag_wins_over_environment() {
        let flag = tempfile::tempdir().unwrap();
        let env = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve_from(
            Some(flag.path()),
            Some(env.path().as_os_str().to_owned()),
            no_xdg,
        )
        .unwrap();

        assert_eq!(dir.root(), flag.path());
        assert_eq!(dir.source(), DataDirSource::Flag);
        assert_eq!(dir.config_db(), flag.path().join("config.redb"));
        assert_eq!(dir.index_bundle(), flag.path().join("index.redb"));
    }

    #[test]
    fn environment_is_used_without_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir = DataDir::resolve_from(
            None,
            Some(nested.clone().into_os_string()),
            no_xdg,
        )
        .unwrap();

        assert_eq!(dir.source(), DataDirSource::Env);
        assert_eq!(dir.source().to_string(), "DOCSIFT_DATA_DIR");
        assert!(nested.is_dir());
    }

    #[test]
    fn empty_environment_falls_back_to_xdg() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("share").join("docsift");
        let dir =
            DataDir::resolve_from(None, Some(OsString::new()), || Ok(home.clone()))
                .unwrap();

        assert_eq!(dir.root(), home);
        assert_eq!(dir.source(), DataDirSource::Xdg);
    }

    #[test]
    fn missing_xdg_home_is_an_error() {
        let err = DataDir::resolve_from(None, None, no_xdg).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn uncreatable_directory_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, "not a directory").unwrap();

        let err = DataDir::resolve_from(Some(&file), None, no_xdg).unwrap_err();
        assert!(matches!(err, Error::DataDir(path) if path == file));
    }
}
