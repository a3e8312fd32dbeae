use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");
const BUILD_RECORD: TableDefinition<&str, &[u8]> =
    TableDefinition::new("build_record");

const LAST_BUILD_KEY: &str = "last";

/// Summary of the last successful `index` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub root: String,
    pub generation_id: u64,
    pub document_count: usize,
    pub warnings: usize,
    /// Unix milliseconds.
    pub built_at: u64,
}

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.open_table(BUILD_RECORD)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    // -- Build record --

    pub fn record_build(&self, record: &BuildRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(BUILD_RECORD)?;
            table.insert(LAST_BUILD_KEY, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn last_build(&self) -> Result<Option<BuildRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BUILD_RECORD)?;
        match table.get(LAST_BUILD_KEY)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, ConfigDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = ConfigDb::open(&tmp.path().join("config.redb")).unwrap();
        (tmp, db)
    }

    fn record(generation_id: u64) -> BuildRecord {
        BuildRecord {
            root: "/srv/docs".to_string(),
            generation_id,
            document_count: 3,
            warnings: 1,
            built_at: generation_id,
        }
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting("top_k").unwrap(), None);

        db.set_setting("top_k", "8").unwrap();
        assert_eq!(db.get_setting("top_k").unwrap(), Some("8".to_string()));

        db.set_setting("max_df", "0.9").unwrap();
        assert_eq!(
            db.list_settings().unwrap(),
            vec![
                ("max_df".to_string(), "0.9".to_string()),
                ("top_k".to_string(), "8".to_string()),
            ]
        );

        assert!(db.remove_setting("top_k").unwrap());
        assert!(!db.remove_setting("top_k").unwrap());
        assert_eq!(db.get_setting("top_k").unwrap(), None);
    }

    #[test]
    fn build_record_keeps_latest() {
        let (_tmp, db) = test_db();
        assert_eq!(db.last_build().unwrap(), None);

        db.record_build(&record(1)).unwrap();
        db.record_build(&record(2)).unwrap();
        assert_eq!(db.last_build().unwrap(), Some(record(2)));
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.redb");

        {
            let db = ConfigDb::open(&path).unwrap();
            db.set_setting("documents_dir", "/srv/docs").unwrap();
            db.record_build(&record(7)).unwrap();
        }

        {
            let db = ConfigDb::open(&path).unwrap();
            assert_eq!(
                db.get_setting("documents_dir").unwrap(),
                Some("/srv/docs".to_string())
            );
            assert_eq!(db.last_build().unwrap(), Some(record(7)));
        }
    }
}
