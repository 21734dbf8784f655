use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn set(&self, key: &str, value: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
    fn list_keys(&self) -> Result<Vec<String>, InfraError>;
}

fn normalized_key(key: &str) -> Option<&str> {
    let normalized = key.trim();
    if normalized.is_empty() {
        return None;
    }
    Some(normalized)
}

#[derive(Debug, Clone)]
pub struct SqliteLocalStore {
    db_path: PathBuf,
}

impl SqliteLocalStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl LocalStore for SqliteLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let Some(key) = normalized_key(key) else {
            return Ok(None);
        };
        let connection = self.connect()?;
        let value = connection
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let key = normalized_key(key)
            .ok_or_else(|| InfraError::Validation("local store key must not be empty".to_string()))?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let Some(key) = normalized_key(key) else {
            return Ok(());
        };
        let connection = self.connect()?;
        connection.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLocalStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryLocalStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, InfraError> {
        self.entries
            .lock()
            .map_err(|error| InfraError::Transient(format!("local store lock poisoned: {error}")))
    }
}

impl LocalStore for InMemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let Some(key) = normalized_key(key) else {
            return Ok(None);
        };
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), InfraError> {
        let key = normalized_key(key)
            .ok_or_else(|| InfraError::Validation("local store key must not be empty".to_string()))?;
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let Some(key) = normalized_key(key) else {
            return Ok(());
        };
        self.lock()?.remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>, InfraError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DB: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        dir: PathBuf,
        path: PathBuf,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DB.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "review-scheduler-local-store-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&dir).expect("create temp dir");
            let path = dir.join("reviews.sqlite");
            initialize_database(&path).expect("initialize database");
            Self { dir, path }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    fn exercise_store(store: &dyn LocalStore) {
        assert_eq!(store.get("reviewData").expect("get missing"), None);

        store.set("reviewData", "[]").expect("set");
        store.set("reviewData", "[1]").expect("overwrite");
        store.set("token", "abc").expect("set second key");
        assert_eq!(store.get(" reviewData ").expect("get"), Some("[1]".to_string()));
        assert_eq!(
            store.list_keys().expect("list keys"),
            vec!["reviewData".to_string(), "token".to_string()]
        );

        store.remove("reviewData").expect("remove");
        store.remove("reviewData").expect("remove twice");
        assert_eq!(store.get("reviewData").expect("get removed"), None);
        assert!(matches!(store.set("  ", "x"), Err(InfraError::Validation(_))));
    }

    #[test]
    fn sqlite_store_get_set_remove() {
        let database = TempDatabase::new();
        let store = SqliteLocalStore::new(&database.path);
        exercise_store(&store);
    }

    #[test]
    fn sqlite_store_persists_across_instances() {
        let database = TempDatabase::new();
        SqliteLocalStore::new(&database.path)
            .set("reviewData", "[\"kept\"]")
            .expect("set");
        let reopened = SqliteLocalStore::new(&database.path);
        assert_eq!(
            reopened.get("reviewData").expect("get"),
            Some("[\"kept\"]".to_string())
        );
    }

    #[test]
    fn in_memory_store_get_set_remove() {
        exercise_store(&InMemoryLocalStore::default());
    }
}
