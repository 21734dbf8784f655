use crate::infrastructure::error::InfraError;
use rusqlite::Connection;
use std::path::Path;

const KV_SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const KV_SCHEMA_VERSION: i64 = 1;

/// Creates the review key-value table and stamps `user_version`. A file
/// written by a newer build is refused instead of being read half-understood.
pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    let version: i64 = connection.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > KV_SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "{} uses storage schema {version}; this build supports {KV_SCHEMA_VERSION}",
            path.display()
        )));
    }

    connection.execute_batch(KV_SCHEMA_SQL)?;
    if version < KV_SCHEMA_VERSION {
        connection.pragma_update(None, "user_version", KV_SCHEMA_VERSION)?;
    }
    Ok(())
}
