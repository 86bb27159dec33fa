use super::*;

const TABLE_STATEMENTS: &[&str] = &["CREATE TABLE IF NOT EXISTS kv_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )"];

pub(super) fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    for statement in TABLE_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

pub(super) fn apply_schema_migrations(storage: &Storage) -> Result<(), StorageError> {
    let stored_version = storage.schema_version()?;

    if stored_version > SCHEMA_VERSION {
        return Err(StorageError::Other(format!(
            "Unsupported database schema version: {stored_version} (max supported: {SCHEMA_VERSION})"
        )));
    }

    if stored_version < SCHEMA_VERSION {
        storage.set_schema_version(SCHEMA_VERSION)?;
    }
    Ok(())
}
