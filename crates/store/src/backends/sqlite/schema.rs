//! SQLite schema definition.

use rusqlite::Connection;

use crate::error::{BackendError, StoreError, StoreResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initializes the database schema, creating tables and indexes as needed.
pub fn initialize(conn: &Connection) -> StoreResult<()> {
    let current = get_schema_version(conn)?;

    if current == 0 {
        create_tables(conn)?;
        create_indexes(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current > SCHEMA_VERSION {
        return Err(StoreError::Backend(BackendError::Internal {
            message: format!(
                "database schema version {} is newer than this build supports ({})",
                current, SCHEMA_VERSION
            ),
            source: None,
        }));
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> StoreResult<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> StoreResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> StoreResult<()> {
    // Current documents, one row per (type, id).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            doc_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version INTEGER NOT NULL,
            body BLOB NOT NULL,
            updated_at TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (doc_type, id)
        )",
        [],
    )?;

    // Append-only ledger, one row per version ever written.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS document_history (
            doc_type TEXT NOT NULL,
            id TEXT NOT NULL,
            version INTEGER NOT NULL,
            operation TEXT NOT NULL,
            body BLOB NOT NULL,
            written_at TEXT NOT NULL,
            PRIMARY KEY (doc_type, id, version)
        )",
        [],
    )?;

    // Derived search values, one row per extracted value. Exactly one value
    // column group is populated, matching `kind`.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS index_rows (
            doc_type TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            parameter TEXT NOT NULL,
            kind TEXT NOT NULL,
            value_string TEXT,
            value_number REAL,
            value_date_start TEXT,
            value_date_end TEXT,
            value_token_system TEXT,
            value_token_code TEXT,
            value_ref_type TEXT,
            value_ref_id TEXT,
            occurrence INTEGER
        )",
        [],
    )?;

    // Derived outbound pointers, one row per pointer-shaped field.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reference_edges (
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            target_type TEXT,
            target_id TEXT NOT NULL,
            field_path TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn create_indexes(conn: &Connection) -> StoreResult<()> {
    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type, deleted, updated_at)",
        "CREATE INDEX IF NOT EXISTS idx_documents_id ON documents(id)",
        "CREATE INDEX IF NOT EXISTS idx_index_string ON index_rows(doc_type, parameter, value_string)",
        "CREATE INDEX IF NOT EXISTS idx_index_number ON index_rows(doc_type, parameter, value_number)",
        "CREATE INDEX IF NOT EXISTS idx_index_date ON index_rows(doc_type, parameter, value_date_start, value_date_end)",
        "CREATE INDEX IF NOT EXISTS idx_index_token ON index_rows(doc_type, parameter, value_token_code, value_token_system)",
        "CREATE INDEX IF NOT EXISTS idx_index_reference ON index_rows(doc_type, parameter, value_ref_id)",
        "CREATE INDEX IF NOT EXISTS idx_index_document ON index_rows(doc_type, doc_id, parameter)",
        "CREATE INDEX IF NOT EXISTS idx_edges_target ON reference_edges(target_id, target_type)",
        "CREATE INDEX IF NOT EXISTS idx_edges_source ON reference_edges(source_type, source_id)",
    ];

    for sql in &indexes {
        conn.execute(sql, [])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        assert!(initialize(&conn).is_err());
    }
}
