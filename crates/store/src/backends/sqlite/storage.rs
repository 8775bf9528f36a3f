//! DocumentStorage and HistoryProvider implementations for SQLite.
//!
//! The write path is one IMMEDIATE transaction per document: version check,
//! document upsert, history append, and full index regeneration commit or
//! roll back together. Regeneration completing is the publication point — a
//! concurrent reader can never observe a document whose index lags or leads
//! its body.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;

use crate::core::{DocumentStorage, HistoryEntry, HistoryProvider, Operation};
use crate::error::{
    ConcurrencyError, DocumentError, ExtractionError, StoreError, StoreResult, ValidationError,
};
use crate::index::{Extraction, IndexRow, IndexValue, format_ts, parse_ts};
use crate::reference::CanonicalRef;
use crate::types::Document;

use super::SqliteStore;

#[async_trait]
impl DocumentStorage for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn write(
        &self,
        doc_type: &str,
        id: &str,
        body: Value,
        expected_version: Option<i64>,
    ) -> StoreResult<Document> {
        self.put_version(doc_type, id, Some(body), expected_version, false)
    }

    async fn create(&self, doc_type: &str, body: Value) -> StoreResult<Document> {
        let id = body
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.put_version(doc_type, &id, Some(body), None, true)
    }

    async fn read(&self, doc_type: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.connection()?;

        let row = conn
            .query_row(
                "SELECT version, body, updated_at, deleted
                 FROM documents
                 WHERE doc_type = ?1 AND id = ?2",
                params![doc_type, id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)? != 0,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((_, _, _, true)) | None => Ok(None),
            Some((version, body, updated_at, deleted)) => Ok(Some(document_from_parts(
                doc_type, id, version, &body, &updated_at, deleted,
            )?)),
        }
    }

    async fn soft_delete(
        &self,
        doc_type: &str,
        id: &str,
        expected_version: i64,
    ) -> StoreResult<Document> {
        self.put_version(doc_type, id, None, Some(expected_version), false)
    }

    async fn count(&self, doc_type: Option<&str>) -> StoreResult<u64> {
        let conn = self.connection()?;
        let count: i64 = match doc_type {
            Some(doc_type) => conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE doc_type = ?1 AND deleted = 0",
                params![doc_type],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE deleted = 0",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }
}

#[async_trait]
impl HistoryProvider for SqliteStore {
    async fn read_at_version(
        &self,
        doc_type: &str,
        id: &str,
        version: i64,
    ) -> StoreResult<Option<Document>> {
        let conn = self.connection()?;

        let row = conn
            .query_row(
                "SELECT operation, body, written_at
                 FROM document_history
                 WHERE doc_type = ?1 AND id = ?2 AND version = ?3",
                params![doc_type, id, version],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((operation, body, written_at)) => {
                let deleted = operation == Operation::Delete.as_str();
                Ok(Some(document_from_parts(
                    doc_type, id, version, &body, &written_at, deleted,
                )?))
            }
        }
    }

    async fn history(&self, doc_type: &str, id: &str) -> StoreResult<Vec<HistoryEntry>> {
        let conn = self.connection()?;

        let mut stmt = conn.prepare(
            "SELECT version, operation, body, written_at
             FROM document_history
             WHERE doc_type = ?1 AND id = ?2
             ORDER BY version ASC",
        )?;

        let rows = stmt.query_map(params![doc_type, id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (version, operation, body, written_at) = row?;
            entries.push(HistoryEntry {
                doc_type: doc_type.to_string(),
                id: id.to_string(),
                version,
                operation: Operation::parse(&operation).ok_or_else(|| {
                    StoreError::Backend(crate::error::BackendError::Internal {
                        message: format!("unknown history operation '{}'", operation),
                        source: None,
                    })
                })?,
                body: serde_json::from_slice(&body)?,
                written_at: parse_ts(&written_at).map_err(internal)?,
            });
        }

        Ok(entries)
    }

    async fn current_version(&self, doc_type: &str, id: &str) -> StoreResult<Option<i64>> {
        let conn = self.connection()?;
        let version = conn
            .query_row(
                "SELECT version FROM documents WHERE doc_type = ?1 AND id = ?2",
                params![doc_type, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }
}

impl SqliteStore {
    /// The single write path. `body: None` writes a tombstone;
    /// `create_only` rejects keys that were ever written.
    fn put_version(
        &self,
        doc_type: &str,
        id: &str,
        body: Option<Value>,
        expected_version: Option<i64>,
        create_only: bool,
    ) -> StoreResult<Document> {
        validate_key(doc_type, id)?;
        if let Some(body) = &body {
            if !body.is_object() {
                return Err(ValidationError::MalformedDocument {
                    message: format!("body must be a JSON object, got {}", json_kind(body)),
                }
                .into());
            }
        }

        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<(i64, bool)> = tx
            .query_row(
                "SELECT version, deleted FROM documents WHERE doc_type = ?1 AND id = ?2",
                params![doc_type, id],
                |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
            )
            .optional()?;

        let is_delete = body.is_none();
        if is_delete {
            match current {
                Some((_, false)) => {}
                _ => {
                    return Err(DocumentError::NotFound {
                        doc_type: doc_type.to_string(),
                        id: id.to_string(),
                    }
                    .into());
                }
            }
        } else if create_only && current.is_some() {
            return Err(DocumentError::AlreadyExists {
                doc_type: doc_type.to_string(),
                id: id.to_string(),
            }
            .into());
        }

        if let Some(expected) = expected_version {
            let actual = current.map(|(v, _)| v).unwrap_or(0);
            if expected != actual {
                return Err(ConcurrencyError::VersionConflict {
                    doc_type: doc_type.to_string(),
                    id: id.to_string(),
                    expected,
                    actual,
                }
                .into());
            }
        }

        let version = current.map(|(v, _)| v + 1).unwrap_or(1);
        let operation = if is_delete {
            Operation::Delete
        } else if current.is_none() {
            Operation::Create
        } else {
            Operation::Update
        };

        // Tombstones regenerate to zero rows; live bodies go through the
        // extractor, and any rule failure aborts the whole transaction.
        let extraction = match &body {
            None => Extraction::default(),
            Some(body) => {
                let mut extraction =
                    self.extractor.extract(doc_type, body).map_err(|failure| {
                        tracing::error!(
                            doc_type,
                            id,
                            rule = %failure.rule,
                            "extraction failed, rejecting write: {}",
                            failure.message
                        );
                        StoreError::Extraction(ExtractionError::RuleFailed {
                            doc_type: doc_type.to_string(),
                            id: id.to_string(),
                            rule: failure.rule,
                            message: failure.message,
                        })
                    })?;
                resolve_untyped_refs(&tx, doc_type, id, &mut extraction)?;
                extraction
            }
        };

        let stored_body = body.unwrap_or(Value::Null);
        let body_bytes = serde_json::to_vec(&stored_body)?;
        let written_at = format_ts(Utc::now());

        tx.execute(
            "INSERT INTO documents (doc_type, id, version, body, updated_at, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(doc_type, id) DO UPDATE SET
                version = excluded.version,
                body = excluded.body,
                updated_at = excluded.updated_at,
                deleted = excluded.deleted",
            params![doc_type, id, version, body_bytes, written_at, is_delete as i64],
        )?;

        tx.execute(
            "INSERT INTO document_history (doc_type, id, version, operation, body, written_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![doc_type, id, version, operation.as_str(), body_bytes, written_at],
        )?;

        write_index(&tx, doc_type, id, &extraction)?;

        tx.commit()?;

        tracing::debug!(
            doc_type,
            id,
            version,
            operation = operation.as_str(),
            rows = extraction.rows.len(),
            edges = extraction.edges.len(),
            "document written"
        );

        Ok(document_from_parts(
            doc_type,
            id,
            version,
            &body_bytes,
            &written_at,
            is_delete,
        )?)
    }

    /// Reads back the index rows currently stored for a document, in
    /// insertion order. Derived state is fully reconstructable this way,
    /// which is also how the consistency tests check the extractor against
    /// the tables.
    pub async fn index_rows(&self, doc_type: &str, id: &str) -> StoreResult<Vec<IndexRow>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT parameter, kind,
                    value_string, value_number, value_date_start, value_date_end,
                    value_token_system, value_token_code, value_ref_type, value_ref_id,
                    occurrence
             FROM index_rows
             WHERE doc_type = ?1 AND doc_id = ?2
             ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map(params![doc_type, id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, Option<i64>>(10)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (parameter, kind, string, number, date_start, date_end, token_system, token_code, ref_type, ref_id, occurrence) = row?;
            let kind: crate::types::ParamKind = kind
                .parse()
                .map_err(|message: String| internal(message))?;
            let value = match kind {
                crate::types::ParamKind::String => IndexValue::String(
                    string.ok_or_else(|| internal("string row missing value".into()))?,
                ),
                crate::types::ParamKind::Number => IndexValue::Number(
                    number.ok_or_else(|| internal("number row missing value".into()))?,
                ),
                crate::types::ParamKind::Date => IndexValue::Date {
                    start: parse_ts(
                        &date_start.ok_or_else(|| internal("date row missing start".into()))?,
                    )
                    .map_err(internal)?,
                    end: parse_ts(
                        &date_end.ok_or_else(|| internal("date row missing end".into()))?,
                    )
                    .map_err(internal)?,
                },
                crate::types::ParamKind::Token => IndexValue::Token {
                    system: token_system,
                    code: token_code.ok_or_else(|| internal("token row missing code".into()))?,
                },
                crate::types::ParamKind::Reference => {
                    let id = ref_id.ok_or_else(|| internal("reference row missing id".into()))?;
                    IndexValue::Reference(match ref_type {
                        Some(doc_type) => CanonicalRef::typed(doc_type, id),
                        None => CanonicalRef::untyped(id),
                    })
                }
                crate::types::ParamKind::Composite => {
                    return Err(internal("composite rows are never stored".into()));
                }
            };
            result.push(IndexRow {
                parameter,
                kind,
                value,
                occurrence,
            });
        }
        Ok(result)
    }

    /// Reads back the reference edges currently stored for a document, in
    /// insertion order.
    pub async fn reference_edges(
        &self,
        doc_type: &str,
        id: &str,
    ) -> StoreResult<Vec<crate::index::ReferenceEdge>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT target_type, target_id, field_path
             FROM reference_edges
             WHERE source_type = ?1 AND source_id = ?2
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![doc_type, id], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (target_type, target_id, field_path) = row?;
            edges.push(crate::index::ReferenceEdge {
                target: match target_type {
                    Some(doc_type) => CanonicalRef::typed(doc_type, target_id),
                    None => CanonicalRef::untyped(target_id),
                },
                field_path,
            });
        }
        Ok(edges)
    }

    /// Rebuilds index rows and reference edges from stored bodies.
    ///
    /// Derived state is rebuildable by construction; this exists for rule
    /// table changes. Documents whose bodies now fail a rule are skipped
    /// with an error log — their previous rows stay in place — so one bad
    /// document can never corrupt the index for the others.
    ///
    /// Returns the number of documents reindexed.
    pub async fn reindex(&self, doc_type: Option<&str>) -> StoreResult<u64> {
        let keys: Vec<(String, String, Vec<u8>)> = {
            let conn = self.connection()?;
            let (sql, filter) = match doc_type {
                Some(t) => (
                    "SELECT doc_type, id, body FROM documents WHERE deleted = 0 AND doc_type = ?1",
                    Some(t),
                ),
                None => ("SELECT doc_type, id, body FROM documents WHERE deleted = 0", None),
            };
            let mut stmt = conn.prepare(sql)?;
            let map = |row: &rusqlite::Row<'_>| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            };
            let rows = match filter {
                Some(t) => stmt.query_map(params![t], map)?.collect::<Result<_, _>>()?,
                None => stmt.query_map([], map)?.collect::<Result<_, _>>()?,
            };
            rows
        };

        let mut reindexed = 0u64;
        for (doc_type, id, body_bytes) in keys {
            let body: Value = serde_json::from_slice(&body_bytes)?;
            let mut extraction = match self.extractor.extract(&doc_type, &body) {
                Ok(extraction) => extraction,
                Err(failure) => {
                    tracing::error!(
                        doc_type = %doc_type,
                        id = %id,
                        rule = %failure.rule,
                        "reindex skipping document: {}",
                        failure.message
                    );
                    continue;
                }
            };

            let mut conn = self.connection()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            resolve_untyped_refs(&tx, &doc_type, &id, &mut extraction)?;
            write_index(&tx, &doc_type, &id, &extraction)?;
            tx.commit()?;
            reindexed += 1;
        }

        Ok(reindexed)
    }
}

/// Replaces all derived state for a document inside the caller's
/// transaction.
fn write_index(
    conn: &Connection,
    doc_type: &str,
    id: &str,
    extraction: &Extraction,
) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM index_rows WHERE doc_type = ?1 AND doc_id = ?2",
        params![doc_type, id],
    )?;
    conn.execute(
        "DELETE FROM reference_edges WHERE source_type = ?1 AND source_id = ?2",
        params![doc_type, id],
    )?;

    let mut insert_row = conn.prepare(
        "INSERT INTO index_rows (
            doc_type, doc_id, parameter, kind,
            value_string, value_number, value_date_start, value_date_end,
            value_token_system, value_token_code, value_ref_type, value_ref_id,
            occurrence
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;

    for row in &extraction.rows {
        let slots = ValueSlots::from_row(row);
        insert_row.execute(params![
            doc_type,
            id,
            row.parameter,
            row.kind.to_string(),
            slots.string,
            slots.number,
            slots.date_start,
            slots.date_end,
            slots.token_system,
            slots.token_code,
            slots.ref_type,
            slots.ref_id,
            row.occurrence,
        ])?;
    }

    let mut insert_edge = conn.prepare(
        "INSERT INTO reference_edges (source_type, source_id, target_type, target_id, field_path)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    for edge in &extraction.edges {
        insert_edge.execute(params![
            doc_type,
            id,
            edge.target.doc_type(),
            edge.target.id(),
            edge.field_path,
        ])?;
    }

    Ok(())
}

/// Attempts to type untyped references against previously indexed secondary
/// identifiers: a document that indexes a token parameter named `identifier`
/// whose code equals the opaque token is a candidate. Exactly one candidate
/// type resolves the reference; zero or several leave it untyped.
fn resolve_untyped_refs(
    conn: &Connection,
    source_type: &str,
    source_id: &str,
    extraction: &mut Extraction,
) -> StoreResult<()> {
    let mut cache: HashMap<String, Option<String>> = HashMap::new();

    let mut resolve = |conn: &Connection, token: &str| -> StoreResult<Option<String>> {
        if let Some(found) = cache.get(token) {
            return Ok(found.clone());
        }
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT doc_type FROM index_rows
             WHERE parameter = 'identifier' AND kind = 'token' AND value_token_code = ?1
               AND NOT (doc_type = ?2 AND doc_id = ?3)
             LIMIT 2",
        )?;
        let types: Vec<String> = stmt
            .query_map(params![token, source_type, source_id], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        let resolved = if types.len() == 1 {
            Some(types.into_iter().next().unwrap())
        } else {
            if !types.is_empty() {
                tracing::warn!(
                    source = %format!("{}/{}", source_type, source_id),
                    token,
                    "opaque reference matches multiple types, leaving untyped"
                );
            }
            None
        };
        cache.insert(token.to_string(), resolved.clone());
        Ok(resolved)
    };

    for row in &mut extraction.rows {
        if let IndexValue::Reference(re @ CanonicalRef::Untyped { .. }) = &mut row.value {
            if let Some(doc_type) = resolve(conn, &re.id().to_string())? {
                *re = re.clone().with_type(doc_type);
            }
        }
    }

    for edge in &mut extraction.edges {
        if let CanonicalRef::Untyped { .. } = &edge.target {
            if let Some(doc_type) = resolve(conn, &edge.target.id().to_string())? {
                edge.target = edge.target.clone().with_type(doc_type);
            }
        }
    }

    Ok(())
}

/// One populated slot group per kind, ready for column binding.
#[derive(Default)]
struct ValueSlots {
    string: Option<String>,
    number: Option<f64>,
    date_start: Option<String>,
    date_end: Option<String>,
    token_system: Option<String>,
    token_code: Option<String>,
    ref_type: Option<String>,
    ref_id: Option<String>,
}

impl ValueSlots {
    fn from_row(row: &IndexRow) -> Self {
        let mut slots = Self::default();
        match &row.value {
            IndexValue::String(s) => slots.string = Some(s.clone()),
            IndexValue::Number(n) => slots.number = Some(*n),
            IndexValue::Date { start, end } => {
                slots.date_start = Some(format_ts(*start));
                slots.date_end = Some(format_ts(*end));
            }
            IndexValue::Token { system, code } => {
                slots.token_system = system.clone();
                slots.token_code = Some(code.clone());
            }
            IndexValue::Reference(re) => {
                slots.ref_type = re.doc_type().map(String::from);
                slots.ref_id = Some(re.id().to_string());
            }
        }
        slots
    }
}

pub(super) fn document_from_parts(
    doc_type: &str,
    id: &str,
    version: i64,
    body: &[u8],
    updated_at: &str,
    deleted: bool,
) -> StoreResult<Document> {
    Ok(Document::from_storage(
        doc_type,
        id,
        version,
        parse_ts(updated_at).map_err(internal)?,
        deleted,
        serde_json::from_slice(body)?,
    ))
}

fn validate_key(doc_type: &str, id: &str) -> StoreResult<()> {
    for (name, value) in [("type", doc_type), ("id", id)] {
        if value.is_empty() {
            return Err(ValidationError::InvalidKey {
                message: format!("document {} must not be empty", name),
            }
            .into());
        }
        if value.contains('/') {
            return Err(ValidationError::InvalidKey {
                message: format!("document {} must not contain '/': {}", name, value),
            }
            .into());
        }
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn internal(message: String) -> StoreError {
    StoreError::Backend(crate::error::BackendError::Internal {
        message,
        source: None,
    })
}
