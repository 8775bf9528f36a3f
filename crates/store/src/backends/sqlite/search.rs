//! Query planning and execution over the index tables.
//!
//! Each predicate becomes an EXISTS subquery against `index_rows`, ANDed
//! into one WHERE clause over the `documents` table (alias `d`). Because
//! predicates never join at the top level, a document matches at most once —
//! set semantics at the document level fall out of the plan shape rather
//! than a DISTINCT.

use std::collections::HashSet;

use async_trait::async_trait;
use rusqlite::{Connection, params, params_from_iter};
use rusqlite::types::{ToSql, ToSqlOutput};

use crate::core::{SearchProvider, SearchSet};
use crate::error::{SearchError, StoreResult};
use crate::index::{RuleRegistry, date_range, format_ts};
use crate::reference::CanonicalRef;
use crate::types::{
    Comparator, Document, Include, Modifier, ParamKind, Predicate, Query, QueryValue,
    SortDirection,
};

use super::SqliteStore;
use super::storage::document_from_parts;

/// A bound SQL parameter.
#[derive(Debug, Clone)]
pub(super) enum SqlParam {
    /// Text parameter.
    Text(String),
    /// Integer parameter.
    Int(i64),
    /// Float parameter.
    Float(f64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => s.to_sql(),
            SqlParam::Int(i) => i.to_sql(),
            SqlParam::Float(f) => f.to_sql(),
        }
    }
}

/// A fragment of SQL with its bound parameters, in order.
#[derive(Debug, Clone, Default)]
pub(super) struct Fragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Fragment {
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Joins fragments with OR, parenthesizing each.
    pub fn or_join(fragments: Vec<Fragment>) -> Fragment {
        let mut sql = String::new();
        let mut params = Vec::new();
        for (i, fragment) in fragments.into_iter().enumerate() {
            if i > 0 {
                sql.push_str(" OR ");
            }
            sql.push('(');
            sql.push_str(&fragment.sql);
            sql.push(')');
            params.extend(fragment.params);
        }
        Fragment { sql, params }
    }
}

/// Translates a [`Query`] into WHERE conditions and an ORDER BY clause.
pub(super) struct Planner<'a> {
    pub(super) doc_type: &'a str,
    pub(super) registry: &'a RuleRegistry,
    pub(super) max_chain_depth: usize,
    alias_counter: usize,
}

impl<'a> Planner<'a> {
    pub fn new(doc_type: &'a str, registry: &'a RuleRegistry, max_chain_depth: usize) -> Self {
        Self {
            doc_type,
            registry,
            max_chain_depth,
            alias_counter: 0,
        }
    }

    pub(super) fn next_alias(&mut self, prefix: &str) -> String {
        self.alias_counter += 1;
        format!("{}{}", prefix, self.alias_counter)
    }

    /// Builds one condition fragment per predicate and reverse chain.
    pub fn conditions(&mut self, query: &Query) -> StoreResult<Vec<Fragment>> {
        let mut conditions = Vec::new();
        for predicate in &query.predicates {
            conditions.push(self.predicate_condition(predicate)?);
        }
        for chain in &query.reverse_chains {
            conditions.push(self.reverse_chain_condition(chain)?);
        }
        Ok(conditions)
    }

    fn predicate_condition(&mut self, predicate: &Predicate) -> StoreResult<Fragment> {
        if let Some(segments) = predicate.chain_segments() {
            return self.chain_condition(&segments, predicate);
        }

        if predicate.modifier == Some(Modifier::Missing) {
            return self.missing_condition(predicate);
        }

        if predicate.values.is_empty() {
            return Err(SearchError::InvalidValue {
                parameter: predicate.parameter.clone(),
                message: "at least one value is required".to_string(),
            }
            .into());
        }

        match predicate.parameter.as_str() {
            "_id" => return self.builtin_id_condition(predicate),
            "_lastUpdated" => return self.builtin_updated_condition(predicate),
            _ => {}
        }

        let kind = self.kind_of(&predicate.parameter)?;
        self.check_modifier(&predicate.parameter, kind, predicate.modifier)?;

        if kind == ParamKind::Composite {
            let rule = self
                .registry
                .rule(self.doc_type, &predicate.parameter)
                .expect("composite kind implies a rule");
            return self.composite_condition(rule, predicate);
        }

        let alias = self.next_alias("r");
        let matches = self.value_matches(&alias, kind, predicate)?;
        let mut fragment = Fragment::new(
            format!(
                "EXISTS (SELECT 1 FROM index_rows {a} \
                 WHERE {a}.doc_type = ? AND {a}.doc_id = d.id AND {a}.parameter = ? \
                 AND ({values}))",
                a = alias,
                values = matches.sql,
            ),
            vec![
                SqlParam::Text(self.doc_type.to_string()),
                SqlParam::Text(predicate.parameter.clone()),
            ],
        );
        fragment.params.extend(matches.params);
        Ok(fragment)
    }

    fn missing_condition(&mut self, predicate: &Predicate) -> StoreResult<Fragment> {
        // The parameter must still be registered; "missing" on a parameter
        // the type never indexes would vacuously match everything.
        self.kind_of(&predicate.parameter)?;

        let wanted_missing = match predicate.values.as_slice() {
            [single] => match single.value.as_str() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(SearchError::InvalidValue {
                        parameter: predicate.parameter.clone(),
                        message: format!("missing takes 'true' or 'false', got '{}'", other),
                    }
                    .into());
                }
            },
            _ => {
                return Err(SearchError::InvalidValue {
                    parameter: predicate.parameter.clone(),
                    message: "missing takes exactly one value".to_string(),
                }
                .into());
            }
        };

        let alias = self.next_alias("r");
        let negation = if wanted_missing { "NOT " } else { "" };
        Ok(Fragment::new(
            format!(
                "{not}EXISTS (SELECT 1 FROM index_rows {a} \
                 WHERE {a}.doc_type = ? AND {a}.doc_id = d.id AND {a}.parameter = ?)",
                not = negation,
                a = alias,
            ),
            vec![
                SqlParam::Text(self.doc_type.to_string()),
                SqlParam::Text(predicate.parameter.clone()),
            ],
        ))
    }

    fn builtin_id_condition(&mut self, predicate: &Predicate) -> StoreResult<Fragment> {
        self.check_modifier(&predicate.parameter, ParamKind::Token, predicate.modifier)?;
        let mut alternatives = Vec::new();
        for value in &predicate.values {
            if value.comparator != Comparator::Eq {
                return Err(SearchError::InvalidValue {
                    parameter: "_id".to_string(),
                    message: "only eq is supported for _id".to_string(),
                }
                .into());
            }
            alternatives.push(Fragment::new(
                "d.id = ?",
                vec![SqlParam::Text(value.value.clone())],
            ));
        }
        Ok(Fragment::or_join(alternatives))
    }

    fn builtin_updated_condition(&mut self, predicate: &Predicate) -> StoreResult<Fragment> {
        self.check_modifier(&predicate.parameter, ParamKind::Date, predicate.modifier)?;
        let mut alternatives = Vec::new();
        for value in &predicate.values {
            let (start, end) = date_range(&value.value).map_err(|message| {
                SearchError::InvalidValue {
                    parameter: "_lastUpdated".to_string(),
                    message,
                }
            })?;
            let (start, end) = (format_ts(start), format_ts(end));
            // The stored timestamp is an instant; compare it against the
            // query value's covered interval.
            let fragment = match value.comparator {
                Comparator::Eq => Fragment::new(
                    "d.updated_at >= ? AND d.updated_at < ?",
                    vec![SqlParam::Text(start), SqlParam::Text(end)],
                ),
                Comparator::Ne => Fragment::new(
                    "NOT (d.updated_at >= ? AND d.updated_at < ?)",
                    vec![SqlParam::Text(start), SqlParam::Text(end)],
                ),
                Comparator::Gt => {
                    Fragment::new("d.updated_at >= ?", vec![SqlParam::Text(end)])
                }
                Comparator::Lt => {
                    Fragment::new("d.updated_at < ?", vec![SqlParam::Text(start)])
                }
                Comparator::Ge => {
                    Fragment::new("d.updated_at >= ?", vec![SqlParam::Text(start)])
                }
                Comparator::Le => Fragment::new("d.updated_at < ?", vec![SqlParam::Text(end)]),
            };
            alternatives.push(fragment);
        }
        Ok(Fragment::or_join(alternatives))
    }

    fn composite_condition(
        &mut self,
        rule: &crate::index::ParameterRule,
        predicate: &Predicate,
    ) -> StoreResult<Fragment> {
        if predicate.modifier.is_some() {
            return Err(SearchError::InvalidModifier {
                parameter: predicate.parameter.clone(),
                modifier: predicate.modifier.unwrap().to_string(),
            }
            .into());
        }

        let mut alternatives = Vec::new();
        for value in &predicate.values {
            let parts: Vec<&str> = value.value.split('$').collect();
            if parts.len() != rule.components.len() {
                return Err(SearchError::InvalidValue {
                    parameter: predicate.parameter.clone(),
                    message: format!(
                        "composite value needs {} '$'-separated parts, got {}",
                        rule.components.len(),
                        parts.len()
                    ),
                }
                .into());
            }

            let aliases: Vec<String> = (0..rule.components.len())
                .map(|_| self.next_alias("c"))
                .collect();

            let mut sql = format!("EXISTS (SELECT 1 FROM index_rows {}", aliases[0]);
            for alias in &aliases[1..] {
                sql.push_str(&format!(
                    " JOIN index_rows {a} ON {a}.doc_type = {first}.doc_type \
                     AND {a}.doc_id = {first}.doc_id AND {a}.occurrence = {first}.occurrence",
                    a = alias,
                    first = aliases[0],
                ));
            }
            sql.push_str(&format!(
                " WHERE {first}.doc_type = ? AND {first}.doc_id = d.id",
                first = aliases[0]
            ));
            let mut params = vec![SqlParam::Text(self.doc_type.to_string())];

            for ((component, alias), part) in
                rule.components.iter().zip(&aliases).zip(&parts)
            {
                let component_value = QueryValue::parse(part);
                if !component_value.comparator.is_valid_for(component.kind) {
                    return Err(SearchError::InvalidValue {
                        parameter: component.name.clone(),
                        message: format!(
                            "comparator '{}' not valid for {} component",
                            component_value.comparator, component.kind
                        ),
                    }
                    .into());
                }
                let matched =
                    self.value_match(alias, component.kind, None, &component_value, &component.name)?;
                sql.push_str(&format!(" AND {}.parameter = ? AND ({})", alias, matched.sql));
                params.push(SqlParam::Text(component.name.clone()));
                params.extend(matched.params);
            }
            sql.push(')');
            alternatives.push(Fragment::new(sql, params));
        }

        Ok(Fragment::or_join(alternatives))
    }

    /// ORs the value matches of a predicate for one row alias.
    pub(super) fn value_matches(
        &mut self,
        alias: &str,
        kind: ParamKind,
        predicate: &Predicate,
    ) -> StoreResult<Fragment> {
        let mut alternatives = Vec::new();
        for value in &predicate.values {
            if !value.comparator.is_valid_for(kind) {
                return Err(SearchError::InvalidValue {
                    parameter: predicate.parameter.clone(),
                    message: format!(
                        "comparator '{}' not valid for {} parameters",
                        value.comparator, kind
                    ),
                }
                .into());
            }
            alternatives.push(self.value_match(
                alias,
                kind,
                predicate.modifier,
                value,
                &predicate.parameter,
            )?);
        }
        Ok(Fragment::or_join(alternatives))
    }

    /// One value's match condition against one `index_rows` alias.
    fn value_match(
        &mut self,
        alias: &str,
        kind: ParamKind,
        modifier: Option<Modifier>,
        value: &QueryValue,
        parameter: &str,
    ) -> StoreResult<Fragment> {
        let fragment = match kind {
            ParamKind::String => match modifier {
                Some(Modifier::Exact) => Fragment::new(
                    format!("{}.value_string = ?", alias),
                    vec![SqlParam::Text(value.value.clone())],
                ),
                Some(Modifier::Contains) => Fragment::new(
                    format!("{}.value_string LIKE ? ESCAPE '\\'", alias),
                    vec![SqlParam::Text(format!("%{}%", escape_like(&value.value)))],
                ),
                _ => Fragment::new(
                    format!("{}.value_string = ? COLLATE NOCASE", alias),
                    vec![SqlParam::Text(value.value.clone())],
                ),
            },
            ParamKind::Number => {
                let number: f64 = value.value.parse().map_err(|_| SearchError::InvalidValue {
                    parameter: parameter.to_string(),
                    message: format!("expected a number, got '{}'", value.value),
                })?;
                let op = comparator_op(value.comparator);
                Fragment::new(
                    format!("{}.value_number {} ?", alias, op),
                    vec![SqlParam::Float(number)],
                )
            }
            ParamKind::Date => {
                let (start, end) =
                    date_range(&value.value).map_err(|message| SearchError::InvalidValue {
                        parameter: parameter.to_string(),
                        message,
                    })?;
                let (start, end) = (format_ts(start), format_ts(end));
                // Stored values are intervals too; a bare month matches
                // anything overlapping the month.
                match value.comparator {
                    Comparator::Eq => Fragment::new(
                        format!(
                            "{a}.value_date_start < ? AND {a}.value_date_end > ?",
                            a = alias
                        ),
                        vec![SqlParam::Text(end), SqlParam::Text(start)],
                    ),
                    Comparator::Ne => Fragment::new(
                        format!(
                            "NOT ({a}.value_date_start < ? AND {a}.value_date_end > ?)",
                            a = alias
                        ),
                        vec![SqlParam::Text(end), SqlParam::Text(start)],
                    ),
                    Comparator::Gt => Fragment::new(
                        format!("{}.value_date_end > ?", alias),
                        vec![SqlParam::Text(end)],
                    ),
                    Comparator::Lt => Fragment::new(
                        format!("{}.value_date_start < ?", alias),
                        vec![SqlParam::Text(start)],
                    ),
                    Comparator::Ge => Fragment::new(
                        format!("{}.value_date_end > ?", alias),
                        vec![SqlParam::Text(start)],
                    ),
                    Comparator::Le => Fragment::new(
                        format!("{}.value_date_start < ?", alias),
                        vec![SqlParam::Text(end)],
                    ),
                }
            }
            ParamKind::Token => match value.value.split_once('|') {
                None => Fragment::new(
                    format!("{}.value_token_code = ?", alias),
                    vec![SqlParam::Text(value.value.clone())],
                ),
                Some(("", code)) => Fragment::new(
                    format!(
                        "{a}.value_token_code = ? AND {a}.value_token_system IS NULL",
                        a = alias
                    ),
                    vec![SqlParam::Text(code.to_string())],
                ),
                Some((system, code)) => Fragment::new(
                    format!(
                        "{a}.value_token_code = ? AND {a}.value_token_system = ?",
                        a = alias
                    ),
                    vec![
                        SqlParam::Text(code.to_string()),
                        SqlParam::Text(system.to_string()),
                    ],
                ),
            },
            ParamKind::Reference => match CanonicalRef::normalize(&value.value) {
                CanonicalRef::Typed { doc_type, id } => Fragment::new(
                    format!(
                        "{a}.value_ref_id = ? AND ({a}.value_ref_type IS NULL OR {a}.value_ref_type = ?)",
                        a = alias
                    ),
                    vec![SqlParam::Text(id), SqlParam::Text(doc_type)],
                ),
                // An id-only query matches any stored reference with that
                // id, typed or not.
                CanonicalRef::Untyped { id } => Fragment::new(
                    format!("{}.value_ref_id = ?", alias),
                    vec![SqlParam::Text(id)],
                ),
            },
            ParamKind::Composite => {
                return Err(SearchError::InvalidValue {
                    parameter: parameter.to_string(),
                    message: "composite parameters cannot be matched here".to_string(),
                }
                .into());
            }
        };
        Ok(fragment)
    }

    /// Builds the ORDER BY clause (without the keyword).
    pub fn order_by(&mut self, query: &Query) -> StoreResult<Fragment> {
        if query.sort.is_empty() {
            return Ok(Fragment::new("d.updated_at DESC, d.id ASC", Vec::new()));
        }

        let mut sql = String::new();
        let mut params = Vec::new();
        for sort in &query.sort {
            let direction = match sort.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            match sort.parameter.as_str() {
                "_lastUpdated" => sql.push_str(&format!("d.updated_at {}, ", direction)),
                "_id" => sql.push_str(&format!("d.id {}, ", direction)),
                parameter => {
                    let kind = self.kind_of(parameter)?;
                    let column = sort_column(kind).ok_or_else(|| SearchError::InvalidValue {
                        parameter: parameter.to_string(),
                        message: "cannot sort by a composite parameter".to_string(),
                    })?;
                    let alias = self.next_alias("s");
                    sql.push_str(&format!(
                        "(SELECT MIN({a}.{col}) FROM index_rows {a} \
                         WHERE {a}.doc_type = d.doc_type AND {a}.doc_id = d.id \
                         AND {a}.parameter = ?) {dir}, ",
                        a = alias,
                        col = column,
                        dir = direction,
                    ));
                    params.push(SqlParam::Text(parameter.to_string()));
                }
            }
        }
        sql.push_str("d.id ASC");
        Ok(Fragment::new(sql, params))
    }

    pub(super) fn kind_of(&self, parameter: &str) -> StoreResult<ParamKind> {
        self.registry
            .kind_of(self.doc_type, parameter)
            .ok_or_else(|| {
                SearchError::UnknownParameter {
                    doc_type: self.doc_type.to_string(),
                    parameter: parameter.to_string(),
                }
                .into()
            })
    }

    pub(super) fn check_modifier(
        &self,
        parameter: &str,
        kind: ParamKind,
        modifier: Option<Modifier>,
    ) -> StoreResult<()> {
        if let Some(modifier) = modifier {
            if !modifier.is_valid_for(kind) {
                return Err(SearchError::InvalidModifier {
                    parameter: parameter.to_string(),
                    modifier: modifier.to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

fn comparator_op(comparator: Comparator) -> &'static str {
    match comparator {
        Comparator::Eq => "=",
        Comparator::Ne => "<>",
        Comparator::Gt => ">",
        Comparator::Lt => "<",
        Comparator::Ge => ">=",
        Comparator::Le => "<=",
    }
}

fn sort_column(kind: ParamKind) -> Option<&'static str> {
    match kind {
        ParamKind::String => Some("value_string"),
        ParamKind::Number => Some("value_number"),
        ParamKind::Date => Some("value_date_start"),
        ParamKind::Token => Some("value_token_code"),
        ParamKind::Reference => Some("value_ref_id"),
        ParamKind::Composite => None,
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl SearchProvider for SqliteStore {
    async fn search(&self, query: &Query) -> StoreResult<SearchSet> {
        let conn = self.connection()?;
        let mut planner = Planner::new(
            &query.doc_type,
            self.registry(),
            self.config().max_chain_depth,
        );

        let conditions = planner.conditions(query)?;
        let order_by = planner.order_by(query)?;

        let mut where_sql = String::from("d.doc_type = ? AND d.deleted = 0");
        let mut where_params = vec![SqlParam::Text(query.doc_type.clone())];
        for condition in conditions {
            where_sql.push_str(" AND (");
            where_sql.push_str(&condition.sql);
            where_sql.push(')');
            where_params.extend(condition.params);
        }

        let count_sql = format!("SELECT COUNT(*) FROM documents d WHERE {}", where_sql);
        let total: i64 = conn.query_row(
            &count_sql,
            params_from_iter(where_params.iter()),
            |row| row.get(0),
        )?;

        let limit = self.config().page_size(query.limit);
        let offset = query.offset.unwrap_or(0);
        let page_sql = format!(
            "SELECT d.doc_type, d.id, d.version, d.body, d.updated_at \
             FROM documents d WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            where_sql, order_by.sql,
        );

        let mut page_params = where_params;
        page_params.extend(order_by.params);
        page_params.push(SqlParam::Int(limit as i64));
        page_params.push(SqlParam::Int(offset as i64));

        let mut stmt = conn.prepare(&page_sql)?;
        let rows = stmt.query_map(params_from_iter(page_params.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (doc_type, id, version, body, updated_at) = row?;
            documents.push(document_from_parts(
                &doc_type, &id, version, &body, &updated_at, false,
            )?);
        }

        let included = self.resolve_includes(&conn, query, &documents)?;

        tracing::debug!(
            doc_type = %query.doc_type,
            predicates = query.predicates.len(),
            total,
            page = documents.len(),
            "search executed"
        );

        Ok(SearchSet {
            documents,
            included,
            total: total as u64,
        })
    }
}

impl SqliteStore {
    fn resolve_includes(
        &self,
        conn: &Connection,
        query: &Query,
        documents: &[Document],
    ) -> StoreResult<Vec<Document>> {
        if query.includes.is_empty() || documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen: HashSet<(String, String)> = documents
            .iter()
            .map(|d| (d.doc_type().to_string(), d.id().to_string()))
            .collect();
        let mut included = Vec::new();

        for include in &query.includes {
            self.validate_include(&query.doc_type, include)?;
            for document in documents {
                let mut stmt = conn.prepare_cached(
                    "SELECT value_ref_type, value_ref_id FROM index_rows
                     WHERE doc_type = ?1 AND doc_id = ?2 AND parameter = ?3
                       AND kind = 'reference'",
                )?;
                let targets: Vec<(Option<String>, String)> = stmt
                    .query_map(
                        params![document.doc_type(), document.id(), include.parameter],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )?
                    .collect::<Result<_, _>>()?;

                for (ref_type, ref_id) in targets {
                    for resolved in fetch_targets(conn, ref_type.as_deref(), &ref_id)? {
                        if let Some(filter) = &include.target_type {
                            if resolved.doc_type() != filter {
                                continue;
                            }
                        }
                        let key = (resolved.doc_type().to_string(), resolved.id().to_string());
                        if seen.insert(key) {
                            included.push(resolved);
                        }
                    }
                }
            }
        }

        Ok(included)
    }

    fn validate_include(&self, doc_type: &str, include: &Include) -> StoreResult<()> {
        match self.registry().kind_of(doc_type, &include.parameter) {
            Some(ParamKind::Reference) => Ok(()),
            Some(_) => Err(SearchError::InvalidValue {
                parameter: include.parameter.clone(),
                message: "include requires a reference parameter".to_string(),
            }
            .into()),
            None => Err(SearchError::UnknownParameter {
                doc_type: doc_type.to_string(),
                parameter: include.parameter.clone(),
            }
            .into()),
        }
    }
}

/// Fetches the live documents a stored reference can point at. A typed
/// reference resolves to one key; an untyped one conservatively resolves to
/// every live document with that id, regardless of type.
fn fetch_targets(
    conn: &Connection,
    ref_type: Option<&str>,
    ref_id: &str,
) -> StoreResult<Vec<Document>> {
    let mut documents = Vec::new();
    match ref_type {
        Some(doc_type) => {
            let mut stmt = conn.prepare_cached(
                "SELECT version, body, updated_at FROM documents
                 WHERE doc_type = ?1 AND id = ?2 AND deleted = 0",
            )?;
            let rows: Vec<(i64, Vec<u8>, String)> = stmt
                .query_map(params![doc_type, ref_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<_, _>>()?;
            for (version, body, updated_at) in rows {
                documents.push(document_from_parts(
                    doc_type, ref_id, version, &body, &updated_at, false,
                )?);
            }
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT doc_type, version, body, updated_at FROM documents
                 WHERE id = ?1 AND deleted = 0",
            )?;
            let rows: Vec<(String, i64, Vec<u8>, String)> = stmt
                .query_map(params![ref_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<_, _>>()?;
            for (doc_type, version, body, updated_at) in rows {
                documents.push(document_from_parts(
                    &doc_type, ref_id, version, &body, &updated_at, false,
                )?);
            }
        }
    }
    Ok(documents)
}
