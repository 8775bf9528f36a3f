//! Chained and reverse-chained predicate planning.
//!
//! A forward chain (`child.status=active`) hops through reference index
//! rows: each hop resolves its target type statically from the rule's
//! declared target, and the terminal parameter is evaluated against the
//! referenced document's own index rows. An untyped stored reference still
//! chains — the hop matches on id with the target type constraining the
//! joined rows.
//!
//! A reverse chain joins `reference_edges` filtered to the target document's
//! identity against the pointing document's index rows, so documents are
//! findable through pointers whether or not the pointer field is a declared
//! search parameter.

use crate::error::{SearchError, StoreResult};
use crate::types::{Modifier, ParamKind, Predicate, ReverseChain};

use super::search::{Fragment, Planner, SqlParam};

/// One resolved hop of a forward chain.
struct Hop {
    /// The reference parameter traversed.
    ref_param: String,
    /// The type the hop starts from.
    source_type: String,
    /// The statically resolved target type.
    target_type: String,
}

impl Planner<'_> {
    /// Plans a forward-chained predicate.
    pub(super) fn chain_condition(
        &mut self,
        segments: &[&str],
        predicate: &Predicate,
    ) -> StoreResult<Fragment> {
        let (terminal, hop_params) = segments.split_last().expect("chain has segments");

        if hop_params.len() > self.max_chain_depth {
            return Err(SearchError::ChainTooDeep {
                parameter: predicate.parameter.clone(),
                max: self.max_chain_depth,
            }
            .into());
        }
        if predicate.values.is_empty() {
            return Err(SearchError::InvalidValue {
                parameter: predicate.parameter.clone(),
                message: "at least one value is required".to_string(),
            }
            .into());
        }
        if predicate.modifier == Some(Modifier::Missing) {
            return Err(SearchError::InvalidModifier {
                parameter: predicate.parameter.clone(),
                modifier: Modifier::Missing.to_string(),
            }
            .into());
        }

        // Resolve every hop's target type statically from the rule table.
        let mut hops = Vec::new();
        let mut current_type = self.doc_type.to_string();
        for ref_param in hop_params {
            let rule = self
                .registry
                .rule(&current_type, ref_param)
                .filter(|r| r.kind == ParamKind::Reference)
                .ok_or_else(|| SearchError::UnknownParameter {
                    doc_type: current_type.clone(),
                    parameter: ref_param.to_string(),
                })?;
            let target_type = match rule.targets.as_slice() {
                [single] => single.clone(),
                _ => {
                    return Err(SearchError::AmbiguousChain {
                        parameter: ref_param.to_string(),
                    }
                    .into());
                }
            };
            hops.push(Hop {
                ref_param: ref_param.to_string(),
                source_type: current_type.clone(),
                target_type: target_type.clone(),
            });
            current_type = target_type;
        }

        let terminal_kind = self
            .registry
            .kind_of(&current_type, terminal)
            .ok_or_else(|| SearchError::UnknownParameter {
                doc_type: current_type.clone(),
                parameter: terminal.to_string(),
            })?;
        if terminal_kind == ParamKind::Composite {
            return Err(SearchError::InvalidValue {
                parameter: predicate.parameter.clone(),
                message: "a composite parameter cannot terminate a chain".to_string(),
            }
            .into());
        }
        self.check_modifier(&predicate.parameter, terminal_kind, predicate.modifier)?;

        let terminal_predicate = Predicate {
            parameter: terminal.to_string(),
            modifier: predicate.modifier,
            values: predicate.values.clone(),
        };

        self.hop_fragment(&hops, &current_type, &terminal_predicate, terminal_kind, "d.id")
    }

    fn hop_fragment(
        &mut self,
        hops: &[Hop],
        terminal_type: &str,
        terminal: &Predicate,
        terminal_kind: ParamKind,
        outer_id: &str,
    ) -> StoreResult<Fragment> {
        let Some((hop, rest)) = hops.split_first() else {
            let alias = self.next_alias("t");
            let matches = self.value_matches(&alias, terminal_kind, terminal)?;
            let mut fragment = Fragment::new(
                format!(
                    "EXISTS (SELECT 1 FROM index_rows {a} \
                     WHERE {a}.doc_type = ? AND {a}.doc_id = {outer} \
                     AND {a}.parameter = ? AND ({values}))",
                    a = alias,
                    outer = outer_id,
                    values = matches.sql,
                ),
                vec![
                    SqlParam::Text(terminal_type.to_string()),
                    SqlParam::Text(terminal.parameter.clone()),
                ],
            );
            fragment.params.extend(matches.params);
            return Ok(fragment);
        };

        let alias = self.next_alias("r");
        let inner = self.hop_fragment(
            rest,
            terminal_type,
            terminal,
            terminal_kind,
            &format!("{}.value_ref_id", alias),
        )?;

        let mut fragment = Fragment::new(
            format!(
                "EXISTS (SELECT 1 FROM index_rows {a} \
                 WHERE {a}.doc_type = ? AND {a}.doc_id = {outer} \
                 AND {a}.parameter = ? AND {a}.kind = 'reference' \
                 AND {a}.value_ref_id IS NOT NULL \
                 AND ({a}.value_ref_type IS NULL OR {a}.value_ref_type = ?) \
                 AND ({inner}))",
                a = alias,
                outer = outer_id,
                inner = inner.sql,
            ),
            vec![
                SqlParam::Text(hop.source_type.clone()),
                SqlParam::Text(hop.ref_param.clone()),
                SqlParam::Text(hop.target_type.clone()),
            ],
        );
        fragment.params.extend(inner.params);
        Ok(fragment)
    }

    /// Plans a reverse-chained predicate.
    pub(super) fn reverse_chain_condition(
        &mut self,
        chain: &ReverseChain,
    ) -> StoreResult<Fragment> {
        if chain.values.is_empty() {
            return Err(SearchError::InvalidValue {
                parameter: chain.parameter.clone(),
                message: "at least one value is required".to_string(),
            }
            .into());
        }

        let kind = self
            .registry
            .kind_of(&chain.source_type, &chain.parameter)
            .ok_or_else(|| SearchError::UnknownParameter {
                doc_type: chain.source_type.clone(),
                parameter: chain.parameter.clone(),
            })?;
        if kind == ParamKind::Composite {
            return Err(SearchError::InvalidValue {
                parameter: chain.parameter.clone(),
                message: "a composite parameter cannot filter a reverse chain".to_string(),
            }
            .into());
        }

        // A named reference parameter pins the edge to that rule's field
        // path; without one, any pointer field on the source qualifies.
        let field_path = match &chain.reference_param {
            Some(ref_param) => {
                let rule = self
                    .registry
                    .rule(&chain.source_type, ref_param)
                    .filter(|r| r.kind == ParamKind::Reference)
                    .ok_or_else(|| SearchError::UnknownParameter {
                        doc_type: chain.source_type.clone(),
                        parameter: ref_param.clone(),
                    })?;
                Some(rule.path.to_string())
            }
            None => None,
        };

        let filter = Predicate {
            parameter: chain.parameter.clone(),
            modifier: None,
            values: chain.values.clone(),
        };

        let edge = self.next_alias("e");
        let source = self.next_alias("s");
        let matches = self.value_matches(&source, kind, &filter)?;

        let path_clause = if field_path.is_some() {
            format!(" AND {}.field_path = ?", edge)
        } else {
            String::new()
        };

        let mut fragment = Fragment::new(
            format!(
                "EXISTS (SELECT 1 FROM reference_edges {e} \
                 JOIN index_rows {s} ON {s}.doc_type = {e}.source_type \
                 AND {s}.doc_id = {e}.source_id \
                 WHERE {e}.target_id = d.id \
                 AND ({e}.target_type IS NULL OR {e}.target_type = ?) \
                 AND {e}.source_type = ?{path} \
                 AND {s}.parameter = ? AND ({values}))",
                e = edge,
                s = source,
                path = path_clause,
                values = matches.sql,
            ),
            vec![
                SqlParam::Text(self.doc_type.to_string()),
                SqlParam::Text(chain.source_type.clone()),
            ],
        );
        if let Some(path) = field_path {
            fragment.params.push(SqlParam::Text(path));
        }
        fragment.params.push(SqlParam::Text(chain.parameter.clone()));
        fragment.params.extend(matches.params);
        Ok(fragment)
    }
}
