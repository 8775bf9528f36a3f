//! Typed index values and their JSON conversions.
//!
//! Each extraction rule converts the JSON values its path locates into one
//! of the [`IndexValue`] shapes. Conversion is strict: a value a rule's kind
//! cannot represent is an extraction failure, which rejects the whole write.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reference::CanonicalRef;
use crate::types::ParamKind;

/// A value extracted and converted for the index tables.
///
/// Exactly one shape per row; token values keep their coding-system
/// qualifier distinct from the code, and dates carry the full interval their
/// precision covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexValue {
    /// String value.
    String(String),

    /// Numeric value.
    Number(f64),

    /// Date value, widened to the half-open interval `[start, end)` covered
    /// by its precision ("2020-03" covers the whole month).
    Date {
        /// Inclusive start of the covered interval.
        start: DateTime<Utc>,
        /// Exclusive end of the covered interval.
        end: DateTime<Utc>,
    },

    /// Coded value with an optional coding-system qualifier.
    Token {
        /// Coding system, when the document declares one.
        system: Option<String>,
        /// The code itself.
        code: String,
    },

    /// Canonicalized pointer to another document.
    Reference(CanonicalRef),
}

impl IndexValue {
    /// Returns the kind this value indexes under.
    pub fn kind(&self) -> ParamKind {
        match self {
            IndexValue::String(_) => ParamKind::String,
            IndexValue::Number(_) => ParamKind::Number,
            IndexValue::Date { .. } => ParamKind::Date,
            IndexValue::Token { .. } => ParamKind::Token,
            IndexValue::Reference(_) => ParamKind::Reference,
        }
    }

    /// Converts a located JSON value into index values for the given kind.
    ///
    /// A single hit can produce several values (a coded field with multiple
    /// codings yields one token per coding). Shapes the kind cannot
    /// represent produce an error naming what was found.
    pub fn convert(value: &Value, kind: ParamKind) -> Result<Vec<IndexValue>, String> {
        match kind {
            ParamKind::String => convert_string(value).map(|v| vec![v]),
            ParamKind::Number => convert_number(value).map(|v| vec![v]),
            ParamKind::Date => convert_date(value).map(|v| vec![v]),
            ParamKind::Token => convert_token(value),
            ParamKind::Reference => convert_reference(value).map(|v| vec![v]),
            ParamKind::Composite => {
                Err("composite rules convert through their components".to_string())
            }
        }
    }
}

fn convert_string(value: &Value) -> Result<IndexValue, String> {
    match value {
        Value::String(s) => Ok(IndexValue::String(s.clone())),
        Value::Number(n) => Ok(IndexValue::String(n.to_string())),
        Value::Bool(b) => Ok(IndexValue::String(b.to_string())),
        other => Err(format!("expected a string, found {}", json_kind(other))),
    }
}

fn convert_number(value: &Value) -> Result<IndexValue, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(IndexValue::Number)
            .ok_or_else(|| "number out of range".to_string()),
        Value::String(s) => s
            .parse::<f64>()
            .map(IndexValue::Number)
            .map_err(|_| format!("expected a number, found '{}'", s)),
        other => Err(format!("expected a number, found {}", json_kind(other))),
    }
}

fn convert_date(value: &Value) -> Result<IndexValue, String> {
    match value {
        Value::String(s) => {
            let (start, end) = date_range(s)?;
            Ok(IndexValue::Date { start, end })
        }
        other => Err(format!("expected a date string, found {}", json_kind(other))),
    }
}

fn convert_token(value: &Value) -> Result<Vec<IndexValue>, String> {
    match value {
        Value::String(s) => Ok(vec![IndexValue::Token {
            system: None,
            code: s.clone(),
        }]),
        Value::Bool(b) => Ok(vec![IndexValue::Token {
            system: None,
            code: b.to_string(),
        }]),
        Value::Object(obj) => {
            // Coded shape: { system?, code } — or identifier shape:
            // { system?, value }.
            let system = obj
                .get("system")
                .and_then(|v| v.as_str())
                .map(String::from);
            if let Some(code) = obj.get("code").and_then(|v| v.as_str()) {
                return Ok(vec![IndexValue::Token {
                    system,
                    code: code.to_string(),
                }]);
            }
            if let Some(code) = obj.get("value").and_then(|v| v.as_str()) {
                return Ok(vec![IndexValue::Token {
                    system,
                    code: code.to_string(),
                }]);
            }
            // Concept shape: { coding: [{ system?, code }, ...] }.
            if let Some(codings) = obj.get("coding").and_then(|v| v.as_array()) {
                let mut out = Vec::new();
                for coding in codings {
                    out.extend(convert_token(coding)?);
                }
                return Ok(out);
            }
            Err("expected a coded value (code, value, or coding[])".to_string())
        }
        other => Err(format!("expected a coded value, found {}", json_kind(other))),
    }
}

fn convert_reference(value: &Value) -> Result<IndexValue, String> {
    match value {
        Value::String(s) => Ok(IndexValue::Reference(CanonicalRef::normalize(s))),
        Value::Object(obj) => match obj.get("reference").and_then(|v| v.as_str()) {
            Some(raw) => Ok(IndexValue::Reference(CanonicalRef::normalize(raw))),
            None => Err("expected a pointer object with a 'reference' field".to_string()),
        },
        other => Err(format!("expected a pointer, found {}", json_kind(other))),
    }
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

/// Parses a date string into the half-open UTC interval it covers.
///
/// `2020` covers the year, `2020-03` the month, `2020-03-05` the day, and a
/// full RFC 3339 timestamp covers one second.
pub fn date_range(s: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    let s = s.trim();
    let fail = || format!("unparseable date '{}'", s);

    match s.len() {
        4 => {
            let year: i32 = s.parse().map_err(|_| fail())?;
            let start = ymd_start(year, 1, 1).ok_or_else(fail)?;
            let end = ymd_start(year + 1, 1, 1).ok_or_else(fail)?;
            Ok((start, end))
        }
        7 => {
            let (y, m) = s.split_once('-').ok_or_else(fail)?;
            let year: i32 = y.parse().map_err(|_| fail())?;
            let month: u32 = m.parse().map_err(|_| fail())?;
            let start = ymd_start(year, month, 1).ok_or_else(fail)?;
            let end = next_month(year, month).ok_or_else(fail)?;
            Ok((start, end))
        }
        10 => {
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| fail())?;
            let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).ok_or_else(fail)?);
            let end = start + chrono::Duration::days(1);
            Ok((start, end))
        }
        _ => {
            let instant = DateTime::parse_from_rfc3339(s)
                .map_err(|_| fail())?
                .with_timezone(&Utc);
            Ok((instant, instant + chrono::Duration::seconds(1)))
        }
    }
}

fn ymd_start(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn next_month(year: i32, month: u32) -> Option<DateTime<Utc>> {
    if month == 12 {
        ymd_start(year + 1, 1, 1)
    } else {
        ymd_start(year, month + 1, 1)
    }
}

/// Formats a timestamp the way the storage columns expect it: RFC 3339, UTC,
/// second precision. The fixed format keeps lexicographic and chronological
/// order identical.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses a timestamp written by [`format_ts`] (or any RFC 3339 string).
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("unparseable timestamp '{}': {}", s, e))
}
