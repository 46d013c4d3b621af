use crate::error::EngineError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// One field-level search clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchClause {
    StringInc(String),
    StringSw(String),
    StringEw(String),
    NumEq(f64),
    NumNeq(f64),
    NumLt(f64),
    NumGt(f64),
    NumLteq(f64),
    NumGteq(f64),
    DateBefore(DateTime<Utc>),
    DateAfter(DateTime<Utc>),
    DateOn(DateTime<Utc>),
    IsTrue(bool),
}


/// Parses a transport-neutral search clause shape into a `SearchClause`.
/// Returns `ValidationError` for an unrecognized or malformed shape.
pub fn parse_clause(field: &str, value: &serde_json::Value) -> Result<SearchClause, EngineError> {
    let obj = value.as_object().ok_or_else(|| {
        EngineError::Validation(format!("search clause for '{field}' must be an object"))
    })?;
    let (op, arg) = obj
        .iter()
        .next()
        .ok_or_else(|| EngineError::Validation(format!("search clause for '{field}' is empty")))?;

    let as_str = |v: &serde_json::Value| {
        v.as_str()
            .map(str::to_owned)
            .ok_or_else(|| EngineError::Validation(format!("'{field}.{op}' expects a string")))
    };
    let as_num = |v: &serde_json::Value| {
        v.as_f64()
            .ok_or_else(|| EngineError::Validation(format!("'{field}.{op}' expects a number")))
    };
    let as_date = |v: &serde_json::Value| {
        v.as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| EngineError::Validation(format!("'{field}.{op}' expects an ISO-8601 date")))
    };
    let as_bool = |v: &serde_json::Value| {
        v.as_bool()
            .ok_or_else(|| EngineError::Validation(format!("'{field}.{op}' expects a bool")))
    };

    Ok(match op.as_str() {
        "inc" => SearchClause::StringInc(as_str(arg)?),
        "sw" => SearchClause::StringSw(as_str(arg)?),
        "ew" => SearchClause::StringEw(as_str(arg)?),
        "eq" => SearchClause::NumEq(as_num(arg)?),
        "neq" => SearchClause::NumNeq(as_num(arg)?),
        "lt" => SearchClause::NumLt(as_num(arg)?),
        "gt" => SearchClause::NumGt(as_num(arg)?),
        "lteq" => SearchClause::NumLteq(as_num(arg)?),
        "gteq" => SearchClause::NumGteq(as_num(arg)?),
        "before" => SearchClause::DateBefore(as_date(arg)?),
        "after" => SearchClause::DateAfter(as_date(arg)?),
        "on" => SearchClause::DateOn(as_date(arg)?),
        "is_true" => SearchClause::IsTrue(as_bool(arg)?),
        other => {
            return Err(EngineError::Validation(format!(
                "unknown search operator '{other}' for field '{field}'"
            )))
        }
    })
}

/// A named transformer mapping a high-level search parameter to a set of
/// concrete field clauses, e.g.
/// `overdue -> {scheduled: is_true, completed: is_true(false), due_date: before(now)}`.
/// Applied before the permission filter.
pub type Transformer =
    Arc<dyn Fn(&serde_json::Value) -> Result<Vec<(String, SearchClause)>, EngineError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Transformer>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, transformer: Transformer) {
        self.transformers.insert(name.into(), transformer);
    }

    pub fn get(&self, name: &str) -> Option<&Transformer> {
        self.transformers.get(name)
    }
}
