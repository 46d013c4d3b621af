use crate::error::EngineError;
use std::collections::HashSet;

/// Field/relation whitelist a manager declares up front; requests naming
/// anything outside it are rejected before any I/O.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub allowed_fields: HashSet<&'static str>,
    pub allowed_relations: HashSet<&'static str>,
}

impl Projection {
    pub fn new(allowed_fields: &[&'static str], allowed_relations: &[&'static str]) -> Self {
        Self {
            allowed_fields: allowed_fields.iter().copied().collect(),
            allowed_relations: allowed_relations.iter().copied().collect(),
        }
    }

    pub fn validate_fields(&self, requested: &[String]) -> Result<(), EngineError> {
        for field in requested {
            if !self.allowed_fields.contains(field.as_str()) {
                return Err(EngineError::Validation(format!("unknown field '{field}'")));
            }
        }
        Ok(())
    }

    pub fn validate_relations(&self, requested: &[String]) -> Result<(), EngineError> {
        for relation in requested {
            if !self.allowed_relations.contains(relation.as_str()) {
                return Err(EngineError::Validation(format!("unknown relation '{relation}'")));
            }
        }
        Ok(())
    }

    /// Removes keys not present in `requested` (when non-empty); an empty
    /// `requested` list means "no projection, return everything".
    pub fn apply(&self, record: &mut serde_json::Value, requested: &[String]) {
        if requested.is_empty() {
            return;
        }
        if let Some(obj) = record.as_object_mut() {
            let keep: HashSet<&str> = requested.iter().map(String::as_str).collect();
            obj.retain(|key, _| keep.contains(key.as_str()));
        }
    }
}
