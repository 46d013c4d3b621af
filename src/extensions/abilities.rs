use crate::error::EngineError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A named async callable an extension exposes. Boxed to allow a uniform
/// registry across extensions with
/// unrelated argument/return shapes; callers agree on the JSON contract
/// out of band (transport layers translate typed requests into this
/// shape before invoking).
pub type Ability = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, AbilityError>> + Send>>
        + Send
        + Sync,
>;

#[derive(Debug, thiserror::Error)]
pub enum AbilityError {
    #[error("no ability '{name}' registered for extension '{ext_id}'")]
    NotFound { ext_id: String, name: String },
    #[error("capability denied: {0}")]
    Denied(String),
    #[error("ability failed: {0}")]
    Runtime(String),
}

impl From<AbilityError> for EngineError {
    fn from(err: AbilityError) -> Self {
        match err {
            AbilityError::NotFound { ext_id, name } => {
                EngineError::not_found("ability", format!("{ext_id}/{name}"))
            }
            AbilityError::Denied(reason) => EngineError::PermissionDenied(reason),
            AbilityError::Runtime(reason) => EngineError::Internal(reason),
        }
    }
}

/// Registry of `(extension_id, ability_name) -> Ability` populated during
/// extension initialization.
#[derive(Default, Clone)]
pub struct AbilityRegistry {
    table: HashMap<(String, String), Ability>,
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ext_id: impl Into<String>, name: impl Into<String>, ability: Ability) {
        self.table.insert((ext_id.into(), name.into()), ability);
    }

    pub async fn execute_ability(
        &self,
        ext_id: &str,
        name: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, AbilityError> {
        let ability = self.table.get(&(ext_id.to_string(), name.to_string())).ok_or_else(|| {
            AbilityError::NotFound { ext_id: ext_id.to_string(), name: name.to_string() }
        })?;
        ability(args).await
    }
}
