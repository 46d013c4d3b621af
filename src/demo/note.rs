use crate::error::EngineError;
use crate::pipeline::entity::{EntityDescription, PermissionReference};
use crate::pipeline::{EntityRecord, SearchClause, Validator};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A minimal managed entity kind demonstrating the pipeline end to end:
/// a user- or team-owned note with an optional permission reference to a
/// parent note (for testing reference inheritance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: Uuid,
    #[serde(default = "Uuid::nil")]
    pub created_by: Uuid,
    #[serde(default)]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub updated_by: Option<Uuid>,
    #[serde(default)]
    pub deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub deleted_by: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub team_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub done: bool,
}

impl EntityRecord for Note {
    fn kind() -> &'static str {
        "note"
    }
}

pub fn description() -> EntityDescription {
    EntityDescription {
        kind: Note::kind(),
        system: false,
        user_owned: true,
        team_owned: true,
        permission_references: vec![PermissionReference { name: "parent_note", target_kind: "note" }],
        create_permission_reference: None,
    }
}

pub struct TitleNotEmpty;

impl Validator<Note> for TitleNotEmpty {
    fn validate(&self, draft: &Note) -> Result<(), EngineError> {
        if draft.title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty".into()));
        }
        Ok(())
    }
}

/// `unfinished -> {done: is_true(false)}`.
pub fn unfinished_transformer(_args: &serde_json::Value) -> Result<Vec<(String, SearchClause)>, EngineError> {
    Ok(vec![("done".to_string(), SearchClause::IsTrue(false))])
}
