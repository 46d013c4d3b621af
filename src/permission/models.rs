use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Strictly ordered access levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    View,
    Execute,
    Copy,
    Edit,
    Delete,
    Share,
}

impl AccessLevel {
    /// Default role-to-level table: VIEW/EXECUTE/COPY need at least
    /// `user`; EDIT/DELETE/SHARE need at least `admin`.
    pub fn minimum_role_name(self) -> &'static str {
        match self {
            AccessLevel::View | AccessLevel::Execute | AccessLevel::Copy => "user",
            AccessLevel::Edit | AccessLevel::Delete | AccessLevel::Share => "admin",
        }
    }

    /// Whether a TEMPLATE-owned record grants this level to every
    /// principal: VIEW/EXECUTE/COPY/SHARE bypass, EDIT/DELETE do not.
    pub fn template_bypass(self) -> bool {
        !matches!(self, AccessLevel::Edit | AccessLevel::Delete)
    }

    /// Column on `permission_grants` holding this level's boolean.
    pub fn column_name(self) -> &'static str {
        match self {
            AccessLevel::View => "can_view",
            AccessLevel::Execute => "can_execute",
            AccessLevel::Copy => "can_copy",
            AccessLevel::Edit => "can_edit",
            AccessLevel::Delete => "can_delete",
            AccessLevel::Share => "can_share",
        }
    }

    pub fn grant_flag(self, grant: &PermissionGrant) -> bool {
        match self {
            AccessLevel::View => grant.can_view,
            AccessLevel::Execute => grant.can_execute,
            AccessLevel::Copy => grant.can_copy,
            AccessLevel::Edit => grant.can_edit,
            AccessLevel::Delete => grant.can_delete,
            AccessLevel::Share => grant.can_share,
        }
    }
}

/// Why a check was denied. Kept distinct from the wire-level `EngineError` so
/// the pipeline can decide how to present a denial (e.g. collapsing to
/// `NotFound`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeniedReason {
    NotFound,
    SystemProtected,
    CreatedByRoot,
    InsufficientLevelForSystemCreator,
    InsufficientLevelForTemplateCreator,
    NoGrant,
}

impl std::fmt::Display for DeniedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DeniedReason::NotFound => "not found",
            DeniedReason::SystemProtected => "kind is system-protected",
            DeniedReason::CreatedByRoot => "record owned by root",
            DeniedReason::InsufficientLevelForSystemCreator => {
                "level exceeds what a SYSTEM-created record grants"
            }
            DeniedReason::InsufficientLevelForTemplateCreator => {
                "level exceeds what a TEMPLATE-created record grants"
            }
            DeniedReason::NoGrant => "no applicable grant",
        };
        write!(f, "{msg}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    Granted,
    Denied(DeniedReason),
}

impl PermissionOutcome {
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionOutcome::Granted)
    }
}

/// A subject a `PermissionGrant` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    User(Uuid),
    Team(Uuid),
    Role(Uuid),
}

/// An explicit permission grant on a (kind, record) pair.
#[derive(Debug, Clone)]
pub struct PermissionGrant {
    pub id: Uuid,
    pub resource_kind: String,
    pub resource_id: Uuid,
    pub subject: Subject,
    pub can_view: bool,
    pub can_execute: bool,
    pub can_copy: bool,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_share: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Snapshot of a managed record's access-relevant fields, loaded from the
/// generic entity store. Permission references are resolved to
/// `(name -> target entity id)`.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    pub id: Uuid,
    pub kind: String,
    pub created_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub references: HashMap<String, Uuid>,
}
