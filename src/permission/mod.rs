//! Reference-aware permission engine: a single `check` rule chain
//! consulted by every mutation in the entity pipeline, plus a `filter`
//! used to restrict list/search queries to visible records.

mod engine;
mod models;

pub use engine::{FilterPredicate, PermissionEngine, PermissionError, VisibilityClause};
pub use models::{AccessLevel, DeniedReason, PermissionGrant, PermissionOutcome, RecordMeta, Subject};
