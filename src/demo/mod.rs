//! A minimal managed entity kind ("note") wired through the full pipeline,
//! proving the manager contract is consumable by a transport layer the
//! way the core's external interfaces describe.

pub mod note;
pub mod routes;

use crate::permission::PermissionEngine;
use crate::pipeline::{HookRegistry, Manager, Projection, TransformerRegistry, Validator};
use sqlx::PgPool;
use std::sync::Arc;

pub fn build_notes_manager(pool: PgPool, permissions: Arc<PermissionEngine>, hooks: Arc<HookRegistry>) -> Manager<note::Note> {
    let mut transformers = TransformerRegistry::new();
    transformers.register("unfinished", Arc::new(note::unfinished_transformer));

    let projection = Projection::new(
        &["id", "title", "body", "done", "created_at", "updated_at", "user_id", "team_id"],
        &["parent_note"],
    );

    let validators: Vec<Arc<dyn Validator<note::Note>>> = vec![Arc::new(note::TitleNotEmpty)];

    Manager::new(pool, note::description(), permissions, hooks, transformers, projection, validators)
}
