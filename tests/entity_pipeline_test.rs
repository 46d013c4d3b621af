mod common;

use common::{harness, principal};
use entity_engine_core::pipeline::{
    EntityDescription, EntityRecord, ListParams, Manager, Owner, Projection, TransformerRegistry, Validator,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    #[serde(default)]
    id: Uuid,
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default)]
    team_id: Option<Uuid>,
    title: String,
    #[serde(default)]
    done: bool,
}

impl EntityRecord for Note {
    fn kind() -> &'static str {
        "note"
    }
}

fn manager(h: &common::Harness) -> Manager<Note> {
    Manager::new(
        h.pool.clone(),
        EntityDescription {
            kind: "note",
            system: false,
            user_owned: true,
            team_owned: true,
            permission_references: vec![],
            create_permission_reference: None,
        },
        h.permissions.clone(),
        h.hooks.clone(),
        TransformerRegistry::new(),
        Projection::new(&["id", "title", "done", "user_id", "team_id"], &[]),
        Vec::<Arc<dyn Validator<Note>>>::new(),
    )
}

#[sqlx::test]
async fn create_then_get_round_trips(pool: PgPool) {
    let h = harness(pool).await;
    let mgr = manager(&h);
    let author = principal();

    let draft = Note { id: Uuid::nil(), user_id: Some(author.id()), team_id: None, title: "hi".into(), done: false };
    let created = mgr
        .create(author, draft, HashMap::new(), Owner { user_id: Some(author.id()), team_id: None }, None)
        .await
        .expect("create");

    let fetched = mgr.get(author, created.id, &ListParams::default()).await.expect("get");
    assert_eq!(fetched.title, "hi");
    assert!(!fetched.done);
}

#[sqlx::test]
async fn soft_deleted_record_is_not_found_to_non_root(pool: PgPool) {
    let h = harness(pool).await;
    let mgr = manager(&h);
    let author = principal();

    let draft = Note { id: Uuid::nil(), user_id: Some(author.id()), team_id: None, title: "gone".into(), done: false };
    let created = mgr
        .create(author, draft, HashMap::new(), Owner { user_id: Some(author.id()), team_id: None }, None)
        .await
        .expect("create");

    mgr.delete(author, created.id, None).await.expect("delete");

    let err = mgr.get(author, created.id, &ListParams::default()).await.unwrap_err();
    assert!(matches!(err, entity_engine_core::EngineError::NotFound { .. }));
}

#[sqlx::test]
async fn list_excludes_other_users_private_notes(pool: PgPool) {
    let h = harness(pool).await;
    let mgr = manager(&h);
    let alice = principal();
    let bob = principal();

    mgr.create(
        alice,
        Note { id: Uuid::nil(), user_id: Some(alice.id()), team_id: None, title: "alice's".into(), done: false },
        HashMap::new(),
        Owner { user_id: Some(alice.id()), team_id: None },
        None,
    )
    .await
    .expect("create");

    let seen_by_bob = mgr.list(bob, &ListParams::default()).await.expect("list");
    assert!(seen_by_bob.iter().all(|n| n.title != "alice's"));

    let seen_by_alice = mgr.list(alice, &ListParams::default()).await.expect("list");
    assert!(seen_by_alice.iter().any(|n| n.title == "alice's"));
}

#[sqlx::test]
async fn batch_update_reports_per_item_success_and_failure(pool: PgPool) {
    let h = harness(pool).await;
    let mgr = manager(&h);
    let author = principal();

    let mut ids = Vec::new();
    for i in 0..3 {
        let created = mgr
            .create(
                author,
                Note { id: Uuid::nil(), user_id: Some(author.id()), team_id: None, title: format!("n{i}"), done: false },
                HashMap::new(),
                Owner { user_id: Some(author.id()), team_id: None },
                None,
            )
            .await
            .expect("create");
        ids.push(created.id);
    }
    let missing_id = Uuid::new_v4();

    let mut items: Vec<(Uuid, serde_json::Value)> =
        ids.iter().map(|id| (*id, serde_json::json!({ "done": true }))).collect();
    items.push((missing_id, serde_json::json!({ "done": true })));

    let result = mgr.batch_update(author, items).await;
    assert_eq!(result.succeeded.len(), 3);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].id, missing_id);
    assert!(result.succeeded.iter().all(|n| n.done));

    for id in ids {
        let record = mgr.get(author, id, &ListParams::default()).await.expect("survives failed sibling");
        assert!(record.done);
    }
}

#[sqlx::test]
async fn update_denied_for_non_owner_without_grant(pool: PgPool) {
    let h = harness(pool).await;
    let mgr = manager(&h);
    let author = principal();
    let outsider = principal();

    let created = mgr
        .create(
            author,
            Note { id: Uuid::nil(), user_id: Some(author.id()), team_id: None, title: "private".into(), done: false },
            HashMap::new(),
            Owner { user_id: Some(author.id()), team_id: None },
            None,
        )
        .await
        .expect("create");

    let err = mgr.update(outsider, created.id, serde_json::json!({ "done": true }), None).await.unwrap_err();
    assert!(matches!(err, entity_engine_core::EngineError::NotFound { .. }));
}
