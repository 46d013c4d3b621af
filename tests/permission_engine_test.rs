mod common;

use chrono::{Duration, Utc};
use common::{add_membership, grant, harness, principal, ROOT, SYSTEM, TEMPLATE};
use entity_engine_core::identity::Principal;
use entity_engine_core::permission::AccessLevel;
use entity_engine_core::pipeline::Owner;
use sqlx::PgPool;
use uuid::Uuid;

async fn insert_entity(
    pool: &PgPool,
    kind: &str,
    id: Uuid,
    created_by: Uuid,
    user_id: Option<Uuid>,
    team_id: Option<Uuid>,
) {
    sqlx::query(
        "INSERT INTO entities (id, kind, created_at, created_by, user_id, team_id, permission_references, attributes) \
         VALUES ($1, $2, now(), $3, $4, $5, '{}', '{}')",
    )
    .bind(id)
    .bind(kind)
    .bind(created_by)
    .bind(user_id)
    .bind(team_id)
    .execute(pool)
    .await
    .expect("insert entity");
}

#[sqlx::test]
async fn system_kind_is_protected_above_view(pool: PgPool) {
    let h = harness(pool.clone()).await;
    let provider_id = Uuid::new_v4();
    insert_entity(&pool, "provider", provider_id, SYSTEM, None, None).await;

    let ordinary = principal();
    let view = h.permissions.check(ordinary, "provider", provider_id, AccessLevel::View).await.unwrap();
    assert!(view.is_granted());

    let edit = h.permissions.check(ordinary, "provider", provider_id, AccessLevel::Edit).await.unwrap();
    assert!(!edit.is_granted());

    let root_edit = h.permissions.check(Principal(ROOT), "provider", provider_id, AccessLevel::Edit).await.unwrap();
    assert!(root_edit.is_granted());
}

#[sqlx::test]
async fn template_owned_record_bypasses_view_but_not_edit(pool: PgPool) {
    let h = harness(pool.clone()).await;
    let note_id = Uuid::new_v4();
    insert_entity(&pool, "note", note_id, TEMPLATE, None, None).await;

    let ordinary = principal();
    let view = h.permissions.check(ordinary, "note", note_id, AccessLevel::View).await.unwrap();
    assert!(view.is_granted());

    let edit = h.permissions.check(ordinary, "note", note_id, AccessLevel::Edit).await.unwrap();
    assert!(!edit.is_granted());
}

#[sqlx::test]
async fn team_membership_in_ancestor_team_grants_access_to_descendant_team_record(pool: PgPool) {
    let h = harness(pool.clone()).await;
    let note_id = Uuid::new_v4();
    let author = principal();
    insert_entity(&pool, "note", note_id, author.id(), None, Some(h.team_child)).await;

    let teammate = principal();
    add_membership(&pool, teammate.id(), h.team_parent, h.role_user).await;

    let outcome = h.permissions.check(teammate, "note", note_id, AccessLevel::View).await.unwrap();
    assert!(outcome.is_granted());
}

#[sqlx::test]
async fn edit_requires_a_role_dominating_admin(pool: PgPool) {
    let h = harness(pool.clone()).await;
    let note_id = Uuid::new_v4();
    let author = principal();
    insert_entity(&pool, "note", note_id, author.id(), None, Some(h.team_child)).await;

    let plain_user = principal();
    add_membership(&pool, plain_user.id(), h.team_child, h.role_user).await;
    let denied = h.permissions.check(plain_user, "note", note_id, AccessLevel::Edit).await.unwrap();
    assert!(!denied.is_granted());

    let admin = principal();
    add_membership(&pool, admin.id(), h.team_child, h.role_admin).await;
    let granted = h.permissions.check(admin, "note", note_id, AccessLevel::Edit).await.unwrap();
    assert!(granted.is_granted());
}

#[sqlx::test]
async fn expired_time_limited_grant_does_not_grant(pool: PgPool) {
    let h = harness(pool.clone()).await;
    let note_id = Uuid::new_v4();
    let author = principal();
    insert_entity(&pool, "note", note_id, author.id(), None, None).await;

    let viewer = principal();
    grant(&pool, "note", note_id, "user", viewer.id(), "can_view", Some(Utc::now() - Duration::hours(1))).await;

    let outcome = h.permissions.check(viewer, "note", note_id, AccessLevel::View).await.unwrap();
    assert!(!outcome.is_granted());
}

#[sqlx::test]
async fn active_time_limited_grant_grants_the_declared_level_only(pool: PgPool) {
    let h = harness(pool.clone()).await;
    let note_id = Uuid::new_v4();
    let author = principal();
    insert_entity(&pool, "note", note_id, author.id(), None, None).await;

    let viewer = principal();
    grant(&pool, "note", note_id, "user", viewer.id(), "can_view", Some(Utc::now() + Duration::hours(1))).await;

    let view = h.permissions.check(viewer, "note", note_id, AccessLevel::View).await.unwrap();
    assert!(view.is_granted());
    let edit = h.permissions.check(viewer, "note", note_id, AccessLevel::Edit).await.unwrap();
    assert!(!edit.is_granted());
}

#[sqlx::test]
async fn can_create_requires_view_on_every_reference_and_edit_on_the_named_one(pool: PgPool) {
    let h = harness(pool.clone()).await;
    let parent_id = Uuid::new_v4();
    let owner = principal();
    insert_entity(&pool, "note", parent_id, owner.id(), Some(owner.id()), None).await;

    let mut refs = std::collections::HashMap::new();
    refs.insert("parent_note".to_string(), parent_id);

    let stranger = principal();
    let denied = h.permissions.can_create(stranger, "note", &refs, Owner::default()).await.unwrap();
    assert!(!denied.is_granted());

    let allowed = h.permissions.can_create(owner, "note", &refs, Owner::default()).await.unwrap();
    assert!(allowed.is_granted());
}
