use entity_engine_core::identity::{Principal, Role, RoleHierarchy, SystemIds, Team, TeamHierarchy};
use entity_engine_core::permission::PermissionEngine;
use entity_engine_core::pipeline::{EntityDescription, HookRegistry, KindRegistry, PermissionReference};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub const ROOT: Uuid = Uuid::from_u128(1);
pub const SYSTEM: Uuid = Uuid::from_u128(2);
pub const TEMPLATE: Uuid = Uuid::from_u128(3);

pub struct Harness {
    pub pool: PgPool,
    pub system_ids: SystemIds,
    pub roles: RoleHierarchy,
    pub teams: TeamHierarchy,
    pub permissions: Arc<PermissionEngine>,
    pub hooks: Arc<HookRegistry>,
    pub role_user: Uuid,
    pub role_admin: Uuid,
    pub team_parent: Uuid,
    pub team_child: Uuid,
}

/// Builds a fixed two-role, two-team fixture ("user" dominated by
/// "admin", "team_child" nested under "team_parent") and a permission
/// engine wired against it, with `note` and `provider` kinds registered
/// (the latter flagged `system` to exercise rule (c)).
pub async fn harness(pool: PgPool) -> Harness {
    let role_admin = Uuid::new_v4();
    let role_user = Uuid::new_v4();
    let roles = RoleHierarchy::from_roles(vec![
        Role { id: role_admin, name: "admin".to_string(), parent_role_id: None },
        Role { id: role_user, name: "user".to_string(), parent_role_id: Some(role_admin) },
    ]);

    let team_parent = Uuid::new_v4();
    let team_child = Uuid::new_v4();
    let teams = TeamHierarchy::from_teams(
        vec![
            Team { id: team_parent, parent_team_id: None },
            Team { id: team_child, parent_team_id: Some(team_parent) },
        ],
        5,
    );

    let system_ids = SystemIds { root: ROOT, system: SYSTEM, template: TEMPLATE };

    let mut kinds = KindRegistry::new();
    kinds
        .register(EntityDescription {
            kind: "note",
            system: false,
            user_owned: true,
            team_owned: true,
            permission_references: vec![PermissionReference { name: "parent_note", target_kind: "note" }],
            create_permission_reference: None,
        })
        .unwrap();
    kinds
        .register(EntityDescription {
            kind: "provider",
            system: true,
            user_owned: false,
            team_owned: false,
            permission_references: vec![],
            create_permission_reference: None,
        })
        .unwrap();
    let kinds = Arc::new(kinds);

    insert_role_row(&pool, role_admin, "admin", None).await;
    insert_role_row(&pool, role_user, "user", Some(role_admin)).await;
    insert_team_row(&pool, team_parent, None).await;
    insert_team_row(&pool, team_child, Some(team_parent)).await;

    let permissions =
        Arc::new(PermissionEngine::new(pool.clone(), system_ids, roles.clone(), teams.clone(), kinds));
    let hooks = Arc::new(HookRegistry::new());

    Harness {
        pool,
        system_ids,
        roles,
        teams,
        permissions,
        hooks,
        role_user,
        role_admin,
        team_parent,
        team_child,
    }
}

pub fn principal() -> Principal {
    Principal(Uuid::new_v4())
}

pub async fn add_membership(pool: &PgPool, principal: Uuid, team: Uuid, role: Uuid) {
    sqlx::query(
        "INSERT INTO team_memberships (principal_id, team_id, role_id, enabled, expires_at) \
         VALUES ($1, $2, $3, true, NULL)",
    )
    .bind(principal)
    .bind(team)
    .bind(role)
    .execute(pool)
    .await
    .expect("insert membership");
}

pub async fn insert_role_row(pool: &PgPool, id: Uuid, name: &str, parent: Option<Uuid>) {
    sqlx::query("INSERT INTO roles (id, name, parent_role_id) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(name)
        .bind(parent)
        .execute(pool)
        .await
        .expect("insert role");
}

pub async fn insert_team_row(pool: &PgPool, id: Uuid, parent: Option<Uuid>) {
    sqlx::query("INSERT INTO teams (id, parent_team_id) VALUES ($1, $2)")
        .bind(id)
        .bind(parent)
        .execute(pool)
        .await
        .expect("insert team");
}

pub async fn grant(
    pool: &PgPool,
    kind: &str,
    resource_id: Uuid,
    subject_type: &str,
    subject_id: Uuid,
    level_column: &str,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
) {
    let sql = format!(
        "INSERT INTO permission_grants \
         (id, resource_kind, resource_id, subject_type, subject_id, {level_column}, expires_at) \
         VALUES ($1, $2, $3, $4, $5, true, $6)"
    );
    sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(kind)
        .bind(resource_id)
        .bind(subject_type)
        .bind(subject_id)
        .bind(expires_at)
        .execute(pool)
        .await
        .expect("insert grant");
}
