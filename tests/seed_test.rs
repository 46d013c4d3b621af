use entity_engine_core::seed::{seed_all, seed_id, SeedEntry};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

fn entries() -> Vec<SeedEntry> {
    vec![
        SeedEntry {
            id: seed_id(1),
            attributes: serde_json::json!({ "name": "openai" }),
            user_id: None,
            team_id: None,
            permission_references: HashMap::new(),
        },
        SeedEntry {
            id: seed_id(2),
            attributes: serde_json::json!({ "name": "anthropic" }),
            user_id: None,
            team_id: None,
            permission_references: HashMap::new(),
        },
    ]
}

#[sqlx::test]
async fn seeding_twice_leaves_row_count_unchanged(pool: PgPool) {
    let system = Uuid::new_v4();

    let first = seed_all(&pool, system, &[("provider", entries())]).await.expect("first seed");
    assert_eq!(first, 2);

    let second = seed_all(&pool, system, &[("provider", entries())]).await.expect("second seed");
    assert_eq!(second, 0);

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM entities WHERE kind = 'provider'")
        .fetch_one(&pool)
        .await
        .expect("count");
    assert_eq!(count, 2);
}
