//! Idempotent seeding of system entities, keyed by a declared id drawn
//! from a reserved UUID range so seeded records are recognizable apart
//! from user-created ones.

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

/// A single declarative seed row for one entity kind.
#[derive(Debug, Clone)]
pub struct SeedEntry {
    pub id: Uuid,
    pub attributes: Value,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub permission_references: HashMap<String, Uuid>,
}

/// Reserved id range marker: every byte of the UUID's top 16 hex digits
/// set to `f`. Kinds build their seed ids from this prefix plus a small
/// per-row suffix so seeded rows are visually distinguishable from
/// user-created ones without a dedicated column.
pub const SEED_ID_PREFIX: &str = "ffffffff-ffff-ffff-ffff-";

pub fn seed_id(suffix: u64) -> Uuid {
    Uuid::parse_str(&format!("{SEED_ID_PREFIX}{suffix:012x}")).expect("well-formed reserved seed id")
}

/// Inserts `entries` for `kind`, in the order given (callers supply kinds
/// in foreign-key dependency order). `ON CONFLICT (id) DO NOTHING` makes
/// reseeding produce no duplicates.
pub async fn seed_kind(
    pool: &PgPool,
    kind: &str,
    system_principal: Uuid,
    entries: &[SeedEntry],
) -> Result<u64, sqlx::Error> {
    let now = Utc::now();
    let mut inserted = 0u64;
    for entry in entries {
        let refs = serde_json::to_value(&entry.permission_references).unwrap_or(Value::Null);
        let result = sqlx::query(
            "INSERT INTO entities \
             (id, kind, created_at, created_by, user_id, team_id, permission_references, attributes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(entry.id)
        .bind(kind)
        .bind(now)
        .bind(system_principal)
        .bind(entry.user_id)
        .bind(entry.team_id)
        .bind(refs)
        .bind(&entry.attributes)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Runs `seed_kind` for each `(kind, entries)` pair in order.
pub async fn seed_all(
    pool: &PgPool,
    system_principal: Uuid,
    kinds: &[(&str, Vec<SeedEntry>)],
) -> Result<u64, sqlx::Error> {
    let mut total = 0u64;
    for (kind, entries) in kinds {
        total += seed_kind(pool, kind, system_principal, entries).await?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_ids_are_in_the_reserved_range() {
        let id = seed_id(1);
        assert!(id.to_string().starts_with("ffffffff-ffff-ffff-ffff-"));
        let other = seed_id(2);
        assert_ne!(id, other);
    }
}
