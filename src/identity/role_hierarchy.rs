use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A role in the role forest. Roles form a forest via `parent_role_id`;
/// role A dominates role B iff A is an ancestor of B (or A == B) in this
/// forest.
#[derive(Debug, Clone, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub parent_role_id: Option<Uuid>,
}

#[derive(Default)]
struct Snapshot {
    roles: HashMap<Uuid, Role>,
    by_name: HashMap<String, Uuid>,
}

/// Process-scoped, atomically-swappable snapshot of the role forest:
/// invalidated atomically on structural changes, so readers never see a
/// partially-rebuilt forest.
#[derive(Clone)]
pub struct RoleHierarchy {
    inner: Arc<RwLock<Arc<Snapshot>>>,
}

impl RoleHierarchy {
    /// Loads the full role forest once at startup.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let roles = sqlx::query_as::<_, Role>("SELECT id, name, parent_role_id FROM roles")
            .fetch_all(pool)
            .await?;
        Ok(Self::from_roles(roles))
    }

    pub fn from_roles(roles: Vec<Role>) -> Self {
        let mut snapshot = Snapshot::default();
        for role in roles {
            snapshot.by_name.insert(role.name.clone(), role.id);
            snapshot.roles.insert(role.id, role);
        }
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    /// Rebuilds the snapshot wholesale and swaps it in atomically.
    pub async fn invalidate(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        let roles = sqlx::query_as::<_, Role>("SELECT id, name, parent_role_id FROM roles")
            .fetch_all(pool)
            .await?;
        let mut snapshot = Snapshot::default();
        for role in roles {
            snapshot.by_name.insert(role.name.clone(), role.id);
            snapshot.roles.insert(role.id, role);
        }
        *self.inner.write().expect("role hierarchy lock poisoned") = Arc::new(snapshot);
        Ok(())
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.read().expect("role hierarchy lock poisoned").clone()
    }

    pub fn by_name(&self, name: &str) -> Option<Uuid> {
        self.snapshot().by_name.get(name).copied()
    }

    /// `role` itself plus every ancestor up to the forest root. Any role in
    /// this list dominates `role`.
    pub fn ancestors(&self, role: Uuid) -> Vec<Uuid> {
        let snapshot = self.snapshot();
        let mut result = vec![role];
        let mut current = snapshot.roles.get(&role).and_then(|r| r.parent_role_id);
        let mut visited = std::collections::HashSet::from([role]);
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            result.push(id);
            current = snapshot.roles.get(&id).and_then(|r| r.parent_role_id);
        }
        result
    }

    /// Role `a` dominates role `b` iff `a` is an ancestor of `b` (or equal),
    /// walking the forest up from `b`. Dominance is transitive and acyclic.
    pub fn dominates(&self, a: Uuid, b: Uuid) -> bool {
        if a == b {
            return true;
        }
        let snapshot = self.snapshot();
        let mut current = snapshot.roles.get(&b).and_then(|r| r.parent_role_id);
        let mut visited = std::collections::HashSet::new();
        while let Some(id) = current {
            if id == a {
                return true;
            }
            if !visited.insert(id) {
                // cycle guard: a well-formed forest never reaches this.
                break;
            }
            current = snapshot.roles.get(&id).and_then(|r| r.parent_role_id);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest() -> RoleHierarchy {
        // superadmin -> admin -> user
        let superadmin = Uuid::from_u128(1);
        let admin = Uuid::from_u128(2);
        let user = Uuid::from_u128(3);
        RoleHierarchy::from_roles(vec![
            Role { id: superadmin, name: "superadmin".into(), parent_role_id: None },
            Role { id: admin, name: "admin".into(), parent_role_id: Some(superadmin) },
            Role { id: user, name: "user".into(), parent_role_id: Some(admin) },
        ])
    }

    #[test]
    fn ancestor_dominates_descendant() {
        let h = forest();
        let superadmin = h.by_name("superadmin").unwrap();
        let user = h.by_name("user").unwrap();
        assert!(h.dominates(superadmin, user));
        assert!(!h.dominates(user, superadmin));
    }

    #[test]
    fn role_dominates_itself() {
        let h = forest();
        let admin = h.by_name("admin").unwrap();
        assert!(h.dominates(admin, admin));
    }

    #[test]
    fn unrelated_roles_do_not_dominate() {
        let h = RoleHierarchy::from_roles(vec![
            Role { id: Uuid::from_u128(1), name: "a".into(), parent_role_id: None },
            Role { id: Uuid::from_u128(2), name: "b".into(), parent_role_id: None },
        ]);
        assert!(!h.dominates(Uuid::from_u128(1), Uuid::from_u128(2)));
    }
}
