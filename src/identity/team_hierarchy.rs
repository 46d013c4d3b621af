use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// A team in the team forest. Teams form a forest via `parent_team_id`;
/// inheritance walks are bounded by `max_depth`.
#[derive(Debug, Clone, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub parent_team_id: Option<Uuid>,
}

/// A principal's membership in a team.
#[derive(Debug, Clone, FromRow)]
pub struct TeamMembership {
    pub principal_id: Uuid,
    pub team_id: Uuid,
    pub role_id: Uuid,
    pub enabled: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TeamMembership {
    /// A membership with `enabled = false` or expired is equivalent to
    /// absent.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[derive(Default)]
struct Snapshot {
    teams: HashMap<Uuid, Team>,
}

/// Process-scoped, atomically-swappable snapshot of the team forest.
#[derive(Clone)]
pub struct TeamHierarchy {
    inner: Arc<RwLock<Arc<Snapshot>>>,
    max_depth: u32,
}

impl TeamHierarchy {
    pub async fn load(pool: &PgPool, max_depth: u32) -> Result<Self, sqlx::Error> {
        let teams = sqlx::query_as::<_, Team>("SELECT id, parent_team_id FROM teams")
            .fetch_all(pool)
            .await?;
        Ok(Self::from_teams(teams, max_depth))
    }

    pub fn from_teams(teams: Vec<Team>, max_depth: u32) -> Self {
        let snapshot = Snapshot {
            teams: teams.into_iter().map(|t| (t.id, t)).collect(),
        };
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
            max_depth,
        }
    }

    pub async fn invalidate(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        let teams = sqlx::query_as::<_, Team>("SELECT id, parent_team_id FROM teams")
            .fetch_all(pool)
            .await?;
        let snapshot = Snapshot {
            teams: teams.into_iter().map(|t| (t.id, t)).collect(),
        };
        *self.inner.write().expect("team hierarchy lock poisoned") = Arc::new(snapshot);
        Ok(())
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.read().expect("team hierarchy lock poisoned").clone()
    }

    /// `team` itself plus its ancestors, up to `max_depth` hops. Parent
    /// chains are assumed acyclic and walks are bounded to this depth.
    pub fn ancestors(&self, team: Uuid) -> Vec<Uuid> {
        let snapshot = self.snapshot();
        let mut result = vec![team];
        let mut current = team;
        let mut visited = std::collections::HashSet::from([team]);
        for _ in 0..self.max_depth {
            match snapshot.teams.get(&current).and_then(|t| t.parent_team_id) {
                Some(parent) if visited.insert(parent) => {
                    result.push(parent);
                    current = parent;
                }
                _ => break,
            }
        }
        result
    }

    /// True iff `candidate` is `team` or one of its ancestors within the
    /// configured depth bound.
    pub fn contains(&self, team: Uuid, candidate: Uuid) -> bool {
        self.ancestors(team).contains(&candidate)
    }

    /// `team` itself plus every known team that has it as an ancestor
    /// (within the depth bound). Used to expand a membership team into the
    /// set of record team_ids it grants access to.
    pub fn descendants(&self, team: Uuid) -> Vec<Uuid> {
        let snapshot = self.snapshot();
        let mut result = vec![team];
        for &candidate in snapshot.teams.keys() {
            if candidate != team && self.contains(candidate, team) {
                result.push(candidate);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_include_self_and_parents() {
        let root = Uuid::from_u128(1);
        let mid = Uuid::from_u128(2);
        let leaf = Uuid::from_u128(3);
        let h = TeamHierarchy::from_teams(
            vec![
                Team { id: root, parent_team_id: None },
                Team { id: mid, parent_team_id: Some(root) },
                Team { id: leaf, parent_team_id: Some(mid) },
            ],
            5,
        );
        assert_eq!(h.ancestors(leaf), vec![leaf, mid, root]);
        assert!(h.contains(leaf, root));
        assert!(!h.contains(root, leaf));
    }

    #[test]
    fn depth_bound_truncates_walk() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let h = TeamHierarchy::from_teams(
            vec![
                Team { id: a, parent_team_id: None },
                Team { id: b, parent_team_id: Some(a) },
                Team { id: c, parent_team_id: Some(b) },
            ],
            1,
        );
        // from c: c, b (1 hop) -- a is beyond the bound.
        assert_eq!(h.ancestors(c), vec![c, b]);
    }

    #[test]
    fn membership_expiry_and_enabled_flag() {
        let now = Utc::now();
        let active = TeamMembership {
            principal_id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            enabled: true,
            expires_at: None,
        };
        assert!(active.is_active(now));

        let expired = TeamMembership {
            expires_at: Some(now - chrono::Duration::seconds(1)),
            ..active.clone()
        };
        assert!(!expired.is_active(now));

        let disabled = TeamMembership { enabled: false, ..active };
        assert!(!disabled.is_active(now));
    }
}
