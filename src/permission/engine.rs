use super::models::{AccessLevel, DeniedReason, PermissionGrant, PermissionOutcome, RecordMeta, Subject};
use crate::identity::{Principal, RoleHierarchy, SystemIds, TeamHierarchy, TeamMembership};
use crate::pipeline::entity::KindRegistry;
use chrono::Utc;
use moka::future::Cache;
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// A restriction a list/search query must apply so only visible records
/// are returned. Built once per (principal, kind, level) and translated
/// into SQL by the pipeline's query builder.
#[derive(Debug, Clone)]
pub enum FilterPredicate {
    /// No restriction: every non-deleted record of the kind is visible.
    AllowAll,
    /// Visible only through the listed conditions, OR'd together.
    AnyOf(Vec<VisibilityClause>),
    /// Nothing is visible (e.g. system kind, ordinary principal).
    DenyAll,
}

#[derive(Debug, Clone)]
pub enum VisibilityClause {
    CreatedBy(Uuid),
    OwnedByUser(Uuid),
    TeamIn(Vec<Uuid>),
    GrantedToPrincipalOrTeamsOrRoles {
        principal: Uuid,
        teams: Vec<Uuid>,
        roles: Vec<Uuid>,
        level: AccessLevel,
    },
}

impl FilterPredicate {
    /// Appends `AND (<predicate>)` to `qb`, or `AND FALSE` / nothing for the
    /// degenerate cases. Callers are expected to have already pushed the
    /// `kind = ...` and soft-delete restrictions.
    pub fn push_sql(&self, qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>) {
        match self {
            FilterPredicate::AllowAll => {}
            FilterPredicate::DenyAll => {
                qb.push(" AND false");
            }
            FilterPredicate::AnyOf(clauses) if clauses.is_empty() => {
                qb.push(" AND false");
            }
            FilterPredicate::AnyOf(clauses) => {
                qb.push(" AND (");
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        qb.push(" OR ");
                    }
                    clause.push_sql(qb);
                }
                qb.push(")");
            }
        }
    }
}

impl VisibilityClause {
    fn push_sql(&self, qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>) {
        match self {
            VisibilityClause::CreatedBy(id) => {
                qb.push("created_by = ");
                qb.push_bind(*id);
            }
            VisibilityClause::OwnedByUser(id) => {
                qb.push("user_id = ");
                qb.push_bind(*id);
            }
            VisibilityClause::TeamIn(teams) => {
                qb.push("team_id = ANY(");
                qb.push_bind(teams.clone());
                qb.push(")");
            }
            VisibilityClause::GrantedToPrincipalOrTeamsOrRoles { principal, teams, roles, level } => {
                qb.push("EXISTS (SELECT 1 FROM permission_grants g WHERE g.resource_kind = entities.kind \
                          AND g.resource_id = entities.id AND (g.expires_at IS NULL OR g.expires_at > now()) \
                          AND g.");
                qb.push(level.column_name());
                qb.push(" AND ((g.subject_type = 'user' AND g.subject_id = ");
                qb.push_bind(*principal);
                qb.push(") OR (g.subject_type = 'team' AND g.subject_id = ANY(");
                qb.push_bind(teams.clone());
                qb.push(")) OR (g.subject_type = 'role' AND g.subject_id = ANY(");
                qb.push_bind(roles.clone());
                qb.push("))))");
            }
        }
    }
}

#[derive(Clone)]
pub struct PermissionEngine {
    pool: PgPool,
    system_ids: SystemIds,
    roles: RoleHierarchy,
    teams: TeamHierarchy,
    kinds: Arc<KindRegistry>,
    check_cache: Cache<(Uuid, String, Uuid, AccessLevel), PermissionOutcome>,
}

impl PermissionEngine {
    pub fn new(
        pool: PgPool,
        system_ids: SystemIds,
        roles: RoleHierarchy,
        teams: TeamHierarchy,
        kinds: Arc<KindRegistry>,
    ) -> Self {
        Self {
            pool,
            system_ids,
            roles,
            teams,
            kinds,
            check_cache: Cache::builder()
                .time_to_live(Duration::from_secs(30))
                .max_capacity(100_000)
                .build(),
        }
    }

    /// Implements the lettered rule chain in order, short circuiting on
    /// the first rule that decides the outcome. Results are memoized
    /// briefly; callers that just mutated the record or its grants must
    /// not rely on immediate cache invalidation across concurrent checks.
    /// A bounded staleness window is acceptable here, unlike the
    /// structural role/team caches.
    pub async fn check(
        &self,
        principal: Principal,
        kind: &str,
        id: Uuid,
        level: AccessLevel,
    ) -> Result<PermissionOutcome, PermissionError> {
        let cache_key = (principal.id(), kind.to_string(), id, level);
        if let Some(hit) = self.check_cache.get(&cache_key).await {
            return Ok(hit);
        }
        let outcome = self.check_uncached(principal, kind, id, level).await?;
        self.check_cache.insert(cache_key, outcome).await;
        Ok(outcome)
    }

    async fn check_uncached(
        &self,
        principal: Principal,
        kind: &str,
        id: Uuid,
        level: AccessLevel,
    ) -> Result<PermissionOutcome, PermissionError> {
        // (a) ROOT passes every check unconditionally.
        if self.system_ids.is_root(principal) {
            return Ok(PermissionOutcome::Granted);
        }

        let desc = self
            .kinds
            .get(kind)
            .ok_or_else(|| PermissionError::UnknownKind(kind.to_string()))?;

        let meta = match self.load_record(kind, id).await? {
            Some(meta) if meta.deleted_at.is_none() => meta,
            // (b) absent or soft-deleted records are Denied(NotFound), never
            // distinguished from PermissionDenied at the wire level.
            _ => return Ok(PermissionOutcome::Denied(DeniedReason::NotFound)),
        };

        // (c) system-flagged kinds: only ROOT/SYSTEM may act beyond VIEW.
        if desc.system && level > AccessLevel::View && !self.system_ids.is_root_or_system(principal) {
            return Ok(PermissionOutcome::Denied(DeniedReason::SystemProtected));
        }

        // (d) records created by ROOT are inaccessible to everyone else.
        if meta.created_by == self.system_ids.root {
            return Ok(PermissionOutcome::Denied(DeniedReason::CreatedByRoot));
        }

        // (e) records created by SYSTEM: VIEW/EXECUTE/COPY always granted;
        // EDIT/DELETE/SHARE only to ROOT/SYSTEM.
        if meta.created_by == self.system_ids.system {
            return Ok(if level <= AccessLevel::View || self.system_ids.is_root_or_system(principal) {
                PermissionOutcome::Granted
            } else {
                PermissionOutcome::Denied(DeniedReason::InsufficientLevelForSystemCreator)
            });
        }

        // (f) records created by TEMPLATE: VIEW/EXECUTE/COPY/SHARE granted
        // to everyone, EDIT/DELETE restricted to ROOT/SYSTEM.
        if meta.created_by == self.system_ids.template {
            return Ok(if level.template_bypass() || self.system_ids.is_root_or_system(principal) {
                PermissionOutcome::Granted
            } else {
                PermissionOutcome::Denied(DeniedReason::InsufficientLevelForTemplateCreator)
            });
        }

        // (g) the record's direct user owner may act at any level.
        if meta.user_id == Some(principal.id()) {
            return Ok(PermissionOutcome::Granted);
        }

        // (h) team ownership: the principal's nearest matching team
        // membership must carry a role dominating the level's minimum.
        if let Some(team_id) = meta.team_id {
            if let Some(membership) = self.nearest_team_membership(principal, team_id).await? {
                let min_role = self.roles.by_name(level.minimum_role_name());
                if let Some(min_role) = min_role {
                    if self.roles.dominates(membership.role_id, min_role) {
                        return Ok(PermissionOutcome::Granted);
                    }
                }
            }
        }

        // (i) an explicit, still-active grant targeting the principal, one
        // of their teams, or a role dominating their assigned role.
        if self.has_matching_grant(principal, kind, id, level).await? {
            return Ok(PermissionOutcome::Granted);
        }

        // (j) reference inheritance: any declared permission reference
        // that itself grants `level` on its target propagates the grant.
        let mut visited = HashSet::from([(kind.to_string(), id)]);
        if self
            .check_via_references(principal, desc, &meta, level, &mut visited)
            .await?
        {
            return Ok(PermissionOutcome::Granted);
        }

        // (k) otherwise denied.
        Ok(PermissionOutcome::Denied(DeniedReason::NoGrant))
    }

    fn check_via_references<'a>(
        &'a self,
        principal: Principal,
        desc: &'a crate::pipeline::entity::EntityDescription,
        meta: &'a RecordMeta,
        level: AccessLevel,
        visited: &'a mut HashSet<(String, Uuid)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool, PermissionError>> + Send + 'a>> {
        Box::pin(async move {
            for reference in &desc.permission_references {
                let Some(&target_id) = meta.references.get(reference.name) else {
                    continue;
                };
                if !visited.insert((reference.target_kind.to_string(), target_id)) {
                    continue;
                }
                let outcome = self
                    .check_uncached(principal, reference.target_kind, target_id, level)
                    .await?;
                if outcome.is_granted() {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    /// Whether `principal` may create a record of `kind` with the given
    /// `owner`. When the kind declares a `create_permission_reference`
    /// every declared reference must grant EDIT (the create-reference) or
    /// VIEW (the rest). A user-scoped kind additionally requires the
    /// record's `user_id` (if set) to name the creating principal; a
    /// team-scoped kind requires the principal to hold, in a membership on
    /// the record's `team_id` or one of its ancestors, a role dominating
    /// EDIT's minimum role. A kind with no declared references and no
    /// owner set is creatable by anyone who is not blocked by (c).
    pub async fn can_create(
        &self,
        principal: Principal,
        kind: &str,
        reference_targets: &std::collections::HashMap<String, Uuid>,
        owner: crate::pipeline::manager::Owner,
    ) -> Result<PermissionOutcome, PermissionError> {
        if self.system_ids.is_root(principal) {
            return Ok(PermissionOutcome::Granted);
        }
        let desc = self
            .kinds
            .get(kind)
            .ok_or_else(|| PermissionError::UnknownKind(kind.to_string()))?;
        if desc.system && !self.system_ids.is_root_or_system(principal) {
            return Ok(PermissionOutcome::Denied(DeniedReason::SystemProtected));
        }
        for reference in &desc.permission_references {
            let Some(&target_id) = reference_targets.get(reference.name) else {
                continue;
            };
            let required = if desc.create_permission_reference == Some(reference.name) {
                AccessLevel::Edit
            } else {
                AccessLevel::View
            };
            let outcome = self
                .check(principal, reference.target_kind, target_id, required)
                .await?;
            if !outcome.is_granted() {
                return Ok(outcome);
            }
        }

        if desc.user_owned {
            if let Some(user_id) = owner.user_id {
                if user_id != principal.id() {
                    return Ok(PermissionOutcome::Denied(DeniedReason::NoGrant));
                }
            }
        }

        if desc.team_owned {
            if let Some(team_id) = owner.team_id {
                let min_role = self.roles.by_name(AccessLevel::Edit.minimum_role_name());
                let sufficient = match min_role {
                    Some(min_role) => self
                        .nearest_team_membership(principal, team_id)
                        .await?
                        .is_some_and(|membership| self.roles.dominates(membership.role_id, min_role)),
                    None => false,
                };
                if !sufficient {
                    return Ok(PermissionOutcome::Denied(DeniedReason::NoGrant));
                }
            }
        }

        Ok(PermissionOutcome::Granted)
    }

    /// Builds the visibility restriction a list/search query must apply.
    /// Covers rules (a), (b) [via the caller's soft-delete filter], (d)-(i);
    /// rule (j) reference inheritance is not applied at filter time. Rule
    /// (c) is applied here too, defensively: a non-ROOT/SYSTEM principal
    /// listing at a level above VIEW on a system kind sees nothing,
    /// matching the same principals' `check` outcome.
    pub async fn filter_predicate(
        &self,
        principal: Principal,
        kind: &str,
        level: AccessLevel,
    ) -> Result<FilterPredicate, PermissionError> {
        if self.system_ids.is_root(principal) {
            return Ok(FilterPredicate::AllowAll);
        }
        let desc = self
            .kinds
            .get(kind)
            .ok_or_else(|| PermissionError::UnknownKind(kind.to_string()))?;
        if desc.system && level > AccessLevel::View && !self.system_ids.is_root_or_system(principal) {
            return Ok(FilterPredicate::DenyAll);
        }

        let mut clauses = vec![VisibilityClause::CreatedBy(self.system_ids.system)];
        if level.template_bypass() || self.system_ids.is_root_or_system(principal) {
            clauses.push(VisibilityClause::CreatedBy(self.system_ids.template));
        }
        clauses.push(VisibilityClause::OwnedByUser(principal.id()));

        let memberships = self.active_memberships(principal).await?;
        let min_role = self.roles.by_name(level.minimum_role_name());
        if let Some(min_role) = min_role {
            // A membership qualifies when its role dominates the level's
            // minimum role; each qualifying membership's team then grants
            // access to its own descendant teams' records.
            let qualifying_teams: Vec<Uuid> = memberships
                .iter()
                .filter(|m| self.roles.dominates(m.role_id, min_role))
                .flat_map(|m| self.teams.descendants(m.team_id))
                .collect();
            if !qualifying_teams.is_empty() {
                clauses.push(VisibilityClause::TeamIn(qualifying_teams));
            }
        }

        // Roles that dominate (and so satisfy a grant aimed at) any of the
        // principal's actual membership roles: each membership role's
        // ancestor chain, including itself.
        let member_teams: Vec<Uuid> = memberships.iter().map(|m| m.team_id).collect();
        let dominating_roles: Vec<Uuid> = memberships
            .iter()
            .flat_map(|m| self.roles.ancestors(m.role_id))
            .collect();
        clauses.push(VisibilityClause::GrantedToPrincipalOrTeamsOrRoles {
            principal: principal.id(),
            teams: member_teams,
            roles: dominating_roles,
            level,
        });

        Ok(FilterPredicate::AnyOf(clauses))
    }

    async fn load_record(&self, kind: &str, id: Uuid) -> Result<Option<RecordMeta>, PermissionError> {
        let row = sqlx::query(
            "SELECT id, kind, created_by, deleted_at, user_id, team_id, permission_references \
             FROM entities WHERE id = $1 AND kind = $2",
        )
        .bind(id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => None,
            Some(row) => {
                let refs_json: serde_json::Value = row.try_get("permission_references")?;
                let references = refs_json
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| {
                                v.as_str().and_then(|s| Uuid::parse_str(s).ok()).map(|id| (k.clone(), id))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some(RecordMeta {
                    id: row.try_get("id")?,
                    kind: row.try_get("kind")?,
                    created_by: row.try_get("created_by")?,
                    deleted_at: row.try_get("deleted_at")?,
                    user_id: row.try_get("user_id")?,
                    team_id: row.try_get("team_id")?,
                    references,
                })
            }
        })
    }

    async fn active_memberships(&self, principal: Principal) -> Result<Vec<TeamMembership>, PermissionError> {
        let rows = sqlx::query_as::<_, TeamMembership>(
            "SELECT principal_id, team_id, role_id, enabled, expires_at \
             FROM team_memberships WHERE principal_id = $1",
        )
        .bind(principal.id())
        .fetch_all(&self.pool)
        .await?;
        let now = Utc::now();
        Ok(rows.into_iter().filter(|m| m.is_active(now)).collect())
    }

    /// The active membership whose team is nearest to `record_team` in the
    /// ancestor chain (self first, then successive parents): the
    /// principal's role in the nearest such membership governs the check.
    async fn nearest_team_membership(
        &self,
        principal: Principal,
        record_team: Uuid,
    ) -> Result<Option<TeamMembership>, PermissionError> {
        let memberships = self.active_memberships(principal).await?;
        for ancestor in self.teams.ancestors(record_team) {
            if let Some(membership) = memberships.iter().find(|m| m.team_id == ancestor) {
                return Ok(Some(membership.clone()));
            }
        }
        Ok(None)
    }

    async fn has_matching_grant(
        &self,
        principal: Principal,
        kind: &str,
        id: Uuid,
        level: AccessLevel,
    ) -> Result<bool, PermissionError> {
        let memberships = self.active_memberships(principal).await?;
        let team_ids: Vec<Uuid> = memberships.iter().map(|m| m.team_id).collect();

        let rows = sqlx::query(
            "SELECT id, resource_kind, resource_id, subject_type, subject_id, \
                    can_view, can_execute, can_copy, can_edit, can_delete, can_share, expires_at \
             FROM permission_grants \
             WHERE resource_kind = $1 AND resource_id = $2 \
               AND (expires_at IS NULL OR expires_at > now()) \
             ORDER BY expires_at ASC NULLS LAST",
        )
        .bind(kind)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let subject_type: String = row.try_get("subject_type")?;
            let subject_id: Uuid = row.try_get("subject_id")?;
            let subject = match subject_type.as_str() {
                "user" => Subject::User(subject_id),
                "team" => Subject::Team(subject_id),
                "role" => Subject::Role(subject_id),
                _ => continue,
            };
            let matches = match subject {
                Subject::User(u) => u == principal.id(),
                Subject::Team(t) => team_ids.contains(&t),
                Subject::Role(r) => memberships.iter().any(|m| self.roles.dominates(r, m.role_id)),
            };
            if !matches {
                continue;
            }
            let grant = PermissionGrant {
                id: row.try_get("id")?,
                resource_kind: row.try_get("resource_kind")?,
                resource_id: row.try_get("resource_id")?,
                subject,
                can_view: row.try_get("can_view")?,
                can_execute: row.try_get("can_execute")?,
                can_copy: row.try_get("can_copy")?,
                can_edit: row.try_get("can_edit")?,
                can_delete: row.try_get("can_delete")?,
                can_share: row.try_get("can_share")?,
                expires_at: row.try_get("expires_at")?,
            };
            if level.grant_flag(&grant) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
