use super::entity::EntityDescription;
use super::hooks::{HookContext, HookRegistry, Op};
use super::projection::Projection;
use super::search::{SearchClause, TransformerRegistry};
use super::session::Session;
use crate::error::EngineError;
use crate::identity::Principal;
use crate::permission::{AccessLevel, FilterPredicate, PermissionEngine, PermissionOutcome};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Binds a Rust type to a managed entity kind as the database record
/// type in the manager's binding.
pub trait EntityRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn kind() -> &'static str;
}

/// Extra validation beyond the shape `EntityRecord` already encodes.
pub trait Validator<R>: Send + Sync {
    fn validate(&self, draft: &R) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct ListParams {
    pub sort_desc: bool,
    pub limit: i64,
    pub offset: i64,
    pub include_deleted: bool,
    pub fields: Vec<String>,
    pub include: Vec<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            sort_desc: true,
            limit: 50,
            offset: 0,
            include_deleted: false,
            fields: Vec::new(),
            include: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub clauses: HashMap<String, SearchClause>,
    pub transformer_params: HashMap<String, serde_json::Value>,
    pub list: ListParams,
}

/// Per-item failure accumulated during a batch operation: batch_update
/// and batch_delete iterate and accumulate per-item errors rather than
/// aborting the whole batch.
#[derive(Debug, Clone)]
pub struct BatchItemError {
    pub id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<BatchItemError>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct EntityRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    created_by: Uuid,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<Uuid>,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by: Option<Uuid>,
    user_id: Option<Uuid>,
    team_id: Option<Uuid>,
    permission_references: Json<HashMap<String, Uuid>>,
    attributes: Json<serde_json::Value>,
}

impl EntityRow {
    fn into_record<R: EntityRecord>(self) -> Result<R, EngineError> {
        let mut value = self.attributes.0;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("id".into(), serde_json::json!(self.id));
            obj.insert("created_at".into(), serde_json::json!(self.created_at));
            obj.insert("created_by".into(), serde_json::json!(self.created_by));
            obj.insert("updated_at".into(), serde_json::json!(self.updated_at));
            obj.insert("updated_by".into(), serde_json::json!(self.updated_by));
            obj.insert("deleted_at".into(), serde_json::json!(self.deleted_at));
            obj.insert("deleted_by".into(), serde_json::json!(self.deleted_by));
            obj.insert("user_id".into(), serde_json::json!(self.user_id));
            obj.insert("team_id".into(), serde_json::json!(self.team_id));
        }
        serde_json::from_value(value)
            .map_err(|e| EngineError::Internal(format!("row does not match record shape: {e}")))
    }
}

/// Generic CRUD manager shared by every entity kind. Binds an
/// `EntityDescription`, a typed record, optional validators, hooks, search
/// transformers, and the permission engine consulted on every operation.
pub struct Manager<R: EntityRecord> {
    pool: PgPool,
    description: EntityDescription,
    permissions: Arc<PermissionEngine>,
    hooks: Arc<HookRegistry>,
    transformers: TransformerRegistry,
    projection: Projection,
    validators: Vec<Arc<dyn Validator<R>>>,
    _marker: std::marker::PhantomData<R>,
}

impl<R: EntityRecord> Manager<R> {
    pub fn new(
        pool: PgPool,
        description: EntityDescription,
        permissions: Arc<PermissionEngine>,
        hooks: Arc<HookRegistry>,
        transformers: TransformerRegistry,
        projection: Projection,
        validators: Vec<Arc<dyn Validator<R>>>,
    ) -> Self {
        Self {
            pool,
            description,
            permissions,
            hooks,
            transformers,
            projection,
            validators,
            _marker: std::marker::PhantomData,
        }
    }

    fn kind(&self) -> &'static str {
        self.description.kind
    }

    pub async fn create(
        &self,
        principal: Principal,
        draft: R,
        reference_targets: HashMap<String, Uuid>,
        owner: Owner,
        session: Option<&mut Session<'_>>,
    ) -> Result<R, EngineError> {
        for validator in &self.validators {
            validator.validate(&draft)?;
        }

        let outcome = self
            .permissions
            .can_create(principal, self.kind(), &reference_targets, owner)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        if !outcome.is_granted() {
            return Err(EngineError::PermissionDenied(format!("{outcome:?}")));
        }

        let mut draft_value = serde_json::to_value(&draft)
            .map_err(|e| EngineError::Internal(format!("cannot serialize draft: {e}")))?;
        let ctx = HookContext { principal, kind: self.kind() };
        self.hooks.run_before(self.kind(), Op::Create, &mut draft_value, &ctx).await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let refs_json = serde_json::to_value(&reference_targets)
            .map_err(|e| EngineError::Internal(format!("cannot serialize references: {e}")))?;

        let mut owned = self.join_or_begin(session).await?;
        let insert = sqlx::query(
            "INSERT INTO entities \
             (id, kind, created_at, created_by, user_id, team_id, permission_references, attributes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(self.kind())
        .bind(now)
        .bind(principal.id())
        .bind(owner.user_id)
        .bind(owner.team_id)
        .bind(refs_json)
        .bind(&draft_value)
        .execute(owned.executor())
        .await;

        if let Err(err) = insert {
            owned.rollback_if_owned().await;
            return Err(EngineError::from(err));
        }

        if let Some(obj) = draft_value.as_object_mut() {
            obj.insert("id".into(), serde_json::json!(id));
            obj.insert("created_at".into(), serde_json::json!(now));
            obj.insert("created_by".into(), serde_json::json!(principal.id()));
            obj.insert("updated_at".into(), serde_json::Value::Null);
            obj.insert("updated_by".into(), serde_json::Value::Null);
            obj.insert("deleted_at".into(), serde_json::Value::Null);
            obj.insert("deleted_by".into(), serde_json::Value::Null);
            obj.insert("user_id".into(), serde_json::json!(owner.user_id));
            obj.insert("team_id".into(), serde_json::json!(owner.team_id));
        }
        let record: R = serde_json::from_value(draft_value)
            .map_err(|e| EngineError::Internal(format!("cannot deserialize record: {e}")))?;
        let record_value = serde_json::to_value(&record)
            .map_err(|e| EngineError::Internal(format!("cannot serialize record: {e}")))?;
        if let Err(err) = self.hooks.run_after(self.kind(), Op::Create, &record_value, None, &ctx).await {
            owned.rollback_if_owned().await;
            return Err(err);
        }

        owned.commit_if_owned().await.map_err(EngineError::from)?;
        Ok(record)
    }

    /// Joins a caller-supplied session, or begins and owns a fresh one,
    /// per the supplied-or-owned transaction rule.
    async fn join_or_begin<'s, 'a>(
        &self,
        session: Option<&'s mut Session<'a>>,
    ) -> Result<OwnedOrJoined<'s, 'a>, sqlx::Error> {
        match session {
            Some(s) => Ok(OwnedOrJoined::Joined(s)),
            None => Ok(OwnedOrJoined::Owned(Session::begin(&self.pool).await?)),
        }
    }

    pub async fn get(&self, principal: Principal, id: Uuid, params: &ListParams) -> Result<R, EngineError> {
        self.projection.validate_fields(&params.fields)?;
        self.projection.validate_relations(&params.include)?;

        let outcome = self
            .permissions
            .check(principal, self.kind(), id, AccessLevel::View)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        if !outcome.is_granted() {
            return Err(EngineError::not_found(self.kind(), id.to_string()));
        }

        let row = self.load_row(id, params.include_deleted).await?;
        let row = row.ok_or_else(|| EngineError::not_found(self.kind(), id.to_string()))?;
        let mut record = row.into_record::<R>()?;
        let mut value = serde_json::to_value(&record)
            .map_err(|e| EngineError::Internal(format!("cannot project record: {e}")))?;
        self.projection.apply(&mut value, &params.fields);
        record = serde_json::from_value(value)
            .map_err(|e| EngineError::Internal(format!("cannot rebuild projected record: {e}")))?;
        Ok(record)
    }

    pub async fn list(&self, principal: Principal, params: &ListParams) -> Result<Vec<R>, EngineError> {
        self.projection.validate_fields(&params.fields)?;
        self.projection.validate_relations(&params.include)?;

        let predicate = self
            .permissions
            .filter_predicate(principal, self.kind(), AccessLevel::View)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        self.run_filtered_query(&predicate, params).await
    }

    pub async fn search(&self, principal: Principal, params: &SearchParams) -> Result<Vec<R>, EngineError> {
        let mut clauses = params.clauses.clone();
        for (name, arg) in &params.transformer_params {
            let transformer = self
                .transformers
                .get(name)
                .ok_or_else(|| EngineError::Validation(format!("unknown search transformer '{name}'")))?;
            for (field, clause) in transformer(arg)? {
                clauses.insert(field, clause);
            }
        }

        let predicate = self
            .permissions
            .filter_predicate(principal, self.kind(), AccessLevel::View)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;

        self.run_filtered_query_with_clauses(&predicate, &clauses, &params.list).await
    }

    pub async fn update(
        &self,
        principal: Principal,
        id: Uuid,
        patch: serde_json::Value,
        session: Option<&mut Session<'_>>,
    ) -> Result<R, EngineError> {
        let outcome = self
            .permissions
            .check(principal, self.kind(), id, AccessLevel::Edit)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        if !outcome.is_granted() {
            return Err(EngineError::not_found(self.kind(), id.to_string()));
        }

        let row = self
            .load_row(id, false)
            .await?
            .ok_or_else(|| EngineError::not_found(self.kind(), id.to_string()))?;
        let pre_image = row.clone().into_record::<R>()?;
        let pre_image_value = serde_json::to_value(&pre_image)
            .map_err(|e| EngineError::Internal(format!("cannot serialize pre-image: {e}")))?;

        let mut merged = pre_image_value.clone();
        merge_json(&mut merged, &patch);

        let ctx = HookContext { principal, kind: self.kind() };
        self.hooks.run_before(self.kind(), Op::Update, &mut merged, &ctx).await?;

        let mut owned = self.join_or_begin(session).await?;
        let now = Utc::now();
        let update = sqlx::query(
            "UPDATE entities SET attributes = $1, updated_at = $2, updated_by = $3 WHERE id = $4 AND kind = $5",
        )
        .bind(&merged)
        .bind(now)
        .bind(principal.id())
        .bind(id)
        .bind(self.kind())
        .execute(owned.executor())
        .await;

        if let Err(err) = update {
            owned.rollback_if_owned().await;
            return Err(EngineError::from(err));
        }

        let record: R = serde_json::from_value(merged)
            .map_err(|e| EngineError::Internal(format!("cannot deserialize updated record: {e}")))?;
        let record_value = serde_json::to_value(&record)
            .map_err(|e| EngineError::Internal(format!("cannot serialize updated record: {e}")))?;
        if let Err(err) = self
            .hooks
            .run_after(self.kind(), Op::Update, &record_value, Some(&pre_image_value), &ctx)
            .await
        {
            owned.rollback_if_owned().await;
            return Err(err);
        }

        owned.commit_if_owned().await.map_err(EngineError::from)?;
        Ok(record)
    }

    pub async fn delete(
        &self,
        principal: Principal,
        id: Uuid,
        session: Option<&mut Session<'_>>,
    ) -> Result<(), EngineError> {
        let outcome = self
            .permissions
            .check(principal, self.kind(), id, AccessLevel::Delete)
            .await
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        if !outcome.is_granted() {
            return Err(EngineError::not_found(self.kind(), id.to_string()));
        }

        let ctx = HookContext { principal, kind: self.kind() };
        let mut marker = serde_json::json!({ "id": id });
        self.hooks.run_before(self.kind(), Op::Delete, &mut marker, &ctx).await?;

        let mut owned = self.join_or_begin(session).await?;
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE entities SET deleted_at = $1, deleted_by = $2 \
             WHERE id = $3 AND kind = $4 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(principal.id())
        .bind(id)
        .bind(self.kind())
        .execute(owned.executor())
        .await;

        let rows_affected = match result {
            Ok(r) => r.rows_affected(),
            Err(err) => {
                owned.rollback_if_owned().await;
                return Err(EngineError::from(err));
            }
        };
        if rows_affected == 0 {
            owned.rollback_if_owned().await;
            return Err(EngineError::not_found(self.kind(), id.to_string()));
        }

        if let Err(err) = self.hooks.run_after(self.kind(), Op::Delete, &marker, None, &ctx).await {
            owned.rollback_if_owned().await;
            return Err(err);
        }

        owned.commit_if_owned().await.map_err(EngineError::from)?;
        Ok(())
    }

    pub async fn batch_update(
        &self,
        principal: Principal,
        items: Vec<(Uuid, serde_json::Value)>,
    ) -> BatchResult<R> {
        let mut result = BatchResult::default();
        for (id, patch) in items {
            match self.update(principal, id, patch, None).await {
                Ok(record) => result.succeeded.push(record),
                Err(err) => result.failed.push(BatchItemError { id, error: err.to_string() }),
            }
        }
        result
    }

    pub async fn batch_delete(&self, principal: Principal, ids: Vec<Uuid>) -> BatchResult<Uuid> {
        let mut result = BatchResult::default();
        for id in ids {
            match self.delete(principal, id, None).await {
                Ok(()) => result.succeeded.push(id),
                Err(err) => result.failed.push(BatchItemError { id, error: err.to_string() }),
            }
        }
        result
    }

    async fn load_row(&self, id: Uuid, include_deleted: bool) -> Result<Option<EntityRow>, EngineError> {
        let sql = if include_deleted {
            "SELECT id, created_at, created_by, updated_at, updated_by, deleted_at, deleted_by, \
                    user_id, team_id, permission_references, attributes \
             FROM entities WHERE id = $1 AND kind = $2"
        } else {
            "SELECT id, created_at, created_by, updated_at, updated_by, deleted_at, deleted_by, \
                    user_id, team_id, permission_references, attributes \
             FROM entities WHERE id = $1 AND kind = $2 AND deleted_at IS NULL"
        };
        sqlx::query_as::<_, EntityRow>(sql)
            .bind(id)
            .bind(self.kind())
            .fetch_optional(&self.pool)
            .await
            .map_err(EngineError::from)
    }

    async fn run_filtered_query(&self, predicate: &FilterPredicate, params: &ListParams) -> Result<Vec<R>, EngineError> {
        self.run_filtered_query_with_clauses(predicate, &HashMap::new(), params).await
    }

    async fn run_filtered_query_with_clauses(
        &self,
        predicate: &FilterPredicate,
        clauses: &HashMap<String, SearchClause>,
        params: &ListParams,
    ) -> Result<Vec<R>, EngineError> {
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT id, created_at, created_by, updated_at, updated_by, deleted_at, deleted_by, \
                    user_id, team_id, permission_references, attributes \
             FROM entities WHERE kind = ",
        );
        qb.push_bind(self.kind());
        if !params.include_deleted {
            qb.push(" AND deleted_at IS NULL");
        }
        predicate.push_sql(&mut qb);

        for (field, clause) in clauses {
            qb.push(" AND (attributes->>");
            qb.push_bind(field.clone());
            qb.push(")");
            push_clause_comparison(&mut qb, clause);
        }

        qb.push(" ORDER BY created_at ");
        qb.push(if params.sort_desc { "DESC" } else { "ASC" });
        qb.push(", id ASC LIMIT ");
        qb.push_bind(params.limit);
        qb.push(" OFFSET ");
        qb.push_bind(params.offset);

        let rows = qb
            .build_query_as::<EntityRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::from)?;

        rows.into_iter().map(EntityRow::into_record::<R>).collect()
    }
}

fn push_clause_comparison(qb: &mut sqlx::QueryBuilder<'_, sqlx::Postgres>, clause: &SearchClause) {
    match clause {
        SearchClause::StringInc(v) => {
            qb.push(" ILIKE '%' || ");
            qb.push_bind(v.clone());
            qb.push(" || '%'");
        }
        SearchClause::StringSw(v) => {
            qb.push(" ILIKE ");
            qb.push_bind(v.clone());
            qb.push(" || '%'");
        }
        SearchClause::StringEw(v) => {
            qb.push(" ILIKE '%' || ");
            qb.push_bind(v.clone());
        }
        SearchClause::NumEq(v) => {
            qb.push("::float8 = ");
            qb.push_bind(*v);
        }
        SearchClause::NumNeq(v) => {
            qb.push("::float8 <> ");
            qb.push_bind(*v);
        }
        SearchClause::NumLt(v) => {
            qb.push("::float8 < ");
            qb.push_bind(*v);
        }
        SearchClause::NumGt(v) => {
            qb.push("::float8 > ");
            qb.push_bind(*v);
        }
        SearchClause::NumLteq(v) => {
            qb.push("::float8 <= ");
            qb.push_bind(*v);
        }
        SearchClause::NumGteq(v) => {
            qb.push("::float8 >= ");
            qb.push_bind(*v);
        }
        SearchClause::DateBefore(v) => {
            qb.push("::timestamptz < ");
            qb.push_bind(*v);
        }
        SearchClause::DateAfter(v) => {
            qb.push("::timestamptz > ");
            qb.push_bind(*v);
        }
        SearchClause::DateOn(v) => {
            qb.push("::date = ");
            qb.push_bind(*v);
            qb.push("::date");
        }
        SearchClause::IsTrue(v) => {
            qb.push("::boolean = ");
            qb.push_bind(*v);
        }
    }
}

/// Shallow merge of a JSON patch into a base object (sufficient for the
/// flat-attribute records this pipeline manages).
fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            base_obj.insert(key.clone(), value.clone());
        }
    }
}

/// Holds either a session borrowed from the caller or one this call began
/// and owns; only the owning side commits or rolls back.
enum OwnedOrJoined<'s, 'a> {
    Owned(Session<'static>),
    Joined(&'s mut Session<'a>),
}

impl<'s, 'a> OwnedOrJoined<'s, 'a> {
    fn executor(&mut self) -> &mut sqlx::PgConnection {
        match self {
            OwnedOrJoined::Owned(s) => s.executor(),
            OwnedOrJoined::Joined(s) => s.executor(),
        }
    }

    async fn commit_if_owned(self) -> Result<(), sqlx::Error> {
        if let OwnedOrJoined::Owned(s) = self {
            s.commit().await?;
        }
        Ok(())
    }

    async fn rollback_if_owned(self) {
        if let OwnedOrJoined::Owned(s) = self {
            let _ = s.rollback().await;
        }
    }
}

/// Direct ownership fields optionally supplied at creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Owner {
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
}
