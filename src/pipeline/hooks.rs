use crate::error::EngineError;
use crate::identity::Principal;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    After,
}

/// Context passed to every hook invocation; carries no mutable pipeline
/// state so hooks cannot reach back into the manager registry directly.
/// Cyclic relationships are broken by late binding, never by a direct
/// object reference from a hook to its owning manager.
#[derive(Debug, Clone, Copy)]
pub struct HookContext {
    pub principal: Principal,
    pub kind: &'static str,
}

#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn call(&self, draft: &mut serde_json::Value, ctx: &HookContext) -> Result<(), EngineError>;
}

#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn call(
        &self,
        record: &serde_json::Value,
        pre_image: Option<&serde_json::Value>,
        ctx: &HookContext,
    ) -> Result<(), EngineError>;

    /// A non-critical hook's error is logged but does not roll back the
    /// transaction.
    fn critical(&self) -> bool {
        true
    }
}

#[async_trait]
impl<F> BeforeHook for F
where
    F: Fn(&mut serde_json::Value, &HookContext) -> Result<(), EngineError> + Send + Sync,
{
    async fn call(&self, draft: &mut serde_json::Value, ctx: &HookContext) -> Result<(), EngineError> {
        self(draft, ctx)
    }
}

type BeforeEntry = (String, Arc<dyn BeforeHook>);
type AfterEntry = (String, Arc<dyn AfterHook>);

/// Process-wide hook registry keyed by `(kind, op, phase)`; append-only
/// after the loader completes, so safe for concurrent read. Registration
/// is idempotent by `(kind, op, phase, hook_id)`; core hooks
/// are registered at manager construction, before any extension loads, so
/// plain registration order already satisfies "extension hooks run after
/// core hooks of the same phase" without extra bookkeeping.
#[derive(Default)]
pub struct HookRegistry {
    before: HashMap<(&'static str, Op), Vec<BeforeEntry>>,
    after: HashMap<(&'static str, Op), Vec<AfterEntry>>,
    seen: HashSet<(&'static str, Op, Phase, String)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_before(
        &mut self,
        kind: &'static str,
        op: Op,
        hook_id: impl Into<String>,
        hook: Arc<dyn BeforeHook>,
    ) -> bool {
        let hook_id = hook_id.into();
        if !self.seen.insert((kind, op, Phase::Before, hook_id.clone())) {
            return false;
        }
        self.before.entry((kind, op)).or_default().push((hook_id, hook));
        true
    }

    pub fn register_after(
        &mut self,
        kind: &'static str,
        op: Op,
        hook_id: impl Into<String>,
        hook: Arc<dyn AfterHook>,
    ) -> bool {
        let hook_id = hook_id.into();
        if !self.seen.insert((kind, op, Phase::After, hook_id.clone())) {
            return false;
        }
        self.after.entry((kind, op)).or_default().push((hook_id, hook));
        true
    }

    pub async fn run_before(
        &self,
        kind: &'static str,
        op: Op,
        draft: &mut serde_json::Value,
        ctx: &HookContext,
    ) -> Result<(), EngineError> {
        let Some(hooks) = self.before.get(&(kind, op)) else {
            return Ok(());
        };
        for (_, hook) in hooks {
            hook.call(draft, ctx).await?;
        }
        Ok(())
    }

    /// Runs every registered `after` hook. A critical hook's error aborts
    /// immediately (the caller rolls back the transaction); a non-critical
    /// hook's error is swallowed into the returned list for logging.
    pub async fn run_after(
        &self,
        kind: &'static str,
        op: Op,
        record: &serde_json::Value,
        pre_image: Option<&serde_json::Value>,
        ctx: &HookContext,
    ) -> Result<Vec<EngineError>, EngineError> {
        let Some(hooks) = self.after.get(&(kind, op)) else {
            return Ok(Vec::new());
        };
        let mut non_critical_errors = Vec::new();
        for (_, hook) in hooks {
            if let Err(err) = hook.call(record, pre_image, ctx).await {
                if hook.critical() {
                    return Err(err);
                }
                non_critical_errors.push(err);
            }
        }
        Ok(non_critical_errors)
    }
}
