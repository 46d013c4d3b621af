use async_trait::async_trait;
use std::collections::HashMap;

/// A dependency edge declared by an extension. `version_req` is a semver
/// constraint string evaluated against the dependency's own declared
/// version; `None` means "any version".
#[derive(Debug, Clone)]
pub struct ExtDependency {
    pub name: String,
    pub optional: bool,
    pub version_req: Option<String>,
}

/// Static metadata declared by an extension.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub ext_dependencies: Vec<ExtDependency>,
    pub pip_dependencies: Vec<String>,
    pub apt_dependencies: Vec<String>,
}

/// Errors an extension's own initializer may raise; the loader propagates
/// these without retry.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionInitError {
    #[error("{0}")]
    Failed(String),
}

/// An extension: discovered, dependency-resolved, then initialized once.
/// `initialize` registers hooks, abilities, providers, managers, and
/// routers into the shared context passed to it.
#[async_trait]
pub trait Extension: Send + Sync {
    fn manifest(&self) -> Manifest;

    async fn initialize(&self, ctx: &mut ExtensionContext) -> Result<(), ExtensionInitError>;
}

/// Mutable handles an extension's initializer is given to register itself
/// into the running pipeline. Extensions never hold a direct reference to
/// the pipeline's internals, only to these handles, which breaks cyclic
/// dependencies via a late-binding registry looked up by name.
pub struct ExtensionContext {
    pub hooks: std::sync::Arc<tokio::sync::Mutex<crate::pipeline::HookRegistry>>,
    pub abilities: std::sync::Arc<tokio::sync::Mutex<super::abilities::AbilityRegistry>>,
    pub kinds: std::sync::Arc<tokio::sync::Mutex<crate::pipeline::KindRegistry>>,
}

/// Per-extension declared-but-unresolved ability implementation, bound at
/// initialization time into the shared `AbilityRegistry`.
pub type AbilityTable = HashMap<&'static str, super::abilities::Ability>;
