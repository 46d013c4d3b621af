//! Extension loader: discovery, dependency resolution, and initialization
//! of pluggable extensions against the shared pipeline.

pub mod abilities;
pub mod loader;
pub mod manifest;

pub use abilities::{Ability, AbilityError, AbilityRegistry};
pub use loader::{resolve, LoaderError, Resolution};
pub use manifest::{Extension, ExtensionContext, ExtensionInitError, ExtDependency, Manifest};

use std::collections::HashMap;
use std::sync::Arc;

/// Drives the full initialization protocol: resolve order, then call each
/// extension's initializer in turn. Extension init errors are logged and
/// skipped, not retried.
pub async fn load_all(
    extensions: HashMap<String, Arc<dyn Extension>>,
    ctx: &mut ExtensionContext,
) -> Result<Resolution, LoaderError> {
    let manifests: HashMap<String, Manifest> =
        extensions.iter().map(|(name, ext)| (name.clone(), ext.manifest())).collect();
    let resolution = resolve(&manifests)?;

    for name in &resolution.order {
        if let Some(extension) = extensions.get(name) {
            if let Err(err) = extension.initialize(ctx).await {
                tracing::error!(extension = %name, error = %err, "extension initialization failed");
            }
        }
    }

    for (name, missing) in &resolution.unloadable {
        tracing::warn!(extension = %name, missing_dependency = %missing, "extension unloadable");
    }

    Ok(resolution)
}
