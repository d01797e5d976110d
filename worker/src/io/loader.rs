//! Runner module loading.
//!
//! Rust workers link statically, so "loading a module" resolves the
//! normalized locator against a registry the embedding pool populated at
//! startup. The seam stays async so embedders can load over the wire or
//! from disk instead; load failures are fatal and never retried here.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::core::locator::ModuleUrl;
use crate::error::WorkerError;
use crate::runner::{LoadedModule, NoopRunner, RunnerHandle};

/// Module resolution/load failure.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no runner module registered for {url}")]
    NotFound { url: String },
    #[error("failed to load runner module {url}: {reason}")]
    Failed { url: String, reason: String },
}

/// Loads runner modules by normalized locator.
#[async_trait]
pub trait RunnerLoader: Send + Sync {
    async fn load(&self, url: &ModuleUrl) -> Result<LoadedModule, LoadError>;
}

/// Default loader: a registry of modules keyed by URL.
#[derive(Default)]
pub struct RunnerRegistry {
    modules: HashMap<String, LoadedModule>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in runners.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("builtin:noop", LoadedModule::runner(NoopRunner));
        registry
    }

    pub fn register(&mut self, url: impl Into<String>, module: LoadedModule) {
        self.modules.insert(url.into(), module);
    }
}

#[async_trait]
impl RunnerLoader for RunnerRegistry {
    async fn load(&self, url: &ModuleUrl) -> Result<LoadedModule, LoadError> {
        self.modules
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound {
                url: url.as_str().to_string(),
            })
    }
}

/// Locate, load, and validate the runner module named by `locator`.
///
/// The execution capability is deliberately not checked here; see
/// [`RunnerHandle::executor`].
pub async fn resolve(
    loader: &dyn RunnerLoader,
    locator: &str,
) -> Result<RunnerHandle, WorkerError> {
    let url = ModuleUrl::normalize(locator)?;
    debug!(url = %url, "loading runner module");
    let module = loader.load(&url).await?;
    let handle = RunnerHandle::validate(module)?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_miss_is_a_load_error() {
        let registry = RunnerRegistry::new();
        let err = resolve(&registry, "file:///runners/absent")
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            WorkerError::Load(LoadError::NotFound { ref url }) if url == "file:///runners/absent"
        ));
    }

    #[tokio::test]
    async fn builtin_noop_resolves_through_the_default_registry() {
        let registry = RunnerRegistry::with_builtins();
        resolve(&registry, "builtin:noop").await.expect("resolve");
    }

    #[tokio::test]
    async fn relative_locator_fails_before_the_loader_runs() {
        struct PanickingLoader;

        #[async_trait]
        impl RunnerLoader for PanickingLoader {
            async fn load(&self, _url: &ModuleUrl) -> Result<LoadedModule, LoadError> {
                panic!("loader must not be reached for relative locators");
            }
        }

        let err = resolve(&PanickingLoader, "./runner.rs")
            .await
            .expect_err("must fail");
        assert!(matches!(err, WorkerError::Configuration(_)));
    }
}
