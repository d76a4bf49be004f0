//! Language runtimes and the registry that resolves them
//!
//! A [`Runtime`] runs code for one language. The [`RuntimeRegistry`] maps a
//! language identifier to a factory for its runtime. Registries are plain
//! values: build one with [`DefaultRuntimes::create_registry`] (or by hand in
//! tests) and hand it to whoever needs to resolve languages.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::config::{RuntimeConfig, SandboxSettings};
use crate::errors::SandboxError;
use crate::executors::{ContainerLifecycleManager, ExecutionResult};
use crate::validation;

pub mod container;
pub mod profile;

pub use container::ContainerRuntime;
pub use profile::{LanguageProfile, TestHarness};

#[async_trait]
pub trait Runtime: Send + Sync {
    fn language(&self) -> &str;

    fn config(&self) -> &RuntimeConfig;

    /// Run `code` with the configured limits, optionally overriding the
    /// timeout.
    async fn run(
        &self,
        code: &str,
        timeout_override: Option<u64>,
    ) -> Result<ExecutionResult, SandboxError>;

    /// Run `code` together with `test_code` under the language's test harness.
    async fn run_with_tests(
        &self,
        code: &str,
        test_code: &str,
    ) -> Result<ExecutionResult, SandboxError>;

    async fn is_available(&self) -> bool;
}

pub type RuntimeFactory = Arc<dyn Fn() -> Result<Arc<dyn Runtime>, SandboxError> + Send + Sync>;

struct RegistryEntry {
    factory: RuntimeFactory,
    instance: OnceLock<Arc<dyn Runtime>>,
}

/// Maps language identifiers to runtimes.
///
/// Runtimes are created on first resolution and reused afterwards.
#[derive(Default)]
pub struct RuntimeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `language`. Re-registering is an error, so a
    /// profile can never be silently replaced.
    pub fn register(
        &mut self,
        language: impl Into<String>,
        factory: RuntimeFactory,
    ) -> Result<(), SandboxError> {
        let language = language.into();
        if !validation::is_valid_language_id(&language) {
            return Err(SandboxError::config(
                "language",
                format!("'{}' is not a valid language identifier", language),
            ));
        }
        if self.entries.contains_key(&language) {
            return Err(SandboxError::DuplicateRuntime(language));
        }

        log::debug!("Registered runtime '{}'", language);
        self.entries.insert(
            language,
            RegistryEntry {
                factory,
                instance: OnceLock::new(),
            },
        );
        Ok(())
    }

    pub fn resolve(&self, language: &str) -> Result<Arc<dyn Runtime>, SandboxError> {
        let entry = self
            .entries
            .get(language)
            .ok_or_else(|| SandboxError::UnknownRuntime {
                language: language.to_string(),
                available: self.languages(),
            })?;

        if let Some(runtime) = entry.instance.get() {
            return Ok(runtime.clone());
        }
        let runtime = (entry.factory)()?;
        Ok(entry.instance.get_or_init(|| runtime).clone())
    }

    pub fn contains(&self, language: &str) -> bool {
        self.entries.contains_key(language)
    }

    /// Registered languages, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.entries.keys().cloned().collect();
        languages.sort();
        languages
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry construction for the built-in language profiles.
pub struct DefaultRuntimes;

impl DefaultRuntimes {
    /// Register every built-in profile, resolving its config from `settings`.
    pub fn create_registry(
        manager: Arc<ContainerLifecycleManager>,
        settings: &SandboxSettings,
    ) -> Result<RuntimeRegistry, SandboxError> {
        let mut registry = RuntimeRegistry::new();
        for profile in profile::builtin_profiles() {
            let config = settings.runtime_config(profile)?;
            let manager = manager.clone();
            let factory: RuntimeFactory = Arc::new(move || {
                let runtime: Arc<dyn Runtime> =
                    Arc::new(ContainerRuntime::new(profile, config.clone(), manager.clone()));
                Ok(runtime)
            });
            registry.register(profile.language, factory)?;
        }
        Ok(registry)
    }
}
