// src/runtimes/container.rs
use async_trait::async_trait;
use std::sync::Arc;

use super::profile::LanguageProfile;
use super::Runtime;
use crate::config::RuntimeConfig;
use crate::errors::SandboxError;
use crate::executors::{ContainerLifecycleManager, ExecutionRequest, ExecutionResult, ImageDefinition};

/// Container-backed [`Runtime`] for one language profile.
pub struct ContainerRuntime {
    profile: &'static LanguageProfile,
    config: RuntimeConfig,
    manager: Arc<ContainerLifecycleManager>,
}

impl ContainerRuntime {
    pub fn new(
        profile: &'static LanguageProfile,
        config: RuntimeConfig,
        manager: Arc<ContainerLifecycleManager>,
    ) -> Self {
        Self {
            profile,
            config,
            manager,
        }
    }

    pub fn profile(&self) -> &'static LanguageProfile {
        self.profile
    }

    /// The trusted definition applies only to the profile's own image; an
    /// overridden image must already exist on the engine.
    fn image_definition(&self) -> Option<&'static ImageDefinition> {
        if self.config.image() == self.profile.image {
            Some(&self.profile.image_definition)
        } else {
            None
        }
    }
}

#[async_trait]
impl Runtime for ContainerRuntime {
    fn language(&self) -> &str {
        self.config.language()
    }

    fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    async fn run(
        &self,
        code: &str,
        timeout_override: Option<u64>,
    ) -> Result<ExecutionResult, SandboxError> {
        let request = ExecutionRequest::validate(code, timeout_override, &self.config)?;
        log::debug!(
            "Running {} characters of {} with a {}s timeout",
            request.code().chars().count(),
            self.language(),
            request.timeout_seconds()
        );
        self.manager
            .run(&request, &self.config, self.image_definition())
            .await
    }

    async fn run_with_tests(
        &self,
        code: &str,
        test_code: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        if code.trim().is_empty() || test_code.trim().is_empty() {
            return Err(SandboxError::EmptyCode);
        }
        let program = self.profile.build_test_program(code, test_code);
        self.run(&program, None).await
    }

    async fn is_available(&self) -> bool {
        self.manager.is_available().await
    }
}
