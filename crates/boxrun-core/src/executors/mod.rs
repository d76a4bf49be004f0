//! Code execution environments for sandboxed runtime evaluation.
//!
//! Untrusted code runs in single-use containers. The container daemon is
//! reached through the [`ContainerEngine`] trait; [`docker::DockerEngine`] is
//! the production implementation. [`lifecycle::ContainerLifecycleManager`]
//! owns the create/start/wait/teardown sequence and is the only component
//! that turns an [`policy::AppliedPolicy`] into a running container.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use crate::errors::EngineError;

pub mod docker;
pub mod images;
pub mod lifecycle;
pub mod output;
pub mod policy;

pub use images::{ImageDefinition, ImageProvisioner};
pub use lifecycle::ContainerLifecycleManager;
pub use policy::{AppliedPolicy, SecurityPolicyBuilder};

/// Label carried by every container this crate creates.
pub const MANAGED_LABEL: &str = "boxrun.managed";
pub const EXECUTION_ID_LABEL: &str = "boxrun.execution-id";
pub const LANGUAGE_LABEL: &str = "boxrun.language";

/// A request that passed the validation gate.
///
/// Only [`crate::validation::validate_request`] constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub(crate) code: String,
    pub(crate) timeout_seconds: u64,
}

impl ExecutionRequest {
    /// Run the validation gate; see [`crate::validation::validate_request`].
    pub fn validate(
        code: &str,
        timeout_override: Option<u64>,
        config: &crate::config::RuntimeConfig,
    ) -> Result<Self, crate::errors::SandboxError> {
        crate::validation::validate_request(code, timeout_override, config)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}

/// Outcome of one sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the exit code could not be determined.
    pub exit_code: i64,
    pub timed_out: bool,
    pub execution_time_ms: u64,
    pub oom_killed: bool,
    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub const UNKNOWN_EXIT_CODE: i64 = -1;

    /// The process ran to completion (with any exit code).
    pub fn completed(exit_code: i64, output: CapturedOutput, execution_time_ms: u64, oom_killed: bool) -> Self {
        let success = exit_code == 0;
        let error_message = if success {
            None
        } else if oom_killed {
            Some(format!(
                "Process was killed after exceeding its memory limit (exit code {})",
                exit_code
            ))
        } else {
            Some(format!("Process exited with code {}", exit_code))
        };

        Self {
            success,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
            timed_out: false,
            execution_time_ms,
            oom_killed,
            error_message,
        }
    }

    /// The deadline elapsed and the process was killed.
    pub fn timed_out(timeout_seconds: u64, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Self::UNKNOWN_EXIT_CODE,
            timed_out: true,
            execution_time_ms,
            oom_killed: false,
            error_message: Some(format!("Execution timed out after {} seconds", timeout_seconds)),
        }
    }

    /// The sandbox itself failed; `message` must already be sanitized.
    pub fn failed(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Self::UNKNOWN_EXIT_CODE,
            timed_out: false,
            execution_time_ms,
            oom_killed: false,
            error_message: Some(message.into()),
        }
    }
}

/// Capped stdout/stderr of a finished container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Everything the engine needs to create one sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub labels: HashMap<String, String>,
    pub policy: AppliedPolicy,
}

/// A container found by [`ContainerEngine::list_managed_containers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    pub id: String,
    pub image: String,
    pub state: Option<String>,
}

/// Daemon-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub containers_running: i64,
    pub containers_stopped: i64,
    pub images: i64,
    pub memory_total: i64,
    pub cpus: i64,
}

/// Container daemon operations used by the lifecycle manager.
///
/// Implementations must be safe for concurrent use; the lifecycle manager
/// shares one engine across all in-flight executions.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn ping(&self) -> Result<(), EngineError>;

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError>;

    /// Value of `label` on `image`, if the image exists and carries it.
    async fn image_label(&self, image: &str, label: &str) -> Result<Option<String>, EngineError>;

    /// Build `image` from a trusted definition.
    async fn build_image(&self, image: &str, definition: &ImageDefinition) -> Result<(), EngineError>;

    async fn remove_image(&self, image: &str) -> Result<(), EngineError>;

    async fn list_images(&self) -> Result<Vec<String>, EngineError>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, EngineError>;

    /// Collect stdout and stderr, each capped at `max_bytes`.
    async fn collect_output(&self, id: &str, max_bytes: usize) -> Result<CapturedOutput, EngineError>;

    async fn oom_killed(&self, id: &str) -> Result<bool, EngineError>;

    async fn kill_container(&self, id: &str) -> Result<(), EngineError>;

    /// Force-remove a container by id or name. Removing a container that no
    /// longer exists is not an error.
    async fn remove_container(&self, id_or_name: &str) -> Result<(), EngineError>;

    async fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, EngineError>;

    async fn stats(&self) -> Result<EngineStats, EngineError>;
}
