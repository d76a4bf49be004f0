//! Container lifecycle management
//!
//! One [`ContainerLifecycleManager::run`] call owns exactly one container from
//! creation to removal. Every container is covered by a [`ContainerGuard`]
//! from before the create call, so a failed create, an engine error, a timeout
//! or a dropped future all end in forced removal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::docker::DockerEngine;
use super::images::{ImageDefinition, ImageProvisioner};
use super::policy::SecurityPolicyBuilder;
use super::{
    ContainerEngine, ContainerSpec, EngineStats, ExecutionRequest, ExecutionResult,
    EXECUTION_ID_LABEL, LANGUAGE_LABEL, MANAGED_LABEL,
};
use crate::config::{RuntimeConfig, SandboxSettings};
use crate::errors::{EngineError, SandboxError};

const REMOVE_ATTEMPTS: u32 = 3;
const REMOVE_BACKOFF: Duration = Duration::from_millis(200);

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

async fn remove_with_retry(engine: &dyn ContainerEngine, target: &str) -> bool {
    for attempt in 1..=REMOVE_ATTEMPTS {
        match engine.remove_container(target).await {
            Ok(()) => {
                log::debug!("Removed container {}", target);
                return true;
            }
            Err(e) if attempt < REMOVE_ATTEMPTS => {
                log::warn!(
                    "Failed to remove container {} (attempt {}/{}): {}",
                    target,
                    attempt,
                    REMOVE_ATTEMPTS,
                    e
                );
                tokio::time::sleep(REMOVE_BACKOFF * attempt).await;
            }
            Err(e) => {
                log::error!(
                    "Giving up removing container {} after {} attempts: {}",
                    target,
                    REMOVE_ATTEMPTS,
                    e
                );
            }
        }
    }
    false
}

/// Removes its container when released or dropped.
///
/// Armed with the container name before create, so a container the daemon
/// registered under a failed create call is still found. The create call
/// itself runs on its own task; a guard dropped mid-create hands that task to
/// the cleanup, which waits for the daemon's answer before removing.
struct ContainerGuard {
    engine: Arc<dyn ContainerEngine>,
    target: Option<String>,
    pending_create: Option<JoinHandle<Result<String, EngineError>>>,
}

impl ContainerGuard {
    fn arm(engine: Arc<dyn ContainerEngine>, name: &str) -> Self {
        Self {
            engine,
            target: Some(name.to_string()),
            pending_create: None,
        }
    }

    async fn create(&mut self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let engine = self.engine.clone();
        let owned = spec.clone();
        let pending = self
            .pending_create
            .insert(tokio::spawn(async move { engine.create_container(&owned).await }));
        let joined = pending.await;
        self.pending_create = None;

        let id = joined.map_err(|e| EngineError::Other(format!("create task failed: {}", e)))??;
        self.target = Some(id.clone());
        Ok(id)
    }

    async fn release(mut self) {
        if let Some(target) = self.target.clone() {
            // Stays armed until removal finishes; cancellation falls to Drop.
            remove_with_retry(self.engine.as_ref(), &target).await;
            self.target = None;
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let pending_create = self.pending_create.take();
        let Some(mut target) = self.target.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Execution abandoned; scheduling removal of container {}", target);
                let engine = self.engine.clone();
                handle.spawn(async move {
                    if let Some(create) = pending_create {
                        // The daemon may register the container after the caller left.
                        if let Ok(Ok(id)) = create.await {
                            target = id;
                        }
                    }
                    remove_with_retry(engine.as_ref(), &target).await;
                });
            }
            Err(_) => log::error!(
                "No async runtime to remove container {}; it carries the {} label for cleanup",
                target,
                MANAGED_LABEL
            ),
        }
    }
}

/// Runs validated requests in fresh, single-use containers.
pub struct ContainerLifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    images: ImageProvisioner,
    policy: SecurityPolicyBuilder,
}

impl ContainerLifecycleManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, policy: SecurityPolicyBuilder) -> Self {
        Self {
            images: ImageProvisioner::new(engine.clone()),
            engine,
            policy,
        }
    }

    /// Connect to the local Docker daemon with the configured seccomp profile.
    pub fn connect(settings: &SandboxSettings) -> Result<Self, SandboxError> {
        let engine = DockerEngine::connect().map_err(|e| {
            log::error!("{}", e);
            SandboxError::Orchestration(e.to_string())
        })?;
        Ok(Self::new(
            Arc::new(engine),
            SecurityPolicyBuilder::new(settings.seccomp_profile_path.clone()),
        ))
    }

    pub fn engine(&self) -> Arc<dyn ContainerEngine> {
        self.engine.clone()
    }

    pub fn policy(&self) -> &SecurityPolicyBuilder {
        &self.policy
    }

    pub async fn is_available(&self) -> bool {
        match self.engine.ping().await {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Container engine not available: {}", e);
                false
            }
        }
    }

    /// Execute one request.
    ///
    /// Returns `Err` only when the security policy cannot be established;
    /// every other outcome, including engine failures, is a classified
    /// [`ExecutionResult`].
    pub async fn run(
        &self,
        request: &ExecutionRequest,
        config: &RuntimeConfig,
        definition: Option<&ImageDefinition>,
    ) -> Result<ExecutionResult, SandboxError> {
        let requested = Instant::now();
        let policy = self.policy.build(config).await?;

        if let Err(e) = self.images.ensure(config.image(), definition).await {
            log::error!("{}", e);
            return Ok(ExecutionResult::failed(e.user_message(), elapsed_ms(requested)));
        }

        let execution_id = Uuid::new_v4().to_string();
        let name = format!("boxrun-{}", execution_id);

        let mut cmd = config.command().to_vec();
        cmd.push(request.code().to_string());

        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(EXECUTION_ID_LABEL.to_string(), execution_id);
        labels.insert(LANGUAGE_LABEL.to_string(), config.language().to_string());

        let spec = ContainerSpec {
            name,
            image: config.image().to_string(),
            cmd,
            labels,
            policy,
        };

        let started = Instant::now();
        let mut guard = ContainerGuard::arm(self.engine.clone(), &spec.name);
        let outcome = self
            .drive(&spec, &mut guard, request.timeout_seconds(), config.max_output_bytes(), started)
            .await;
        guard.release().await;

        match outcome {
            Ok(result) => {
                log::debug!(
                    "Container {} finished: success={} timed_out={} exit_code={} in {}ms",
                    spec.name,
                    result.success,
                    result.timed_out,
                    result.exit_code,
                    result.execution_time_ms
                );
                Ok(result)
            }
            Err(e) => {
                let error = SandboxError::Orchestration(e.to_string());
                log::error!("Container {}: {}", spec.name, error);
                Ok(ExecutionResult::failed(error.user_message(), elapsed_ms(started)))
            }
        }
    }

    async fn drive(
        &self,
        spec: &ContainerSpec,
        guard: &mut ContainerGuard,
        timeout_seconds: u64,
        max_output_bytes: usize,
        started: Instant,
    ) -> Result<ExecutionResult, EngineError> {
        let id = guard.create(spec).await?;
        log::debug!("Created container {} ({})", spec.name, id);

        self.engine.start_container(&id).await?;

        let deadline = Duration::from_secs(timeout_seconds);
        match tokio::time::timeout(deadline, self.engine.wait_container(&id)).await {
            Err(_) => {
                log::warn!("Execution timed out for container {} after {}s", id, timeout_seconds);
                if let Err(e) = self.engine.kill_container(&id).await {
                    log::warn!("Failed to kill timed out container {}: {}", id, e);
                }
                Ok(ExecutionResult::timed_out(timeout_seconds, elapsed_ms(started)))
            }
            Ok(wait) => {
                let exit_code = wait?;
                let execution_time_ms = elapsed_ms(started);
                let output = self.engine.collect_output(&id, max_output_bytes).await?;
                let oom_killed = match self.engine.oom_killed(&id).await {
                    Ok(flag) => flag,
                    Err(e) => {
                        log::warn!("Could not read OOM state of container {}: {}", id, e);
                        false
                    }
                };
                Ok(ExecutionResult::completed(exit_code, output, execution_time_ms, oom_killed))
            }
        }
    }

    /// Remove every container carrying the managed label, optionally only
    /// those created from `image_filter`.
    ///
    /// Meant for startup or idle periods: in-flight executions are removed too.
    pub async fn cleanup_stale_containers(&self, image_filter: Option<&str>) -> Result<usize, SandboxError> {
        let containers: Vec<_> = self
            .engine
            .list_managed_containers()
            .await
            .map_err(|e| SandboxError::Orchestration(e.to_string()))?
            .into_iter()
            .filter(|container| image_filter.map_or(true, |image| container.image == image))
            .collect();

        let mut removed = 0;
        for container in &containers {
            if remove_with_retry(self.engine.as_ref(), &container.id).await {
                removed += 1;
            }
        }
        log::info!("Removed {} of {} stale containers", removed, containers.len());
        Ok(removed)
    }

    pub async fn engine_stats(&self) -> Result<EngineStats, SandboxError> {
        self.engine
            .stats()
            .await
            .map_err(|e| SandboxError::Orchestration(e.to_string()))
    }

    pub async fn remove_image(&self, image: &str) -> Result<(), SandboxError> {
        self.images.forget(image).await;
        self.engine
            .remove_image(image)
            .await
            .map_err(|e| SandboxError::Orchestration(e.to_string()))?;
        log::info!("Removed image {}", image);
        Ok(())
    }

    /// Tags of images built from trusted definitions, optionally only those
    /// containing `name_filter`.
    pub async fn list_images(&self, name_filter: Option<&str>) -> Result<Vec<String>, SandboxError> {
        let images = self
            .engine
            .list_images()
            .await
            .map_err(|e| SandboxError::Orchestration(e.to_string()))?;
        Ok(images
            .into_iter()
            .filter(|tag| name_filter.map_or(true, |name| tag.contains(name)))
            .collect())
    }

    /// Provision `image` ahead of the first run, rebuilding it when
    /// `force_rebuild` is set.
    pub async fn ensure_image(
        &self,
        image: &str,
        definition: Option<&ImageDefinition>,
        force_rebuild: bool,
    ) -> Result<(), SandboxError> {
        match definition {
            Some(definition) if force_rebuild => self.images.rebuild(image, definition).await,
            _ => self.images.ensure(image, definition).await,
        }
    }
}
