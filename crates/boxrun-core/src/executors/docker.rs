// src/executors/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    BuildImageOptions as BollardBuildImageOptionsQuery,
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    InspectContainerOptions as BollardInspectContainerOptionsQuery,
    KillContainerOptions as BollardKillContainerOptionsQuery,
    ListContainersOptions as BollardListContainersOptionsQuery,
    ListImagesOptions as BollardListImagesOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    RemoveImageOptions as BollardRemoveImageOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;

use super::images::{ImageDefinition, DEFINITION_DIGEST_LABEL};
use super::output::CappedBuffer;
use super::policy::SCRATCH_MOUNT;
use super::{CapturedOutput, ContainerEngine, ContainerSpec, EngineStats, ManagedContainer, MANAGED_LABEL};
use crate::errors::EngineError;

/// [`ContainerEngine`] backed by the local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using the local defaults (`DOCKER_HOST` or the unix socket).
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn managed_filter() -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    filters.insert("label".to_string(), vec![format!("{}=true", MANAGED_LABEL)]);
    filters
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Unavailable(e.to_string()))
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(EngineError::BollardError(e)),
        }
    }

    async fn image_label(&self, image: &str, label: &str) -> Result<Option<String>, EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(details) => Ok(details
                .config
                .and_then(|config| config.labels)
                .and_then(|mut labels| labels.remove(label))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(EngineError::BollardError(e)),
        }
    }

    async fn build_image(&self, image: &str, definition: &ImageDefinition) -> Result<(), EngineError> {
        let context = definition.build_context()?;
        let options = BollardBuildImageOptionsQuery {
            dockerfile: "Dockerfile".to_string(),
            t: Some(image.to_string()),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut build_stream =
            self.docker
                .build_image(options, None, Some(bollard::body_full(context.into())));

        while let Some(result) = build_stream.next().await {
            let info = result?;
            if let Some(error) = info.error {
                return Err(EngineError::BuildFailed(error));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    log::debug!("[build {}] {}", image, line);
                }
            }
        }
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> Result<(), EngineError> {
        let options = BollardRemoveImageOptionsQuery {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_image(image, Some(options), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(EngineError::BollardError(e)),
        }
    }

    async fn list_images(&self) -> Result<Vec<String>, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![DEFINITION_DIGEST_LABEL.to_string()]);
        let options = BollardListImagesOptionsQuery {
            filters: Some(filters),
            ..Default::default()
        };

        let images = self.docker.list_images(Some(options)).await?;
        let mut tags: Vec<String> = images
            .into_iter()
            .flat_map(|summary| summary.repo_tags.into_iter())
            .filter(|tag| tag != "<none>:<none>")
            .collect();
        tags.sort();
        Ok(tags)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            user: Some(spec.policy.user().to_string()),
            working_dir: Some(SCRATCH_MOUNT.to_string()),
            labels: Some(spec.labels.clone()),
            network_disabled: Some(spec.policy.network_disabled()),
            host_config: Some(spec.policy.host_config()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;
        for warning in &container.warnings {
            log::warn!("Docker warning for {}: {}", spec.name, warning);
        }
        Ok(container.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<BollardStartContainerOptionsQuery>)
            .await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, EngineError> {
        let mut wait_stream = self
            .docker
            .wait_container(id, None::<BollardWaitContainerOptionsQuery>);

        match wait_stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Bollard reports a non-zero exit as an error carrying the code.
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(EngineError::BollardError(e)),
            None => Err(EngineError::WaitStreamEnded(id.to_string())),
        }
    }

    async fn collect_output(&self, id: &str, max_bytes: usize) -> Result<CapturedOutput, EngineError> {
        let mut output_stream = self.docker.logs(
            id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = CappedBuffer::new(max_bytes);
        let mut stderr = CappedBuffer::new(max_bytes);
        while let Some(log_result) = output_stream.next().await {
            match log_result? {
                LogOutput::StdOut { message } => stdout.push(&message),
                LogOutput::StdErr { message } => stderr.push(&message),
                _ => {}
            }
        }

        if stdout.is_truncated() || stderr.is_truncated() {
            log::debug!("Output of container {} truncated at {} bytes", id, max_bytes);
        }

        Ok(CapturedOutput {
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
        })
    }

    async fn oom_killed(&self, id: &str) -> Result<bool, EngineError> {
        let details = self
            .docker
            .inspect_container(id, None::<BollardInspectContainerOptionsQuery>)
            .await?;
        Ok(details
            .state
            .and_then(|state| state.oom_killed)
            .unwrap_or(false))
    }

    async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        match self
            .docker
            .kill_container(id, None::<BollardKillContainerOptionsQuery>)
            .await
        {
            Ok(()) => Ok(()),
            // 404: already gone, 409: no longer running
            Err(BollardError::DockerResponseServerError {
                status_code: 404 | 409,
                ..
            }) => Ok(()),
            Err(e) => Err(EngineError::BollardError(e)),
        }
    }

    async fn remove_container(&self, id_or_name: &str) -> Result<(), EngineError> {
        let options = BollardRemoveContainerOptionsQuery {
            force: true,
            v: true,
            ..Default::default()
        };
        match self.docker.remove_container(id_or_name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(EngineError::BollardError(e)),
        }
    }

    async fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, EngineError> {
        let options = BollardListContainersOptionsQuery {
            all: true,
            filters: Some(managed_filter()),
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|summary| {
                let id = summary.id?;
                Some(ManagedContainer {
                    id,
                    image: summary.image.unwrap_or_default(),
                    state: summary.state.map(|state| state.to_string()),
                })
            })
            .collect())
    }

    async fn stats(&self) -> Result<EngineStats, EngineError> {
        let info = self.docker.info().await?;
        Ok(EngineStats {
            containers_running: info.containers_running.unwrap_or(0),
            containers_stopped: info.containers_stopped.unwrap_or(0),
            images: info.images.unwrap_or(0),
            memory_total: info.mem_total.unwrap_or(0),
            cpus: info.ncpu.unwrap_or(0),
        })
    }
}
