//! Execution image provisioning
//!
//! Images are built only from definitions compiled into this crate, never
//! from caller input. Built images are remembered in a ready-set shared by all
//! executions. Builds for one tag are serialized behind a per-tag lock and
//! double-checked, so concurrent first runs trigger at most one build and no
//! caller can observe a half-built image.

use crate::errors::{EngineError, SandboxError};
use crate::executors::ContainerEngine;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub const DEFINITION_DIGEST_LABEL: &str = "boxrun.definition-digest";

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// A trusted, compiled-in image definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDefinition {
    pub dockerfile: &'static str,
}

impl ImageDefinition {
    pub const fn new(dockerfile: &'static str) -> Self {
        Self { dockerfile }
    }

    /// Hex SHA-256 of the Dockerfile text.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dockerfile.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Dockerfile with the digest label appended.
    pub fn labelled_dockerfile(&self) -> String {
        format!(
            "{}\nLABEL {}=\"{}\"\n",
            self.dockerfile.trim_end(),
            DEFINITION_DIGEST_LABEL,
            self.digest()
        )
    }

    /// In-memory tar archive holding only the Dockerfile.
    pub fn build_context(&self) -> Result<Vec<u8>, EngineError> {
        let dockerfile = self.labelled_dockerfile();
        let mut header = tar::Header::new_gnu();
        header.set_path("Dockerfile")?;
        header.set_size(dockerfile.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        let mut archive = tar::Builder::new(Vec::new());
        archive.append(&header, dockerfile.as_bytes())?;
        Ok(archive.into_inner()?)
    }
}

/// Ensures execution images exist before containers are created from them.
pub struct ImageProvisioner {
    engine: Arc<dyn ContainerEngine>,
    ready: RwLock<HashSet<String>>,
    build_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ImageProvisioner {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            ready: RwLock::new(HashSet::new()),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure `image` exists, building it from `definition` if absent or
    /// built from a different definition.
    pub async fn ensure(
        &self,
        image: &str,
        definition: Option<&ImageDefinition>,
    ) -> Result<(), SandboxError> {
        if self.ready.read().await.contains(image) {
            return Ok(());
        }
        self.provision(image, definition, false).await
    }

    /// Build `image` from `definition` even if a current build exists.
    pub async fn rebuild(&self, image: &str, definition: &ImageDefinition) -> Result<(), SandboxError> {
        self.provision(image, Some(definition), true).await
    }

    async fn provision(
        &self,
        image: &str,
        definition: Option<&ImageDefinition>,
        force: bool,
    ) -> Result<(), SandboxError> {
        let lock = self.build_lock(image).await;
        let _guard = lock.lock().await;

        // Another caller may have finished while we waited for the lock.
        if !force && self.ready.read().await.contains(image) {
            return Ok(());
        }

        let unavailable = |reason: String| SandboxError::ImageUnavailable {
            image: image.to_string(),
            reason,
        };

        let exists = self
            .engine
            .image_exists(image)
            .await
            .map_err(|e| unavailable(format!("failed to inspect image: {}", e)))?;

        let needs_build = match (exists, definition) {
            (_, Some(_)) if force => true,
            (false, _) => true,
            (true, Some(definition)) => {
                let found = self
                    .engine
                    .image_label(image, DEFINITION_DIGEST_LABEL)
                    .await
                    .map_err(|e| unavailable(format!("failed to inspect image labels: {}", e)))?;
                match found {
                    Some(digest) if digest == definition.digest() => false,
                    Some(digest) => {
                        log::warn!(
                            "Image {} was built from definition {}, current is {}; rebuilding",
                            image,
                            short_digest(&digest),
                            short_digest(&definition.digest())
                        );
                        true
                    }
                    None => {
                        log::warn!(
                            "Image {} carries no {} label; using it as provided",
                            image,
                            DEFINITION_DIGEST_LABEL
                        );
                        false
                    }
                }
            }
            (true, None) => false,
        };

        if needs_build {
            let definition = definition.ok_or_else(|| {
                unavailable("image not found and no trusted definition is registered".to_string())
            })?;

            self.ready.write().await.remove(image);
            log::info!(
                "Building image {} (definition {})",
                image,
                short_digest(&definition.digest())
            );
            self.engine
                .build_image(image, definition)
                .await
                .map_err(|e| unavailable(format!("build failed: {}", e)))?;

            let built = self
                .engine
                .image_exists(image)
                .await
                .map_err(|e| unavailable(format!("failed to inspect built image: {}", e)))?;
            if !built {
                return Err(unavailable("build reported success but image is missing".to_string()));
            }
            log::info!("Successfully built image {}", image);
        } else {
            log::debug!("Image {} found", image);
        }

        self.ready.write().await.insert(image.to_string());
        Ok(())
    }

    /// Drop `image` from the ready-set so the next run re-checks the engine.
    pub async fn forget(&self, image: &str) {
        self.ready.write().await.remove(image);
    }

    pub async fn is_ready(&self, image: &str) -> bool {
        self.ready.read().await.contains(image)
    }

    async fn build_lock(&self, image: &str) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock().await;
        locks
            .entry(image.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
