//! Fluent builder for [`RuntimeConfig`]
//!
//! The builder accepts any values; `build()` is the single place where bounds
//! are enforced.

use crate::config::types::{limits, RuntimeConfig};
use crate::errors::SandboxError;
use crate::validation;

#[derive(Debug, Clone)]
pub struct RuntimeConfigBuilder {
    language: String,
    image: String,
    command: Vec<String>,
    timeout_seconds: u64,
    memory_limit: String,
    cpu_quota: i64,
    pids_limit: i64,
    tmpfs_size_mb: u64,
    network_enabled: bool,
    max_code_length: usize,
    max_output_bytes: usize,
}

impl RuntimeConfigBuilder {
    /// Start a builder with the default resource limits.
    pub fn new(language: impl Into<String>, image: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            language: language.into(),
            image: image.into(),
            command,
            timeout_seconds: limits::DEFAULT_TIMEOUT_SECONDS,
            memory_limit: limits::DEFAULT_MEMORY_LIMIT.to_string(),
            cpu_quota: limits::DEFAULT_CPU_QUOTA,
            pids_limit: limits::DEFAULT_PIDS_LIMIT,
            tmpfs_size_mb: limits::DEFAULT_TMPFS_SIZE_MB,
            network_enabled: false,
            max_code_length: limits::DEFAULT_MAX_CODE_LENGTH,
            max_output_bytes: limits::DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn memory_limit(mut self, memory_limit: impl Into<String>) -> Self {
        self.memory_limit = memory_limit.into();
        self
    }

    pub fn cpu_quota(mut self, cpu_quota: i64) -> Self {
        self.cpu_quota = cpu_quota;
        self
    }

    pub fn pids_limit(mut self, pids_limit: i64) -> Self {
        self.pids_limit = pids_limit;
        self
    }

    pub fn tmpfs_size_mb(mut self, tmpfs_size_mb: u64) -> Self {
        self.tmpfs_size_mb = tmpfs_size_mb;
        self
    }

    pub fn network_enabled(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn max_code_length(mut self, max_code_length: usize) -> Self {
        self.max_code_length = max_code_length;
        self
    }

    pub fn max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Validate every field and produce the immutable config.
    pub fn build(self) -> Result<RuntimeConfig, SandboxError> {
        if !validation::is_valid_language_id(&self.language) {
            return Err(SandboxError::config(
                "language",
                format!(
                    "must be lowercase alphanumeric (plus '_', '+', '-'), got '{}'",
                    self.language
                ),
            ));
        }

        if self.image.len() > limits::MAX_IMAGE_NAME_LENGTH
            || !validation::is_safe_image_name(&self.image)
        {
            return Err(SandboxError::config(
                "image",
                format!(
                    "must contain only alphanumerics, ':', '/', '-' and '_', got '{}'",
                    self.image
                ),
            ));
        }

        if self.command.is_empty() {
            return Err(SandboxError::config("command", "must not be empty"));
        }
        for arg in &self.command {
            if arg.is_empty() || arg.contains('\0') {
                return Err(SandboxError::config(
                    "command",
                    "arguments must be non-empty and free of NUL bytes",
                ));
            }
            if validation::has_traversal_segment(arg) {
                return Err(SandboxError::config(
                    "command",
                    format!("argument '{}' contains a parent-directory segment", arg),
                ));
            }
        }

        check_range(
            "timeout_seconds",
            self.timeout_seconds,
            limits::MIN_TIMEOUT_SECONDS,
            limits::MAX_TIMEOUT_SECONDS,
        )?;

        let memory_limit = self.memory_limit.to_ascii_lowercase();
        let memory_bytes = validation::parse_memory_limit(&memory_limit).ok_or_else(|| {
            SandboxError::config(
                "memory_limit",
                format!(
                    "must be in format like '256m' or '1g', got '{}'",
                    self.memory_limit
                ),
            )
        })?;
        if !(limits::MIN_MEMORY_BYTES..=limits::MAX_MEMORY_BYTES).contains(&memory_bytes) {
            return Err(SandboxError::config(
                "memory_limit",
                format!("must be between 6m and 1g, got '{}'", self.memory_limit),
            ));
        }

        check_range(
            "cpu_quota",
            self.cpu_quota,
            limits::MIN_CPU_QUOTA,
            limits::MAX_CPU_QUOTA,
        )?;
        check_range(
            "pids_limit",
            self.pids_limit,
            limits::MIN_PIDS_LIMIT,
            limits::MAX_PIDS_LIMIT,
        )?;
        check_range(
            "tmpfs_size_mb",
            self.tmpfs_size_mb,
            limits::MIN_TMPFS_SIZE_MB,
            limits::MAX_TMPFS_SIZE_MB,
        )?;
        check_range(
            "max_code_length",
            self.max_code_length,
            limits::MIN_CODE_LENGTH,
            limits::MAX_CODE_LENGTH,
        )?;
        check_range(
            "max_output_bytes",
            self.max_output_bytes,
            limits::MIN_OUTPUT_BYTES,
            limits::MAX_OUTPUT_BYTES,
        )?;

        Ok(RuntimeConfig {
            language: self.language,
            image: self.image,
            command: self.command,
            timeout_seconds: self.timeout_seconds,
            memory_limit,
            memory_bytes,
            cpu_quota: self.cpu_quota,
            pids_limit: self.pids_limit,
            tmpfs_size_mb: self.tmpfs_size_mb,
            network_enabled: self.network_enabled,
            max_code_length: self.max_code_length,
            max_output_bytes: self.max_output_bytes,
        })
    }
}

impl RuntimeConfig {
    /// Builder seeded with this config's values, for deriving an override.
    pub fn to_builder(&self) -> RuntimeConfigBuilder {
        RuntimeConfigBuilder {
            language: self.language.clone(),
            image: self.image.clone(),
            command: self.command.clone(),
            timeout_seconds: self.timeout_seconds,
            memory_limit: self.memory_limit.clone(),
            cpu_quota: self.cpu_quota,
            pids_limit: self.pids_limit,
            tmpfs_size_mb: self.tmpfs_size_mb,
            network_enabled: self.network_enabled,
            max_code_length: self.max_code_length,
            max_output_bytes: self.max_output_bytes,
        }
    }
}

fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), SandboxError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(SandboxError::config(
            field,
            format!("must be between {} and {}, got {}", min, max, value),
        ));
    }
    Ok(())
}
