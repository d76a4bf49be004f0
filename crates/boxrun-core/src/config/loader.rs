//! Settings loader for YAML files and environment overrides
//!
//! Settings are the operator-facing knobs: where the seccomp profile lives and
//! per-language overrides of the profile defaults. Loading resolves every
//! language's [`RuntimeConfig`] eagerly, so an out-of-bounds value fails here
//! rather than on the first execution.

use crate::config::types::RuntimeConfig;
use crate::config::builder::RuntimeConfigBuilder;
use crate::errors::SandboxError;
use crate::runtimes::profile::{self, LanguageProfile};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const SECCOMP_PROFILE_ENV: &str = "BOXRUN_SECCOMP_PROFILE";
pub const DEFAULT_TIMEOUT_ENV: &str = "BOXRUN_DEFAULT_TIMEOUT";

/// Seccomp allow-list shipped with this crate.
pub fn default_seccomp_profile_path() -> PathBuf {
    PathBuf::from(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/docker/seccomp-profile.json"
    ))
}

/// Top-level sandbox settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxSettings {
    #[serde(default = "default_seccomp_profile_path")]
    pub seccomp_profile_path: PathBuf,
    /// Applied to every runtime that does not set its own timeout.
    #[serde(default)]
    pub default_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub runtimes: HashMap<String, RuntimeOverrides>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            seccomp_profile_path: default_seccomp_profile_path(),
            default_timeout_seconds: None,
            runtimes: HashMap::new(),
        }
    }
}

/// Per-language overrides. Unset fields keep the language profile defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeOverrides {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub cpu_quota: Option<i64>,
    #[serde(default)]
    pub pids_limit: Option<i64>,
    #[serde(default)]
    pub tmpfs_size_mb: Option<u64>,
    #[serde(default)]
    pub network_enabled: Option<bool>,
    #[serde(default)]
    pub max_code_length: Option<usize>,
    #[serde(default)]
    pub max_output_bytes: Option<usize>,
}

impl RuntimeOverrides {
    fn apply(&self, mut builder: RuntimeConfigBuilder) -> RuntimeConfigBuilder {
        if let Some(image) = &self.image {
            builder = builder.image(image.clone());
        }
        if let Some(timeout) = self.timeout_seconds {
            builder = builder.timeout_seconds(timeout);
        }
        if let Some(memory) = &self.memory_limit {
            builder = builder.memory_limit(memory.clone());
        }
        if let Some(quota) = self.cpu_quota {
            builder = builder.cpu_quota(quota);
        }
        if let Some(pids) = self.pids_limit {
            builder = builder.pids_limit(pids);
        }
        if let Some(size) = self.tmpfs_size_mb {
            builder = builder.tmpfs_size_mb(size);
        }
        if let Some(enabled) = self.network_enabled {
            builder = builder.network_enabled(enabled);
        }
        if let Some(max) = self.max_code_length {
            builder = builder.max_code_length(max);
        }
        if let Some(max) = self.max_output_bytes {
            builder = builder.max_output_bytes(max);
        }
        builder
    }
}

impl SandboxSettings {
    /// Resolve the effective config for one language profile.
    pub fn runtime_config(&self, profile: &LanguageProfile) -> Result<RuntimeConfig, SandboxError> {
        let mut builder = profile.config_builder();
        if let Some(timeout) = self.default_timeout_seconds {
            builder = builder.timeout_seconds(timeout);
        }
        if let Some(overrides) = self.runtimes.get(profile.language) {
            builder = overrides.apply(builder);
        }
        builder.build()
    }

    /// Check paths, language keys and every resolvable runtime config.
    pub fn validate(&self) -> Result<(), SandboxError> {
        let profile_path = self.seccomp_profile_path.to_string_lossy();
        validation::ensure_safe_path("seccomp_profile_path", &profile_path)?;

        for language in self.runtimes.keys() {
            if profile::find_profile(language).is_none() {
                return Err(SandboxError::Settings(format!(
                    "overrides given for unknown language '{}'",
                    language
                )));
            }
        }

        for profile in profile::builtin_profiles() {
            self.runtime_config(profile)?;
        }
        Ok(())
    }
}

/// Loads [`SandboxSettings`] from YAML with environment resolution.
pub struct SettingsLoader;

impl SettingsLoader {
    /// Load settings from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<SandboxSettings, SandboxError> {
        let path = path.as_ref();
        validation::ensure_safe_path("settings path", &path.to_string_lossy())?;

        let content = fs::read_to_string(path).await.map_err(|e| {
            SandboxError::Settings(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load settings from a YAML string
    pub fn from_str(content: &str) -> Result<SandboxSettings, SandboxError> {
        let mut settings: SandboxSettings = if content.trim().is_empty() {
            SandboxSettings::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| SandboxError::Settings(format!("Failed to parse YAML settings: {}", e)))?
        };

        Self::apply_env_overrides(&mut settings)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<SandboxSettings, SandboxError> {
        Self::from_str("")
    }

    fn apply_env_overrides(settings: &mut SandboxSettings) -> Result<(), SandboxError> {
        if let Ok(path) = env::var(SECCOMP_PROFILE_ENV) {
            if !path.trim().is_empty() {
                log::debug!("Seccomp profile path overridden from {}", SECCOMP_PROFILE_ENV);
                settings.seccomp_profile_path = PathBuf::from(path);
            }
        }

        if let Ok(raw) = env::var(DEFAULT_TIMEOUT_ENV) {
            let timeout = raw.trim().parse::<u64>().map_err(|_| {
                SandboxError::Settings(format!(
                    "{} must be a positive integer, got '{}'",
                    DEFAULT_TIMEOUT_ENV, raw
                ))
            })?;
            settings.default_timeout_seconds = Some(timeout);
        }

        Ok(())
    }
}
