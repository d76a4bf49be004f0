//! Runtime configuration value types
//!
//! A [`RuntimeConfig`] can only be obtained from
//! [`RuntimeConfigBuilder::build`](crate::config::RuntimeConfigBuilder::build),
//! which checks every field against the bounds in [`limits`]. Code downstream
//! of construction never sees a partially valid configuration.

use serde::Serialize;

/// Hard bounds applied to every runtime configuration.
pub mod limits {
    pub const MIN_TIMEOUT_SECONDS: u64 = 1;
    pub const MAX_TIMEOUT_SECONDS: u64 = 300;
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

    /// Smallest memory ceiling the container engine accepts.
    pub const MIN_MEMORY_BYTES: u64 = 6 * 1024 * 1024;
    pub const MAX_MEMORY_BYTES: u64 = 1024 * 1024 * 1024;
    pub const DEFAULT_MEMORY_LIMIT: &str = "256m";

    pub const MIN_CPU_QUOTA: i64 = 1_000;
    pub const MAX_CPU_QUOTA: i64 = 1_000_000;
    /// Half of one core.
    pub const DEFAULT_CPU_QUOTA: i64 = 50_000;
    pub const CPU_PERIOD: i64 = 100_000;

    pub const MIN_PIDS_LIMIT: i64 = 1;
    pub const MAX_PIDS_LIMIT: i64 = 512;
    pub const DEFAULT_PIDS_LIMIT: i64 = 50;

    pub const MIN_TMPFS_SIZE_MB: u64 = 1;
    pub const MAX_TMPFS_SIZE_MB: u64 = 256;
    pub const DEFAULT_TMPFS_SIZE_MB: u64 = 10;

    pub const MIN_CODE_LENGTH: usize = 1;
    pub const MAX_CODE_LENGTH: usize = 200_000;
    pub const DEFAULT_MAX_CODE_LENGTH: usize = 50_000;

    pub const MIN_OUTPUT_BYTES: usize = 1024;
    pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
    pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 256 * 1024;

    pub const MAX_IMAGE_NAME_LENGTH: usize = 255;
}

/// Validated configuration for one language runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    pub(crate) language: String,
    pub(crate) image: String,
    pub(crate) command: Vec<String>,
    pub(crate) timeout_seconds: u64,
    pub(crate) memory_limit: String,
    pub(crate) memory_bytes: u64,
    pub(crate) cpu_quota: i64,
    pub(crate) pids_limit: i64,
    pub(crate) tmpfs_size_mb: u64,
    pub(crate) network_enabled: bool,
    pub(crate) max_code_length: usize,
    pub(crate) max_output_bytes: usize,
}

impl RuntimeConfig {
    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Interpreter argument vector. The code payload is appended as one extra argument.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// Memory ceiling as written in configuration, normalized to lowercase.
    pub fn memory_limit(&self) -> &str {
        &self.memory_limit
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn cpu_quota(&self) -> i64 {
        self.cpu_quota
    }

    pub fn pids_limit(&self) -> i64 {
        self.pids_limit
    }

    pub fn tmpfs_size_mb(&self) -> u64 {
        self.tmpfs_size_mb
    }

    pub fn network_enabled(&self) -> bool {
        self.network_enabled
    }

    pub fn max_code_length(&self) -> usize {
        self.max_code_length
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }
}
