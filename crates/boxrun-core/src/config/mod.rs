//! Configuration for sandboxed runtimes
//!
//! [`RuntimeConfig`] is the validated, immutable description of one language
//! runtime. [`SandboxSettings`] is the operator-facing YAML layer that
//! produces those configs.

pub mod builder;
pub mod loader;
pub mod types;

pub use builder::RuntimeConfigBuilder;
pub use loader::*;
pub use types::*;


use crate::errors::SandboxError;
use std::path::Path;

/// Load sandbox settings from a YAML file
pub async fn load_settings<P: AsRef<Path>>(path: P) -> Result<SandboxSettings, SandboxError> {
    SettingsLoader::from_file(path).await
}
