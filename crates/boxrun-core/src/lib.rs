//! Sandboxed execution runtime for untrusted, generated code.
//!
//! Each request runs in a fresh, single-use container with no network, a
//! read-only root filesystem, a small non-executable scratch mount, dropped
//! capabilities, a deny-by-default seccomp filter and hard memory, CPU, PID
//! and wall-clock limits. The container is removed before the call returns,
//! whatever the outcome.
//!
//! # Architecture Overview
//!
//! - **Configuration** ([`config`]): validated per-language [`RuntimeConfig`]s
//!   and the YAML settings layer that produces them
//! - **Validation gate** ([`validation`]): pure request checks that run before
//!   any engine call
//! - **Executors** ([`executors`]): security policy, image provisioning and the
//!   container lifecycle, behind the [`executors::ContainerEngine`] seam
//! - **Runtimes** ([`runtimes`]): the [`Runtime`] trait, built-in language
//!   profiles and the [`RuntimeRegistry`]
//! - **Tools** ([`tools`]): the `execute_code` adapter an agent loop calls

pub mod config;
pub mod errors;
pub mod executors;
pub mod runtimes;
pub mod tools;
pub mod validation;

pub use config::{RuntimeConfig, RuntimeConfigBuilder, SandboxSettings, SettingsLoader};
pub use errors::SandboxError;
pub use executors::{ContainerLifecycleManager, ExecutionRequest, ExecutionResult};
pub use runtimes::{DefaultRuntimes, Runtime, RuntimeRegistry};
pub use tools::{ExecuteCodeTool, Tool};

#[cfg(test)]
pub mod test_utils;
