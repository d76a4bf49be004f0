//! Security policy for sandbox containers
//!
//! [`SecurityPolicyBuilder::build`] derives every isolation parameter from a
//! validated [`RuntimeConfig`]. The rules are fixed; only the bounded config
//! fields (memory, CPU, PIDs, scratch size, network opt-in) vary.
//!
//! The seccomp profile is read and checked on every build. A profile that is
//! missing, unreadable or not a deny-by-default allow-list refuses the run with
//! [`SandboxError::SecurityProfile`]. There is no unfiltered fallback.

use crate::config::{limits, RuntimeConfig};
use crate::errors::SandboxError;
use bollard::models::HostConfig;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Mount point of the only writable filesystem inside the sandbox.
pub const SCRATCH_MOUNT: &str = "/tmp";
/// Non-root identity the sandboxed process runs as.
pub const SANDBOX_USER: &str = "10001:10001";

const DENY_ACTIONS: &[&str] = &[
    "SCMP_ACT_ERRNO",
    "SCMP_ACT_KILL",
    "SCMP_ACT_KILL_PROCESS",
    "SCMP_ACT_KILL_THREAD",
    "SCMP_ACT_TRAP",
];

const KNOWN_ACTIONS: &[&str] = &[
    "SCMP_ACT_ALLOW",
    "SCMP_ACT_ERRNO",
    "SCMP_ACT_KILL",
    "SCMP_ACT_KILL_PROCESS",
    "SCMP_ACT_KILL_THREAD",
    "SCMP_ACT_TRAP",
    "SCMP_ACT_TRACE",
    "SCMP_ACT_LOG",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NetworkMode {
    None,
    Bridge,
}

impl NetworkMode {
    fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::None => "none",
            NetworkMode::Bridge => "bridge",
        }
    }
}

/// Concrete isolation parameters for one execution.
///
/// Opaque outside this crate; the lifecycle manager hands it to the engine.
#[derive(Debug, Clone)]
pub struct AppliedPolicy {
    network: NetworkMode,
    readonly_rootfs: bool,
    scratch_options: String,
    cap_drop: Vec<String>,
    security_opt: Vec<String>,
    memory_bytes: i64,
    cpu_quota: i64,
    pids_limit: i64,
    user: String,
}

impl AppliedPolicy {
    pub(crate) fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn network_disabled(&self) -> bool {
        self.network == NetworkMode::None
    }

    /// Engine host configuration enforcing this policy.
    pub(crate) fn host_config(&self) -> HostConfig {
        let mut tmpfs = HashMap::new();
        tmpfs.insert(SCRATCH_MOUNT.to_string(), self.scratch_options.clone());

        HostConfig {
            network_mode: Some(self.network.as_str().to_string()),
            readonly_rootfs: Some(self.readonly_rootfs),
            tmpfs: Some(tmpfs),
            cap_drop: Some(self.cap_drop.clone()),
            cap_add: Some(Vec::new()),
            security_opt: Some(self.security_opt.clone()),
            privileged: Some(false),
            memory: Some(self.memory_bytes),
            memory_swap: Some(self.memory_bytes),
            cpu_quota: Some(self.cpu_quota),
            cpu_period: Some(limits::CPU_PERIOD),
            pids_limit: Some(self.pids_limit),
            auto_remove: Some(false),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeccompDocument {
    default_action: String,
    #[serde(default)]
    syscalls: Vec<SyscallRule>,
}

#[derive(Debug, Deserialize)]
struct SyscallRule {
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    name: Option<String>,
    action: String,
}

/// A parsed, checked seccomp allow-list.
#[derive(Debug, Clone)]
pub struct SeccompProfile {
    compact_json: String,
    allowed_syscalls: usize,
}

impl SeccompProfile {
    /// Read and check the profile at `path`.
    pub async fn load(path: &Path) -> Result<Self, SandboxError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SandboxError::SecurityProfile(format!(
                "failed to read seccomp profile {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content).map_err(|e| match e {
            SandboxError::SecurityProfile(reason) => SandboxError::SecurityProfile(format!(
                "{} ({})",
                reason,
                path.display()
            )),
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, SandboxError> {
        let value: Value = serde_json::from_str(content).map_err(|e| {
            SandboxError::SecurityProfile(format!("seccomp profile is not valid JSON: {}", e))
        })?;
        let document: SeccompDocument = serde_json::from_value(value.clone()).map_err(|e| {
            SandboxError::SecurityProfile(format!("seccomp profile has an invalid structure: {}", e))
        })?;

        if !DENY_ACTIONS.contains(&document.default_action.as_str()) {
            return Err(SandboxError::SecurityProfile(format!(
                "seccomp profile must deny by default, found defaultAction '{}'",
                document.default_action
            )));
        }
        if document.syscalls.is_empty() {
            return Err(SandboxError::SecurityProfile(
                "seccomp profile lists no syscall rules".to_string(),
            ));
        }

        let mut allowed_syscalls = 0;
        for rule in &document.syscalls {
            if !KNOWN_ACTIONS.contains(&rule.action.as_str()) {
                return Err(SandboxError::SecurityProfile(format!(
                    "seccomp rule uses unknown action '{}'",
                    rule.action
                )));
            }
            let count = rule.names.len() + usize::from(rule.name.is_some());
            if count == 0 {
                return Err(SandboxError::SecurityProfile(
                    "seccomp rule names no syscalls".to_string(),
                ));
            }
            if rule.action == "SCMP_ACT_ALLOW" {
                allowed_syscalls += count;
            }
        }
        if allowed_syscalls == 0 {
            return Err(SandboxError::SecurityProfile(
                "seccomp profile allows no syscalls".to_string(),
            ));
        }

        Ok(Self {
            compact_json: value.to_string(),
            allowed_syscalls,
        })
    }

    pub fn allowed_syscalls(&self) -> usize {
        self.allowed_syscalls
    }

    fn security_opt(&self) -> String {
        format!("seccomp={}", self.compact_json)
    }
}

/// Derives [`AppliedPolicy`] values from runtime configs.
#[derive(Debug, Clone)]
pub struct SecurityPolicyBuilder {
    seccomp_profile_path: PathBuf,
}

impl SecurityPolicyBuilder {
    pub fn new(seccomp_profile_path: impl Into<PathBuf>) -> Self {
        Self {
            seccomp_profile_path: seccomp_profile_path.into(),
        }
    }

    pub fn seccomp_profile_path(&self) -> &Path {
        &self.seccomp_profile_path
    }

    pub async fn build(&self, config: &RuntimeConfig) -> Result<AppliedPolicy, SandboxError> {
        let profile = SeccompProfile::load(&self.seccomp_profile_path).await?;
        log::debug!(
            "Loaded seccomp profile with {} allowed syscalls for '{}'",
            profile.allowed_syscalls(),
            config.language()
        );

        let memory_bytes = i64::try_from(config.memory_bytes())
            .map_err(|_| SandboxError::config("memory_limit", "exceeds engine range"))?;

        Ok(AppliedPolicy {
            network: if config.network_enabled() {
                NetworkMode::Bridge
            } else {
                NetworkMode::None
            },
            readonly_rootfs: true,
            scratch_options: format!(
                "rw,noexec,nosuid,nodev,size={}m,mode=1777",
                config.tmpfs_size_mb()
            ),
            cap_drop: vec!["ALL".to_string()],
            security_opt: vec!["no-new-privileges:true".to_string(), profile.security_opt()],
            memory_bytes,
            cpu_quota: config.cpu_quota(),
            pids_limit: config.pids_limit(),
            user: SANDBOX_USER.to_string(),
        })
    }
}
