pub mod fake_engine;

pub use fake_engine::{FakeEngine, Scripted};

use crate::config::{RuntimeConfig, RuntimeConfigBuilder};
use std::io::Write;
use tempfile::NamedTempFile;

pub const TEST_SECCOMP_PROFILE: &str = r#"{
    "defaultAction": "SCMP_ACT_ERRNO",
    "syscalls": [{"names": ["read", "write", "exit_group"], "action": "SCMP_ACT_ALLOW"}]
}"#;

/// A valid seccomp profile on disk; keep the handle alive for the test.
pub fn seccomp_profile_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(TEST_SECCOMP_PROFILE.as_bytes()).unwrap();
    file
}

pub fn python_config() -> RuntimeConfig {
    RuntimeConfigBuilder::new(
        "python",
        "boxrun-python:latest",
        vec!["python".to_string(), "-c".to_string()],
    )
    .build()
    .unwrap()
}
