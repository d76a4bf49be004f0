//! Built-in language profiles
//!
//! A profile is the static description of one language: the image it runs in,
//! the trusted definition that image is built from, the interpreter command
//! the code is appended to, and how code and tests are combined into a single
//! program.

use crate::config::RuntimeConfigBuilder;
use crate::executors::ImageDefinition;

/// How [`LanguageProfile::build_test_program`] combines code and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestHarness {
    /// Write code and tests to one module under the scratch mount and run
    /// pytest on it; the process exits with pytest's exit code.
    Pytest,
    /// Concatenate code and tests; failing assertions exit non-zero.
    Concatenate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: &'static str,
    pub image: &'static str,
    pub command: &'static [&'static str],
    pub image_definition: ImageDefinition,
    pub test_harness: TestHarness,
}

pub const PYTHON: LanguageProfile = LanguageProfile {
    language: "python",
    image: "boxrun-python:latest",
    command: &["python", "-c"],
    image_definition: ImageDefinition::new(include_str!("../../docker/Dockerfile.python")),
    test_harness: TestHarness::Pytest,
};

pub const JAVASCRIPT: LanguageProfile = LanguageProfile {
    language: "javascript",
    image: "boxrun-javascript:latest",
    command: &["node", "-e"],
    image_definition: ImageDefinition::new(include_str!("../../docker/Dockerfile.javascript")),
    test_harness: TestHarness::Concatenate,
};

static BUILTIN_PROFILES: [LanguageProfile; 2] = [PYTHON, JAVASCRIPT];

pub fn builtin_profiles() -> &'static [LanguageProfile] {
    &BUILTIN_PROFILES
}

pub fn find_profile(language: &str) -> Option<&'static LanguageProfile> {
    BUILTIN_PROFILES
        .iter()
        .find(|profile| profile.language == language)
}

impl LanguageProfile {
    /// Builder seeded with this profile's image, command and default limits.
    pub fn config_builder(&self) -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new(
            self.language,
            self.image,
            self.command.iter().map(|arg| arg.to_string()).collect(),
        )
    }

    /// Combine `code` and `tests` into one program for this language.
    pub fn build_test_program(&self, code: &str, tests: &str) -> String {
        match self.test_harness {
            TestHarness::Concatenate => format!("{}\n\n{}", code, tests),
            TestHarness::Pytest => pytest_program(code, tests),
        }
    }
}

fn pytest_program(code: &str, tests: &str) -> String {
    let module = format!("{}\n\n{}\n", code, tests);
    // A JSON string literal is also a valid Python string literal, so the
    // payload is embedded as data and never spliced into the wrapper source.
    let literal = serde_json::Value::String(module).to_string();

    format!(
        r#"import os
import sys
import tempfile

sys.dont_write_bytecode = True
_fd, _path = tempfile.mkstemp(prefix="test_boxrun_", suffix=".py", dir="/tmp")
with os.fdopen(_fd, "w", encoding="utf-8") as _module:
    _module.write({literal})

try:
    import pytest
    _status = pytest.main([_path, "-q", "--tb=short", "-p", "no:cacheprovider"])
finally:
    os.remove(_path)
sys.exit(int(_status))
"#,
        literal = literal
    )
}
