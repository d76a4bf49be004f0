//! The `execute_code` tool
//!
//! Resolves a runtime from the registry, runs the code and renders the
//! [`ExecutionResult`] into the text an agent reads. Problems with the request
//! itself (no code, bad timeout, unknown language, oversized payload) come
//! back as `Error: ...` text so the agent can correct itself. A sandbox that
//! cannot establish its security policy is reported as `Err`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::errors::SandboxError;
use crate::executors::ExecutionResult;
use crate::runtimes::RuntimeRegistry;
use crate::tools::{Tool, ToolMetadata};
use crate::validation;

pub const TOOL_NAME: &str = "execute_code";

/// Render a result as agent-facing text.
///
/// `timeout_seconds` is the effective deadline of the run.
pub fn render_result(result: &ExecutionResult, timeout_seconds: u64) -> String {
    if result.timed_out {
        return format!("Execution timed out after {} seconds", timeout_seconds);
    }

    if result.success {
        if result.stdout.trim().is_empty() {
            "Execution successful (no output)".to_string()
        } else {
            format!("Execution successful:\n{}", result.stdout)
        }
    } else {
        let detail = if !result.stderr.trim().is_empty() {
            result.stderr.as_str()
        } else {
            result.error_message.as_deref().unwrap_or("Unknown error")
        };
        format!("Execution failed:\n{}", detail)
    }
}

fn request_error(err: &SandboxError) -> String {
    format!("Error: {}", err.user_message())
}

pub struct ExecuteCodeTool {
    registry: Arc<RuntimeRegistry>,
    default_language: String,
}

impl ExecuteCodeTool {
    pub fn new(registry: Arc<RuntimeRegistry>, default_language: impl Into<String>) -> Self {
        Self {
            registry,
            default_language: default_language.into(),
        }
    }

    fn parse_timeout(arguments: &Value) -> Result<Option<u64>, String> {
        let raw = arguments
            .get("timeout")
            .or_else(|| arguments.get("timeoutSeconds"))
            .filter(|value| !value.is_null());
        let Some(raw) = raw else {
            return Ok(None);
        };

        let seconds = raw
            .as_i64()
            .ok_or_else(|| "Error: Timeout must be a whole number of seconds.".to_string())?;
        validation::check_timeout(seconds)
            .map(Some)
            .map_err(|e| request_error(&e))
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: TOOL_NAME.to_string(),
            description: "Run code in an isolated sandbox with no network access and return its output."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Source code to execute"
                    },
                    "timeout": {
                        "type": "integer",
                        "description": "Timeout in seconds",
                        "minimum": 1,
                        "maximum": 300
                    },
                    "language": {
                        "type": "string",
                        "description": "Language of the code",
                        "enum": self.registry.languages(),
                        "default": self.default_language
                    }
                },
                "required": ["code"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<String, SandboxError> {
        let code = arguments.get("code").and_then(|v| v.as_str()).unwrap_or("");
        if code.trim().is_empty() {
            return Ok(request_error(&SandboxError::EmptyCode));
        }

        let timeout = match Self::parse_timeout(&arguments) {
            Ok(timeout) => timeout,
            Err(message) => return Ok(message),
        };

        let language = arguments
            .get("language")
            .and_then(|v| v.as_str())
            .unwrap_or(self.default_language.as_str());
        let runtime = match self.registry.resolve(language) {
            Ok(runtime) => runtime,
            Err(e @ SandboxError::UnknownRuntime { .. }) => return Ok(request_error(&e)),
            Err(e) => return Err(e),
        };

        let effective_timeout = timeout.unwrap_or_else(|| runtime.config().timeout_seconds());
        match runtime.run(code, timeout).await {
            Ok(result) => Ok(render_result(&result, effective_timeout)),
            Err(e) if e.is_request_error() => {
                log::debug!("Rejected {} request: {}", TOOL_NAME, e);
                Ok(request_error(&e))
            }
            Err(e) => {
                log::error!("{} refused: {}", TOOL_NAME, e);
                Err(e)
            }
        }
    }
}
