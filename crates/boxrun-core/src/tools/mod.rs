//! Tool adapters for agent integration
//!
//! An agent loop sees the sandbox as a tool: it sends JSON arguments and gets
//! a rendered string back. The loop itself lives outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SandboxError;

pub mod execute;

pub use execute::{render_result, ExecuteCodeTool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;
    async fn execute(&self, arguments: Value) -> Result<String, SandboxError>;
}
