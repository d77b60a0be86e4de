//! read_file / write_file

use super::sink::FileSink;
use crate::tool::{ToolDescriptor, ToolHandler};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use toolforge_foundation::{Error, PermissionAction, PermissionPolicy, Result};

fn path_arg(args: &Value) -> String {
    args.get("path")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// read_file
// ============================================================================

#[derive(Debug, Deserialize)]
struct ReadInput {
    path: PathBuf,
}

pub struct ReadFileTool {
    sink: Arc<dyn FileSink>,
}

impl ReadFileTool {
    pub const NAME: &'static str = "read_file";

    pub fn new(sink: Arc<dyn FileSink>) -> Self {
        Self { sink }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::builtin(Self::NAME)
            .description("Read a UTF-8 text file")
            .permission(PermissionPolicy::Allow)
            .schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"}
                },
                "required": ["path"]
            }))
    }
}

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn call(&self, args: Value) -> Result<Value> {
        let input: ReadInput = serde_json::from_value(args)
            .map_err(|e| Error::InvalidInput(format!("Invalid input: {}", e)))?;
        let content = self.sink.read(&input.path).await?;
        Ok(json!({
            "path": input.path,
            "content": content,
        }))
    }

    fn permission_action(&self, _descriptor: &ToolDescriptor, args: &Value) -> PermissionAction {
        PermissionAction::FileRead {
            path: path_arg(args),
        }
    }
}

// ============================================================================
// write_file
// ============================================================================

#[derive(Debug, Deserialize)]
struct WriteInput {
    path: PathBuf,
    content: String,
}

pub struct WriteFileTool {
    sink: Arc<dyn FileSink>,
}

impl WriteFileTool {
    pub const NAME: &'static str = "write_file";

    pub fn new(sink: Arc<dyn FileSink>) -> Self {
        Self { sink }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::builtin(Self::NAME)
            .description("Write a text file, creating parent directories")
            .permission(PermissionPolicy::Ask)
            .schema(json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path"},
                    "content": {"type": "string", "description": "Content to write"}
                },
                "required": ["path", "content"]
            }))
    }
}

#[async_trait]
impl ToolHandler for WriteFileTool {
    async fn call(&self, args: Value) -> Result<Value> {
        let input: WriteInput = serde_json::from_value(args)
            .map_err(|e| Error::InvalidInput(format!("Invalid input: {}", e)))?;
        let bytes = self.sink.write(&input.path, &input.content).await?;
        Ok(json!({
            "path": input.path,
            "bytes_written": bytes,
        }))
    }

    fn permission_action(&self, _descriptor: &ToolDescriptor, args: &Value) -> PermissionAction {
        PermissionAction::FileWrite {
            path: path_arg(args),
        }
    }
}
