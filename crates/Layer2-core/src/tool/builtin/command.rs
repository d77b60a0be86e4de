//! run_command - shell 명령 실행 도구

use super::sink::{CommandRequest, CommandSink};
use crate::tool::{ToolDescriptor, ToolHandler};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolforge_foundation::{Error, PermissionAction, PermissionPolicy, Result};

#[derive(Debug, Deserialize)]
struct RunCommandInput {
    command: String,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub struct RunCommandTool {
    sink: Arc<dyn CommandSink>,
}

impl RunCommandTool {
    pub const NAME: &'static str = "run_command";

    const DEFAULT_TIMEOUT_MS: u64 = 30_000;
    const MAX_TIMEOUT_MS: u64 = 120_000;

    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self { sink }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::builtin(Self::NAME)
            .description("Run a shell command and return its stdout, stderr and exit code")
            .permission(PermissionPolicy::Ask)
            .schema(json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The command to execute"
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory"
                    },
                    "timeout_ms": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Optional timeout in milliseconds (max 120000)"
                    }
                },
                "required": ["command"]
            }))
    }
}

#[async_trait]
impl ToolHandler for RunCommandTool {
    async fn call(&self, args: Value) -> Result<Value> {
        let input: RunCommandInput = serde_json::from_value(args)
            .map_err(|e| Error::InvalidInput(format!("Invalid input: {}", e)))?;
        if input.command.trim().is_empty() {
            return Err(Error::InvalidInput("Command cannot be empty".to_string()));
        }

        let timeout_ms = input
            .timeout_ms
            .unwrap_or(Self::DEFAULT_TIMEOUT_MS)
            .min(Self::MAX_TIMEOUT_MS);
        let output = self
            .sink
            .run(
                CommandRequest::new(input.command, Duration::from_millis(timeout_ms))
                    .cwd(input.cwd),
            )
            .await
            .map_err(|e| Error::tool_execution(Self::NAME, e.to_string()))?;

        Ok(serde_json::to_value(output)?)
    }

    fn permission_action(&self, _descriptor: &ToolDescriptor, args: &Value) -> PermissionAction {
        PermissionAction::Execute {
            command: args
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::builtin::CommandOutput;
    use std::sync::Mutex;

    /// Records requests, answers with a fixed output
    #[derive(Default)]
    struct RecordingSink {
        requests: Mutex<Vec<CommandRequest>>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn run(&self, request: CommandRequest) -> Result<CommandOutput> {
            self.requests.lock().unwrap().push(request);
            Ok(CommandOutput {
                stdout: "ok\n".into(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_capped() {
        let sink = Arc::new(RecordingSink::default());
        let tool = RunCommandTool::new(sink.clone());
        let out = tool
            .call(json!({"command": "ls", "timeout_ms": 999_999}))
            .await
            .unwrap();
        assert_eq!(out["stdout"], "ok\n");
        assert_eq!(out["exit_code"], 0);

        let requests = sink.requests.lock().unwrap();
        assert_eq!(requests[0].timeout, Duration::from_millis(120_000));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let tool = RunCommandTool::new(Arc::new(RecordingSink::default()));
        assert!(matches!(
            tool.call(json!({"command": "  "})).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_permission_action() {
        let tool = RunCommandTool::new(Arc::new(RecordingSink::default()));
        let action =
            tool.permission_action(&RunCommandTool::descriptor(), &json!({"command": "rm -rf x"}));
        assert_eq!(
            action,
            PermissionAction::Execute {
                command: "rm -rf x".into()
            }
        );
    }
}
