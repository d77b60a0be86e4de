//! Process-backed tools
//!
//! - `ProcessToolHandler`: `tools/call` 왕복
//! - `ToolSync`: `tools/list` 로 provider 도구를 registry 에 반영

use super::{ToolDescriptor, ToolHandler, ToolRegistry};
use crate::process::{ProcessSupervisor, TOOLS_CALL, TOOLS_LIST};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use toolforge_foundation::{Error, Result};
use tracing::{debug, info, warn};

/// One entry of a `tools/list` result
#[derive(Debug, Clone, Deserialize)]
struct ListedTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ListResult {
    #[serde(default)]
    tools: Vec<ListedTool>,
}

#[derive(Debug, Default, Deserialize)]
struct CallResult {
    #[serde(default, rename = "isError")]
    is_error: bool,
    #[serde(default)]
    content: Vec<Value>,
}

impl CallResult {
    /// `{"type": "text", "text": ...}` 항목을 줄바꿈으로 연결
    fn text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .content
            .iter()
            .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

// ============================================================================
// ProcessToolHandler
// ============================================================================

pub struct ProcessToolHandler {
    supervisor: ProcessSupervisor,
    server_id: String,
    tool_name: String,
}

impl ProcessToolHandler {
    pub fn new(
        supervisor: ProcessSupervisor,
        server_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            supervisor,
            server_id: server_id.into(),
            tool_name: tool_name.into(),
        }
    }

    fn tool_id(&self) -> String {
        format!("{}:{}", self.server_id, self.tool_name)
    }
}

#[async_trait]
impl ToolHandler for ProcessToolHandler {
    async fn call(&self, args: Value) -> Result<Value> {
        let result = self
            .supervisor
            .send(
                &self.server_id,
                TOOLS_CALL,
                json!({"name": self.tool_name, "arguments": args}),
            )
            .await?;

        let parsed: CallResult = match serde_json::from_value(result.clone()) {
            Ok(p) => p,
            // not the content envelope, pass through
            Err(_) => return Ok(result),
        };

        if parsed.is_error {
            let message = parsed
                .text()
                .unwrap_or_else(|| "Provider reported an error".to_string());
            return Err(Error::tool_execution(self.tool_id(), message));
        }

        Ok(parsed.text().map(Value::String).unwrap_or(result))
    }
}

// ============================================================================
// ToolSync
// ============================================================================

/// Mirrors each provider's `tools/list` into the registry
#[derive(Clone)]
pub struct ToolSync {
    supervisor: ProcessSupervisor,
    registry: Arc<ToolRegistry>,
}

impl ToolSync {
    pub fn new(supervisor: ProcessSupervisor, registry: Arc<ToolRegistry>) -> Self {
        Self {
            supervisor,
            registry,
        }
    }

    /// Returns the number of tools the server currently lists.
    pub async fn sync_server(&self, server_id: &str) -> Result<usize> {
        let result = self.supervisor.send(server_id, TOOLS_LIST, json!({})).await?;
        let listed: ListResult = serde_json::from_value(result).map_err(|e| Error::Remote {
            server_id: server_id.to_string(),
            message: format!("Malformed tools/list result: {}", e),
        })?;

        let mut seen = HashSet::new();
        for tool in listed.tools {
            let mut descriptor = ToolDescriptor::process(server_id, &tool.name).description(
                tool.description
                    .unwrap_or_else(|| format!("Tool from {}", server_id)),
            );
            if let Some(schema) = tool.input_schema {
                descriptor = descriptor.schema(schema);
            }
            seen.insert(descriptor.id.clone());

            let handler = ProcessToolHandler::new(self.supervisor.clone(), server_id, tool.name);
            self.registry.register(descriptor, Some(Arc::new(handler)))?;
        }

        for stale in self.registry.ids_for_server(server_id) {
            if !seen.contains(&stale) {
                debug!(server_id, tool_id = %stale, "Removing tool no longer listed");
                if let Err(e) = self.registry.remove(&stale) {
                    warn!(server_id, tool_id = %stale, error = %e, "Failed to remove stale tool");
                }
            }
        }

        info!(server_id, count = seen.len(), "Synced provider tools");
        Ok(seen.len())
    }

    /// 서버의 모든 도구 제거
    pub fn unsync_server(&self, server_id: &str) -> usize {
        let ids = self.registry.ids_for_server(server_id);
        let mut removed = 0;
        for id in ids {
            if self.registry.remove(&id).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(server_id, removed, "Removed provider tools");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_result_text_joined() {
        let parsed: CallResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "a"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "b"}
            ]
        }))
        .unwrap();
        assert!(!parsed.is_error);
        assert_eq!(parsed.text().as_deref(), Some("a\nb"));
    }

    #[test]
    fn test_list_result_defaults() {
        let listed: ListResult = serde_json::from_value(json!({
            "tools": [{"name": "add", "inputSchema": {"type": "object"}}, {"name": "bare"}]
        }))
        .unwrap();
        assert_eq!(listed.tools.len(), 2);
        assert!(listed.tools[1].input_schema.is_none());
    }
}
