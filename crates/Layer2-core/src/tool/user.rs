//! User-defined tools - `[[tools]]` command templates
//!
//! ```toml
//! [[tools]]
//! id = "greet"
//! command = "echo hello {{name}}"
//! schema = { type = "object", properties = { name = { type = "string" } }, required = ["name"] }
//! ```
//!
//! Placeholder values are shell-quoted, so `{{name}}` = `a; rm -rf /` stays a
//! single argument.

use super::builtin::{CommandRequest, CommandSink};
use super::{ToolDescriptor, ToolHandler};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use toolforge_foundation::{Error, PermissionAction, Result, UserToolConfig};

pub struct UserCommandTool {
    id: String,
    template: String,
    cwd: Option<PathBuf>,
    timeout: Duration,
    sink: Arc<dyn CommandSink>,
}

impl UserCommandTool {
    pub fn new(config: &UserToolConfig, sink: Arc<dyn CommandSink>, timeout: Duration) -> Self {
        Self {
            id: config.id.clone(),
            template: config.command.clone(),
            cwd: config.cwd.clone(),
            timeout,
            sink,
        }
    }

    pub fn descriptor(config: &UserToolConfig) -> ToolDescriptor {
        let mut descriptor = ToolDescriptor::user(
            &config.id,
            config.name.clone().unwrap_or_else(|| config.id.clone()),
        )
        .description(&config.description)
        .schema(config.schema.clone())
        .enabled(config.enabled);
        descriptor.rate_limit = config.rate_limit.clone();
        descriptor.permission = config.permission;
        descriptor
    }

    /// `{{param}}` → shell-quoted value. Missing params become `''`.
    pub fn render(&self, args: &Value) -> Result<String> {
        render_template(&self.template, args)
    }
}

pub fn render_template(template: &str, args: &Value) -> Result<String> {
    let re = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
        .map_err(|e| Error::Internal(format!("Invalid placeholder pattern: {}", e)))?;

    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in re.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        rendered.push_str(&template[last..whole.start()]);

        let raw = match args.get(name.as_str()) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let quoted = shlex::try_quote(&raw).map_err(|e| {
            Error::InvalidInput(format!("Cannot quote '{}': {}", name.as_str(), e))
        })?;
        rendered.push_str(&quoted);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

#[async_trait]
impl ToolHandler for UserCommandTool {
    async fn call(&self, args: Value) -> Result<Value> {
        let command = self.render(&args)?;
        let output = self
            .sink
            .run(CommandRequest::new(command, self.timeout).cwd(self.cwd.clone()))
            .await
            .map_err(|e| Error::tool_execution(&self.id, e.to_string()))?;

        if !output.success() {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(Error::tool_execution(
                &self.id,
                format!(
                    "exited with {}: {}",
                    output
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string()),
                    detail
                ),
            ));
        }

        Ok(serde_json::to_value(output)?)
    }

    fn permission_action(&self, _descriptor: &ToolDescriptor, args: &Value) -> PermissionAction {
        PermissionAction::Execute {
            command: self.render(args).unwrap_or_else(|_| self.template.clone()),
        }
    }
}
