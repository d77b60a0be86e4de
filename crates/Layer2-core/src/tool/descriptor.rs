//! Tool descriptor - 도구 메타데이터

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use toolforge_foundation::{PermissionPolicy, RateLimitPolicy};

/// 도구 출처
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOrigin {
    /// 호스트 내장
    Builtin,
    /// provider 프로세스가 제공
    Process { server_id: String },
    /// 설정 파일 정의
    User,
}

impl ToolOrigin {
    pub fn is_builtin(&self) -> bool {
        matches!(self, ToolOrigin::Builtin)
    }

    pub fn is_process(&self) -> bool {
        matches!(self, ToolOrigin::Process { .. })
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            ToolOrigin::Process { server_id } => Some(server_id),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToolOrigin::Builtin => "builtin",
            ToolOrigin::Process { .. } => "process",
            ToolOrigin::User => "user",
        }
    }
}

/// Everything the registry and pipeline know about one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// 전역 고유
    pub id: String,
    /// 표시 이름 (중복 가능)
    pub name: String,
    pub description: String,
    /// canonical JSON Schema
    pub schema: Value,
    pub origin: ToolOrigin,
    pub enabled: bool,
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<PermissionPolicy>,
}

impl ToolDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, origin: ToolOrigin) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            schema: json!({"type": "object", "properties": {}}),
            origin,
            enabled: false,
            hidden: false,
            rate_limit: None,
            permission: None,
        }
    }

    pub fn builtin(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, ToolOrigin::Builtin)
    }

    /// id 는 `"{server_id}:{name}"`
    pub fn process(server_id: &str, name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            format!("{}:{}", server_id, name),
            name,
            ToolOrigin::Process {
                server_id: server_id.to_string(),
            },
        )
    }

    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, ToolOrigin::User)
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn permission(mut self, policy: PermissionPolicy) -> Self {
        self.permission = Some(policy);
        self
    }
}
