//! Event Types - 프로세스/실행 이벤트 정의
//!
//! 이벤트 종류는 닫힌 enum 으로 정의되며, 각 variant 가 자신의 payload 를 가진다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// 이벤트 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// 프로세스 수명주기 (started, exited, restarting ...)
    Process,
    /// 프로세스가 보낸 notification
    Notification,
    /// 도구 실행 파이프라인
    Execution,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Process => "process",
            EventCategory::Notification => "notification",
            EventCategory::Execution => "execution",
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Process lifecycle events, keyed by server id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessEvent {
    Started { server_id: String, pid: Option<u32> },
    Stopped { server_id: String },
    Error { server_id: String, message: String },
    Exited { server_id: String, code: Option<i32> },
    Restarting {
        server_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    Restarted { server_id: String, pid: Option<u32> },
    RestartFailed { server_id: String, message: String },
    RestartLimitExceeded { server_id: String, max_restarts: u32 },
    Notification {
        server_id: String,
        method: Option<String>,
        params: Value,
    },
}

impl ProcessEvent {
    pub fn server_id(&self) -> &str {
        match self {
            ProcessEvent::Started { server_id, .. }
            | ProcessEvent::Stopped { server_id }
            | ProcessEvent::Error { server_id, .. }
            | ProcessEvent::Exited { server_id, .. }
            | ProcessEvent::Restarting { server_id, .. }
            | ProcessEvent::Restarted { server_id, .. }
            | ProcessEvent::RestartFailed { server_id, .. }
            | ProcessEvent::RestartLimitExceeded { server_id, .. }
            | ProcessEvent::Notification { server_id, .. } => server_id,
        }
    }

    /// Wire-style name, e.g. `restart-limit-exceeded`
    pub fn name(&self) -> &'static str {
        match self {
            ProcessEvent::Started { .. } => "started",
            ProcessEvent::Stopped { .. } => "stopped",
            ProcessEvent::Error { .. } => "error",
            ProcessEvent::Exited { .. } => "exited",
            ProcessEvent::Restarting { .. } => "restarting",
            ProcessEvent::Restarted { .. } => "restarted",
            ProcessEvent::RestartFailed { .. } => "restart-failed",
            ProcessEvent::RestartLimitExceeded { .. } => "restart-limit-exceeded",
            ProcessEvent::Notification { .. } => "notification",
        }
    }
}

/// Execution pipeline events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Start { tool_id: String, args: Value },
    Success { tool_id: String, duration_ms: u64 },
    Error {
        tool_id: String,
        error_kind: String,
        message: String,
        duration_ms: u64,
    },
}

impl ExecutionEvent {
    pub fn tool_id(&self) -> &str {
        match self {
            ExecutionEvent::Start { tool_id, .. }
            | ExecutionEvent::Success { tool_id, .. }
            | ExecutionEvent::Error { tool_id, .. } => tool_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEvent::Start { .. } => "execute:start",
            ExecutionEvent::Success { .. } => "execute:success",
            ExecutionEvent::Error { .. } => "execute:error",
        }
    }
}

/// 이벤트 payload (닫힌 enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "event", rename_all = "snake_case")]
pub enum EventPayload {
    Process(ProcessEvent),
    Execution(ExecutionEvent),
}

// ============================================================================
// ToolforgeEvent
// ============================================================================

/// 이벤트 envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolforgeEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl ToolforgeEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn category(&self) -> EventCategory {
        match &self.payload {
            EventPayload::Process(ProcessEvent::Notification { .. }) => EventCategory::Notification,
            EventPayload::Process(_) => EventCategory::Process,
            EventPayload::Execution(_) => EventCategory::Execution,
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.payload {
            EventPayload::Process(e) => e.name(),
            EventPayload::Execution(e) => e.name(),
        }
    }

    pub fn as_process(&self) -> Option<&ProcessEvent> {
        match &self.payload {
            EventPayload::Process(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_execution(&self) -> Option<&ExecutionEvent> {
        match &self.payload {
            EventPayload::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProcessEvent> for ToolforgeEvent {
    fn from(e: ProcessEvent) -> Self {
        Self::new(EventPayload::Process(e))
    }
}

impl From<ExecutionEvent> for ToolforgeEvent {
    fn from(e: ExecutionEvent) -> Self {
        Self::new(EventPayload::Execution(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_routing() {
        let ev: ToolforgeEvent = ProcessEvent::Notification {
            server_id: "srv".into(),
            method: Some("progress".into()),
            params: Value::Null,
        }
        .into();
        assert_eq!(ev.category(), EventCategory::Notification);

        let ev: ToolforgeEvent = ProcessEvent::Exited {
            server_id: "srv".into(),
            code: Some(1),
        }
        .into();
        assert_eq!(ev.category(), EventCategory::Process);
        assert_eq!(ev.as_process().map(|p| p.server_id()), Some("srv"));
    }

    #[test]
    fn test_event_names() {
        let ev: ToolforgeEvent = ProcessEvent::RestartLimitExceeded {
            server_id: "srv".into(),
            max_restarts: 3,
        }
        .into();
        assert_eq!(ev.name(), "restart-limit-exceeded");

        let ev: ToolforgeEvent = ExecutionEvent::Success {
            tool_id: "calc".into(),
            duration_ms: 3,
        }
        .into();
        assert_eq!(ev.name(), "execute:success");
    }

    #[test]
    fn test_serialize_tagged() {
        let ev = EventPayload::Process(ProcessEvent::Stopped {
            server_id: "srv".into(),
        });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "process");
        assert_eq!(json["event"]["kind"], "stopped");
    }
}
