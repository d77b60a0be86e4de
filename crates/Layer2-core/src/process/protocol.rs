//! Wire protocol - newline-delimited JSON
//!
//! ```text
//! request       {"id":1,"method":"tools/call","params":{...}}\n
//! success       {"id":1,"result":...}\n
//! failure       {"id":1,"error":{"message":"...", ...}}\n
//! notification  any object without a matching id
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const TOOLS_CALL: &str = "tools/call";
pub const TOOLS_LIST: &str = "tools/list";

/// Outbound request envelope. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Single line including the trailing `\n`
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Any inbound message. Which fields are present decides how it is routed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inbound {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    /// Raw JSON; a non-string method is not a parse error
    #[serde(default)]
    pub method: Option<Value>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Inbound {
    /// Numeric id, if any. String ids never match a pending request.
    pub fn request_id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// `method` when it is a string
    pub fn method_name(&self) -> Option<&str> {
        self.method.as_ref().and_then(Value::as_str)
    }

    /// `Err(message)` when the message carries an error payload
    pub fn into_outcome(self) -> std::result::Result<Value, String> {
        match self.error {
            Some(Value::Null) | None => Ok(self.result.unwrap_or(Value::Null)),
            Some(err) => Err(error_message(&err)),
        }
    }
}

fn error_message(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(msg) => match map.get("code") {
                Some(code) => format!("{} (code {})", msg, code),
                None => msg.to_string(),
            },
            None => err.to_string(),
        },
        other => other.to_string(),
    }
}

/// Inbound message that did not resolve a pending request
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: Option<String>,
    pub params: Value,
    /// The full message as received
    pub message: Value,
}

/// 메서드별 요청 timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    /// `tools/call`
    pub call: Duration,
    /// 그 외 모든 메서드
    pub default: Duration,
}

impl RequestTimeouts {
    pub fn for_method(&self, method: &str) -> Duration {
        if method == TOOLS_CALL {
            self.call
        } else {
            self.default
        }
    }
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            call: Duration::from_secs(30),
            default: Duration::from_secs(10),
        }
    }
}

impl From<&toolforge_foundation::SupervisorSettings> for RequestTimeouts {
    fn from(settings: &toolforge_foundation::SupervisorSettings) -> Self {
        Self {
            call: Duration::from_millis(settings.call_timeout_ms),
            default: Duration::from_millis(settings.request_timeout_ms),
        }
    }
}
