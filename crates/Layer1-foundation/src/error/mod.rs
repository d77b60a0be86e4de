//! Error types for Toolforge
//!
//! 모든 에러를 중앙에서 관리

use std::time::Duration;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Toolforge 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 프로세스 수명주기
    // ========================================================================
    #[error("Server '{server_id}' did not become ready within {timeout:?}")]
    StartupTimeout { server_id: String, timeout: Duration },

    #[error("Server '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Server '{0}' is not running")]
    NotRunning(String),

    #[error("Request '{method}' to server '{server_id}' timed out after {timeout:?}")]
    RequestTimeout {
        server_id: String,
        method: String,
        timeout: Duration,
    },

    #[error("Server '{server_id}' exited{}", exit_suffix(.code))]
    ProcessExited { server_id: String, code: Option<i32> },

    #[error("Server '{server_id}' exceeded the restart limit ({max_restarts})")]
    RestartLimitExceeded { server_id: String, max_restarts: u32 },

    #[error("Server '{server_id}' returned an error: {message}")]
    Remote { server_id: String, message: String },

    // ========================================================================
    // 권한 관련
    // ========================================================================
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Permission system failure: {0}")]
    PermissionSystemFault(String),

    // ========================================================================
    // Tool 관련
    // ========================================================================
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid arguments for '{tool}': {}", .violations.join("; "))]
    ValidationFailed { tool: String, violations: Vec<String> },

    #[error("Tool '{tool}' timed out after {timeout:?}")]
    ExecutionTimedOut { tool: String, timeout: Duration },

    #[error("Tool execution failed: {tool} - {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    ///
    /// `RateLimited` is never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RequestTimeout { .. }
                | Error::ExecutionTimedOut { .. }
                | Error::ProcessExited { .. }
                | Error::NotRunning(_)
                | Error::ToolExecution { .. }
                | Error::Remote { .. }
                | Error::Io(_)
        )
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::PermissionDenied(_)
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::ValidationFailed { .. }
                | Error::RateLimited(_)
                | Error::Cancelled
        )
    }

    /// Stable machine-readable code, used in failure records and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::StartupTimeout { .. } => "startup_timeout",
            Error::AlreadyRunning(_) => "already_running",
            Error::NotRunning(_) => "not_running",
            Error::RequestTimeout { .. } => "request_timeout",
            Error::ProcessExited { .. } => "process_exited",
            Error::RestartLimitExceeded { .. } => "restart_limit_exceeded",
            Error::Remote { .. } => "remote",
            Error::PermissionDenied(_) => "permission_denied",
            Error::PermissionSystemFault(_) => "permission_system_fault",
            Error::NotFound(_) => "not_found",
            Error::RateLimited(_) => "rate_limited",
            Error::ValidationFailed { .. } => "validation_failed",
            Error::ExecutionTimedOut { .. } => "execution_timed_out",
            Error::ToolExecution { .. } => "handler_error",
            Error::Cancelled => "cancelled",
            Error::InvalidInput(_) => "invalid_input",
            Error::Storage(_) => "storage",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Sqlite(_) => "sqlite",
            Error::Internal(_) => "internal",
        }
    }

    /// Tool 실행 에러 생성 헬퍼
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// 프로세스 종료 에러 생성 헬퍼
    pub fn process_exited(server_id: impl Into<String>, code: Option<i32>) -> Self {
        Error::ProcessExited {
            server_id: server_id.into(),
            code,
        }
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!(" with code {}", c),
        None => String::new(),
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
