//! PermissionGuard - 실행 파이프라인이 호출하는 권한 검사 인터페이스

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::service::PermissionAction;

/// 도구별 권한 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionPolicy {
    /// 항상 허용
    #[default]
    Allow,
    /// 사전 승인(grant)이 있어야 허용
    Ask,
    /// 항상 거부
    Deny,
}

/// 권한 검사 요청
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub tool_id: String,
    pub tool_name: String,
    pub action: PermissionAction,
    pub policy: Option<PermissionPolicy>,
    pub args: Value,
}

impl PermissionRequest {
    pub fn new(tool_id: impl Into<String>, action: PermissionAction) -> Self {
        let tool_id = tool_id.into();
        Self {
            tool_name: tool_id.clone(),
            tool_id,
            action,
            policy: None,
            args: Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self
    }

    pub fn with_policy(mut self, policy: Option<PermissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

/// 권한 검사 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny { reason: String },
}

impl PermissionDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        PermissionDecision::Deny {
            reason: reason.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allow)
    }
}

/// Guard-side failures.
///
/// `Unavailable` aborts the call with a hard fault. `Degraded` is logged and
/// the call proceeds as allowed.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("permission system unavailable: {0}")]
    Unavailable(String),

    #[error("permission system degraded: {0}")]
    Degraded(String),
}

impl GuardError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GuardError::Unavailable(_))
    }
}

#[async_trait]
pub trait PermissionGuard: Send + Sync {
    async fn check(&self, request: &PermissionRequest)
        -> Result<PermissionDecision, GuardError>;
}

/// 모든 요청을 허용하는 guard (테스트/로컬 개발용)
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl PermissionGuard for AllowAll {
    async fn check(
        &self,
        _request: &PermissionRequest,
    ) -> Result<PermissionDecision, GuardError> {
        Ok(PermissionDecision::Allow)
    }
}
