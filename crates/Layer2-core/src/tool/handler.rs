//! ToolHandler - 도구 실행 인터페이스

use super::descriptor::ToolDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use toolforge_foundation::{PermissionAction, Result};

/// Executes one tool call.
///
/// Errors returned here reach the caller as-is; wrap opaque failures in
/// `Error::ToolExecution`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value>;

    /// 권한 검사에 쓰일 동작. 기본값은 도구 id 호출.
    fn permission_action(&self, descriptor: &ToolDescriptor, _args: &Value) -> PermissionAction {
        PermissionAction::Invoke {
            target: descriptor.id.clone(),
        }
    }
}

/// Wraps an async closure as a handler
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<Value>> + Send,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value>> + Send,
{
    async fn call(&self, args: Value) -> Result<Value> {
        (self.f)(args).await
    }
}
