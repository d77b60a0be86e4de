//! ExecutionEngine - 도구 호출 파이프라인
//!
//! ```text
//! execute(tool, args)
//!   1. lookup      → NotFound
//!   2. permission  → PermissionDenied | PermissionSystemFault
//!   3. rate limit  → RateLimited
//!   4. validation  → ValidationFailed (모든 위반 포함)
//!   5. handler     → ExecutionTimedOut | handler error
//!   6. history     (실패해도 결과에 영향 없음)
//! ```
//!
//! 첫 실패에서 중단한다. 모든 호출은 `execute:start` 와
//! `execute:success` / `execute:error` 이벤트를 남긴다.

use super::cancel::CancelRegistry;
use crate::tool::{JsonSchemaValidator, ResolvedTool, ToolRegistry, Validator};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolforge_foundation::{
    AllowAll, Error, EventBus, ExecutionEvent, ExecutionRecord, ExecutionSettings, HistorySink,
    MemoryHistory, PermissionAction, PermissionDecision, PermissionGuard, PermissionRequest,
    RateLimiter, Result, SlidingWindowLimiter,
};
use tracing::{debug, info, warn};

// ============================================================================
// Options
// ============================================================================

/// Per-call options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// 생략 시 기본값, 상한으로 제한됨
    pub timeout: Option<Duration>,
}

impl ExecuteOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Linear backoff: the wait after attempt `n` is `delay_step * n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub delay_step: Duration,
}

impl RetryOptions {
    pub fn new(max_attempts: u32, delay_step: Duration) -> Self {
        Self {
            max_attempts,
            delay_step,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.delay_step * attempt
    }
}

impl From<&ExecutionSettings> for RetryOptions {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            max_attempts: settings.retry_max_attempts,
            delay_step: Duration::from_millis(settings.retry_delay_ms),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchCall {
    pub tool_id: String,
    pub args: Value,
}

impl BatchCall {
    pub fn new(tool_id: impl Into<String>, args: Value) -> Self {
        Self {
            tool_id: tool_id.into(),
            args,
        }
    }
}

/// One tagged batch result, in input order
#[derive(Debug)]
pub struct BatchResult {
    pub index: usize,
    pub tool_id: String,
    pub result: Result<Value>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

// ============================================================================
// ExecutionEngine
// ============================================================================

pub struct ExecutionEngine {
    registry: Arc<ToolRegistry>,
    guard: Arc<dyn PermissionGuard>,
    limiter: Arc<dyn RateLimiter>,
    validator: Arc<dyn Validator>,
    history: Arc<dyn HistorySink>,
    events: Arc<EventBus>,
    settings: ExecutionSettings,
    cancels: CancelRegistry,
}

impl ExecutionEngine {
    pub fn builder(registry: Arc<ToolRegistry>, events: Arc<EventBus>) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::new(registry, events)
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Run one tool call through the full pipeline.
    pub async fn execute(&self, tool: &str, args: Value, options: ExecuteOptions) -> Result<Value> {
        let started = Instant::now();
        self.events
            .publish(ExecutionEvent::Start {
                tool_id: tool.to_string(),
                args: args.clone(),
            })
            .await;

        let resolved = self.registry.lookup(tool);
        let tool_id = resolved
            .as_ref()
            .map(|r| r.descriptor.id.clone())
            .unwrap_or_else(|| tool.to_string());

        let result = match resolved {
            Some(resolved) => self.run(&resolved, &args, &options).await,
            None => Err(Error::NotFound(format!("Tool '{}' not found", tool))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let record = match &result {
            Ok(output) => {
                debug!(tool_id = %tool_id, duration_ms, "Tool succeeded");
                self.events
                    .publish(ExecutionEvent::Success {
                        tool_id: tool_id.clone(),
                        duration_ms,
                    })
                    .await;
                ExecutionRecord::success(&tool_id, args, output.clone(), duration_ms)
            }
            Err(e) => {
                warn!(tool_id = %tool_id, kind = e.kind(), error = %e, "Tool failed");
                self.events
                    .publish(ExecutionEvent::Error {
                        tool_id: tool_id.clone(),
                        error_kind: e.kind().to_string(),
                        message: e.to_string(),
                        duration_ms,
                    })
                    .await;
                ExecutionRecord::failure(&tool_id, args, e, duration_ms)
            }
        };

        if let Err(e) = self.history.record(record).await {
            warn!(tool_id = %tool_id, error = %e, "Failed to record execution");
        }

        result
    }

    /// Steps 2-5
    async fn run(
        &self,
        resolved: &ResolvedTool,
        args: &Value,
        options: &ExecuteOptions,
    ) -> Result<Value> {
        let descriptor = &resolved.descriptor;
        if !descriptor.enabled {
            return Err(Error::NotFound(format!("Tool '{}' is disabled", descriptor.id)));
        }

        // permission
        let action = match &resolved.handler {
            Some(handler) => handler.permission_action(descriptor, args),
            None => PermissionAction::Invoke {
                target: descriptor.id.clone(),
            },
        };
        let request = PermissionRequest::new(&descriptor.id, action)
            .with_name(&descriptor.name)
            .with_policy(descriptor.permission)
            .with_args(args.clone());
        match self.guard.check(&request).await {
            Ok(PermissionDecision::Allow) => {}
            Ok(PermissionDecision::Deny { reason }) => {
                return Err(Error::PermissionDenied(format!(
                    "{}: {}",
                    descriptor.id, reason
                )));
            }
            Err(e) if e.is_fatal() => {
                return Err(Error::PermissionSystemFault(e.to_string()));
            }
            Err(e) => {
                warn!(tool_id = %descriptor.id, error = %e, "Permission check degraded, allowing");
            }
        }

        // rate limit
        if let Some(policy) = &descriptor.rate_limit {
            self.limiter.check(&descriptor.id, policy)?;
        }

        // validation
        let violations = self.validator.validate(args, &descriptor.schema);
        if !violations.is_empty() {
            return Err(Error::ValidationFailed {
                tool: descriptor.id.clone(),
                violations,
            });
        }

        // dispatch
        let handler = resolved
            .handler
            .as_ref()
            .ok_or_else(|| Error::tool_execution(&descriptor.id, "No handler registered"))?;
        let timeout = self.settings.effective_timeout(options.timeout);

        // 타임아웃은 결과만 확정한다. handler 작업은 끝까지 실행된다.
        let handler = Arc::clone(handler);
        let call_args = args.clone();
        let mut task = tokio::spawn(async move { handler.call(call_args).await });
        tokio::select! {
            joined = &mut task => joined.unwrap_or_else(|e| {
                Err(Error::tool_execution(&descriptor.id, format!("Handler panicked: {}", e)))
            }),
            _ = tokio::time::sleep(timeout) => Err(Error::ExecutionTimedOut {
                tool: descriptor.id.clone(),
                timeout,
            }),
        }
    }

    // ========================================================================
    // Variants
    // ========================================================================

    /// All calls run concurrently; results keep input order.
    pub async fn execute_batch(
        &self,
        calls: Vec<BatchCall>,
        options: ExecuteOptions,
    ) -> Vec<BatchResult> {
        info!(count = calls.len(), "Executing batch");
        let futures = calls
            .iter()
            .map(|call| self.execute(&call.tool_id, call.args.clone(), options.clone()));
        let results = join_all(futures).await;

        calls
            .into_iter()
            .zip(results)
            .enumerate()
            .map(|(index, (call, result))| BatchResult {
                index,
                tool_id: call.tool_id,
                result,
            })
            .collect()
    }

    /// Retries retryable failures only. The last failure is returned.
    pub async fn execute_with_retry(
        &self,
        tool: &str,
        args: Value,
        options: ExecuteOptions,
        retry: RetryOptions,
    ) -> Result<Value> {
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.execute(tool, args.clone(), options.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    let delay = retry.delay_after(attempt);
                    warn!(tool, attempt, max_attempts, ?delay, error = %e, "Retrying tool");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 취소 토큰 발급
    pub fn cancel_token(&self) -> String {
        self.cancels.issue()
    }

    /// Cooperative: the in-flight call is not interrupted, its result is
    /// discarded.
    pub fn cancel(&self, token: &str) -> bool {
        info!(token, "Cancel requested");
        self.cancels.cancel(token)
    }

    /// Checks the token immediately before and after the pipeline.
    pub async fn execute_cancelable(
        &self,
        tool: &str,
        args: Value,
        options: ExecuteOptions,
        token: &str,
    ) -> Result<Value> {
        let cancel = self.cancels.token(token);
        if cancel.is_cancelled() {
            self.cancels.release(token);
            return Err(Error::Cancelled);
        }

        let result = self.execute(tool, args, options).await;
        self.cancels.release(token);

        if cancel.is_cancelled() {
            debug!(tool, token, "Discarding result of cancelled execution");
            return Err(Error::Cancelled);
        }
        result
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct ExecutionEngineBuilder {
    registry: Arc<ToolRegistry>,
    events: Arc<EventBus>,
    guard: Option<Arc<dyn PermissionGuard>>,
    limiter: Option<Arc<dyn RateLimiter>>,
    validator: Option<Arc<dyn Validator>>,
    history: Option<Arc<dyn HistorySink>>,
    settings: ExecutionSettings,
}

impl ExecutionEngineBuilder {
    pub fn new(registry: Arc<ToolRegistry>, events: Arc<EventBus>) -> Self {
        Self {
            registry,
            events,
            guard: None,
            limiter: None,
            validator: None,
            history: None,
            settings: ExecutionSettings::default(),
        }
    }

    pub fn guard(mut self, guard: Arc<dyn PermissionGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Unset collaborators: allow-all guard, sliding-window limiter,
    /// JSON Schema validator, in-memory history
    pub fn build(self) -> ExecutionEngine {
        ExecutionEngine {
            registry: self.registry,
            guard: self.guard.unwrap_or_else(|| Arc::new(AllowAll)),
            limiter: self
                .limiter
                .unwrap_or_else(|| Arc::new(SlidingWindowLimiter::new())),
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(JsonSchemaValidator::new())),
            history: self.history.unwrap_or_else(|| Arc::new(MemoryHistory::new())),
            events: self.events,
            settings: self.settings,
            cancels: CancelRegistry::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{FnHandler, ToolDescriptor, ToolHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use toolforge_foundation::{
        EventCategory, GuardError, PermissionPolicy, PermissionService, RateLimitPolicy,
    };

    /// Counts calls, echoes its arguments
    #[derive(Default)]
    struct Counting {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ToolHandler for Counting {
        async fn call(&self, args: Value) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(args)
        }
    }

    struct Harness {
        engine: ExecutionEngine,
        history: Arc<MemoryHistory>,
        events: Arc<EventBus>,
    }

    fn add_schema() -> Value {
        json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
            "required": ["a", "b"]
        })
    }

    fn harness(register: impl FnOnce(&ToolRegistry)) -> Harness {
        harness_with(register, |b| b)
    }

    fn harness_with(
        register: impl FnOnce(&ToolRegistry),
        configure: impl FnOnce(ExecutionEngineBuilder) -> ExecutionEngineBuilder,
    ) -> Harness {
        let registry = Arc::new(ToolRegistry::new());
        register(&registry);
        let events = Arc::new(EventBus::new());
        let history = Arc::new(MemoryHistory::new());
        let engine = configure(
            ExecutionEngine::builder(Arc::clone(&registry), Arc::clone(&events))
                .history(history.clone()),
        )
        .build();
        Harness {
            engine,
            history,
            events,
        }
    }

    fn user(id: &str) -> ToolDescriptor {
        ToolDescriptor::user(id, id).enabled(true)
    }

    #[tokio::test]
    async fn test_success_records_and_emits() {
        let h = harness(|r| {
            r.register(user("echo"), Some(Arc::new(Counting::default())))
                .unwrap()
        });
        let mut rx = h.events.receiver();

        let out = h
            .engine
            .execute("echo", json!({"x": 1}), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(out, json!({"x": 1}));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.name(), "execute:start");
        assert_eq!(second.name(), "execute:success");
        assert_eq!(second.category(), EventCategory::Execution);

        let records = h.history.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].tool_id, "echo");
    }

    #[tokio::test]
    async fn test_not_found() {
        let h = harness(|_| {});
        let err = h
            .engine
            .execute("ghost", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let records = h.history.records();
        assert_eq!(records[0].error_kind.as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_disabled_tool_is_not_eligible() {
        let handler = Arc::new(Counting::default());
        let h = harness(|r| {
            r.register(ToolDescriptor::builtin("read_file"), Some(handler.clone()))
                .unwrap()
        });
        let err = h
            .engine
            .execute("read_file", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_is_soft() {
        let handler = Arc::new(Counting::default());
        let h = harness_with(
            |r| {
                r.register(
                    user("rm").permission(PermissionPolicy::Deny),
                    Some(handler.clone()),
                )
                .unwrap()
            },
            |b| b.guard(Arc::new(PermissionService::new())),
        );
        let err = h
            .engine
            .execute("rm", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
        assert!(err.is_user_facing());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    struct BrokenGuard {
        fatal: bool,
    }

    #[async_trait]
    impl PermissionGuard for BrokenGuard {
        async fn check(
            &self,
            _request: &PermissionRequest,
        ) -> std::result::Result<PermissionDecision, GuardError> {
            if self.fatal {
                Err(GuardError::Unavailable("policy store gone".into()))
            } else {
                Err(GuardError::Degraded("session cache reset".into()))
            }
        }
    }

    #[tokio::test]
    async fn test_guard_faults() {
        let fatal = harness_with(
            |r| r.register(user("t"), Some(Arc::new(Counting::default()))).unwrap(),
            |b| b.guard(Arc::new(BrokenGuard { fatal: true })),
        );
        let err = fatal
            .engine
            .execute("t", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionSystemFault(_)));

        let degraded = harness_with(
            |r| r.register(user("t"), Some(Arc::new(Counting::default()))).unwrap(),
            |b| b.guard(Arc::new(BrokenGuard { fatal: false })),
        );
        assert!(degraded
            .engine
            .execute("t", json!({}), ExecuteOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_rate_limited_never_invokes_handler() {
        let handler = Arc::new(Counting::default());
        let h = harness(|r| {
            r.register(
                user("calc").rate_limit(RateLimitPolicy::new(1, Duration::from_secs(60))),
                Some(handler.clone()),
            )
            .unwrap()
        });

        h.engine
            .execute("calc", json!({}), ExecuteOptions::default())
            .await
            .unwrap();
        let err = h
            .engine
            .execute("calc", json!({}), ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_aggregates_and_skips_handler() {
        let handler = Arc::new(Counting::default());
        let h = harness(|r| {
            r.register(user("add").schema(add_schema()), Some(handler.clone()))
                .unwrap()
        });

        let err = h
            .engine
            .execute("add", json!({"a": "one"}), ExecuteOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::ValidationFailed { tool, violations } => {
                assert_eq!(tool, "add");
                assert_eq!(violations.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_settles_once_and_handler_runs_on() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let h = harness(move |r| {
            let slow = FnHandler::new(move |_args: Value| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            });
            r.register(user("slow"), Some(Arc::new(slow))).unwrap()
        });

        let err = h
            .engine
            .execute(
                "slow",
                json!({}),
                ExecuteOptions::with_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionTimedOut { .. }));

        // 결과는 이미 확정됐지만 handler 는 계속 실행된다
        assert!(!finished.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(h.history.records().len(), 1);
        assert!(!h.history.records()[0].success);
    }

    struct FailingHistory;

    #[async_trait]
    impl HistorySink for FailingHistory {
        async fn record(&self, _record: ExecutionRecord) -> Result<()> {
            Err(Error::Storage("disk full".into()))
        }
    }

    #[tokio::test]
    async fn test_history_failure_swallowed() {
        let h = harness_with(
            |r| r.register(user("t"), Some(Arc::new(Counting::default()))).unwrap(),
            |b| b.history(Arc::new(FailingHistory)),
        );
        assert!(h
            .engine
            .execute("t", json!({}), ExecuteOptions::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_batch_tagged_results() {
        let h = harness(|r| {
            r.register(user("ok"), Some(Arc::new(Counting::default())))
                .unwrap();
            r.register(user("add").schema(add_schema()), Some(Arc::new(Counting::default())))
                .unwrap();
        });

        let results = h
            .engine
            .execute_batch(
                vec![
                    BatchCall::new("ok", json!({"n": 1})),
                    BatchCall::new("add", json!({})),
                    BatchCall::new("ok", json!({"n": 3})),
                ],
                ExecuteOptions::default(),
            )
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(!results[1].is_ok());
        assert_eq!(results[1].tool_id, "add");
        assert!(results[2].is_ok());
        assert_eq!(results[2].index, 2);
        assert_eq!(results[2].result.as_ref().unwrap(), &json!({"n": 3}));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let h = harness(move |r| {
            let flaky = FnHandler::new(move |_args: Value| {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(Error::tool_execution("flaky", "transient"))
                    } else {
                        Ok(json!(n))
                    }
                }
            });
            r.register(user("flaky"), Some(Arc::new(flaky))).unwrap()
        });

        let out = h
            .engine
            .execute_with_retry(
                "flaky",
                json!({}),
                ExecuteOptions::default(),
                RetryOptions::new(3, Duration::from_millis(10)),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(3));
        assert_eq!(h.history.records().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_surfaces_final_failure() {
        let h = harness(|r| {
            let broken = FnHandler::new(|_args: Value| async {
                Err(Error::tool_execution("broken", "always"))
            });
            r.register(user("broken"), Some(Arc::new(broken))).unwrap()
        });
        let err = h
            .engine
            .execute_with_retry(
                "broken",
                json!({}),
                ExecuteOptions::default(),
                RetryOptions::new(2, Duration::from_millis(5)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "handler_error");
        assert_eq!(h.history.records().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_skips_non_retryable() {
        let h = harness(|_| {});
        let _ = h
            .engine
            .execute_with_retry(
                "ghost",
                json!({}),
                ExecuteOptions::default(),
                RetryOptions::new(5, Duration::from_millis(5)),
            )
            .await;
        assert_eq!(h.history.records().len(), 1);
    }

    #[test]
    fn test_linear_delay() {
        let retry = RetryOptions::new(3, Duration::from_secs(1));
        assert_eq!(retry.delay_after(1), Duration::from_secs(1));
        assert_eq!(retry.delay_after(2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let handler = Arc::new(Counting::default());
        let h = harness(|r| r.register(user("t"), Some(handler.clone())).unwrap());

        let token = h.engine.cancel_token();
        assert!(h.engine.cancel(&token));
        let err = h
            .engine
            .execute_cancelable("t", json!({}), ExecuteOptions::default(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_registry_drains() {
        let h = harness(|r| {
            r.register(user("t"), Some(Arc::new(Counting::default())))
                .unwrap()
        });

        assert!(!h.engine.cancel("unknown"));
        let token = h.engine.cancel_token();
        h.engine
            .execute_cancelable("t", json!({}), ExecuteOptions::default(), &token)
            .await
            .unwrap();
        assert!(!h.engine.cancel(&token));
        assert!(h.engine.cancels.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_execution_discards_result() {
        let h = Arc::new(harness(|r| {
            let slow = FnHandler::new(|_args: Value| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(json!("late"))
            });
            r.register(user("slow"), Some(Arc::new(slow))).unwrap()
        }));

        let token = h.engine.cancel_token();
        let runner = {
            let h = Arc::clone(&h);
            let token = token.clone();
            tokio::spawn(async move {
                h.engine
                    .execute_cancelable("slow", json!({}), ExecuteOptions::default(), &token)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.engine.cancel(&token);
        let result = runner.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
