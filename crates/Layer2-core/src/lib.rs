//! toolforge-core: Core Runtime for Toolforge
//!
//! Layer2 - 프로세스 감독, 도구 카탈로그, 실행 파이프라인
//!
//! # 주요 모듈
//!
//! - `process`: provider 프로세스 감독 (ProcessSupervisor, RequestMultiplexer, RestartPolicy)
//! - `tool`: 도구 레지스트리, 스키마 변환, builtin / user / process 도구
//! - `execution`: 실행 파이프라인 (ExecutionEngine)
//!
//! # 사용 예시
//!
//! ```ignore
//! use toolforge_core::{ExecutionEngine, ExecuteOptions, ProcessSpec, ProcessSupervisor, ToolRegistry, ToolSync};
//!
//! let events = Arc::new(EventBus::new());
//! let supervisor = ProcessSupervisor::new(config.supervisor, config.restart, events.clone());
//! let registry = Arc::new(ToolRegistry::with_store(Arc::new(JsonStore::global()?)));
//!
//! supervisor.start(ProcessSpec::from_config("math", &server)).await?;
//! ToolSync::new(supervisor.clone(), registry.clone()).sync_server("math").await?;
//!
//! let engine = ExecutionEngine::builder(registry, events).build();
//! let sum = engine.execute("math:add", json!({"a": 1, "b": 2}), ExecuteOptions::default()).await?;
//! ```

pub mod execution;
pub mod process;
pub mod tool;

// Re-exports: Process
pub use process::{
    ProcessSnapshot, ProcessSpec, ProcessStatus, ProcessSupervisor, RequestMultiplexer,
    RestartDecision, RestartPolicy,
};

// Re-exports: Tool
pub use tool::{
    register_builtins, JsonSchemaValidator, LocalCommandSink, LocalFileSink, ProcessToolHandler,
    SchemaFormat, SchemaTranslator, ToolDescriptor, ToolHandler, ToolOrigin, ToolRegistry,
    ToolSync, UserCommandTool, Validator,
};

// Re-exports: Execution
pub use execution::{
    BatchCall, BatchResult, ExecuteOptions, ExecutionEngine, ExecutionEngineBuilder, RetryOptions,
};
