//! Execution - 도구 호출 파이프라인과 변형 (batch / retry / cancelable)

mod cancel;
mod engine;

pub use cancel::CancelRegistry;
pub use engine::{
    BatchCall, BatchResult, ExecuteOptions, ExecutionEngine, ExecutionEngineBuilder,
    RetryOptions,
};
