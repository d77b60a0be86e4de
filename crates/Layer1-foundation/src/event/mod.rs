//! Event System - 이벤트 발행/구독 시스템
//!
//! 프로세스 수명주기와 도구 실행 이벤트를 전달합니다.
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────┐  ┌──────────────────┐
//! │ ProcessSupervisor│  │ ExecutionEngine  │
//! └────────┬─────────┘  └────────┬─────────┘
//!          │ ProcessEvent        │ ExecutionEvent
//!          ▼                     ▼
//! ┌─────────────────────────────────────────┐
//! │                EventBus                 │
//! │  history │ broadcast::Sender │ listeners│
//! └─────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusConfig, EventListener, ListenerId};
pub use types::{
    EventCategory, EventId, EventPayload, ExecutionEvent, ProcessEvent, ToolforgeEvent,
};
