//! # toolforge-foundation
//!
//! Foundation layer for Toolforge:
//! - Error: 에러 분류 (Error, Result)
//! - Event: 프로세스/실행 이벤트 버스
//! - Permission: 권한 guard + 런타임 권한 서비스
//! - Limits: 도구별 rate limiting
//! - Storage: SQLite 실행 기록, JsonStore 상태 저장
//! - Config: 통합 설정 (toolforge.toml)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Layer2-core                                             │
//! │  ├── ProcessSupervisor ──► ProcessEvent ──┐             │
//! │  └── ExecutionEngine ────► ExecutionEvent ┤             │
//! │           │                               ▼             │
//! │           │                           EventBus          │
//! │           ├── PermissionGuard (Allow/Ask/Deny)          │
//! │           ├── RateLimiter                               │
//! │           └── HistorySink (SQLite)                      │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod limits;
pub mod permission;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Event
// ============================================================================
pub use event::{
    EventBus, EventBusConfig, EventCategory, EventListener, EventPayload, ExecutionEvent,
    ListenerId, ProcessEvent, ToolforgeEvent,
};

// ============================================================================
// Permission
// ============================================================================
pub use permission::{
    AllowAll, GuardError, PermissionAction, PermissionDecision, PermissionGuard,
    PermissionPolicy, PermissionRequest, PermissionService, PermissionSettings,
};

// ============================================================================
// Limits
// ============================================================================
pub use limits::{RateLimitPolicy, RateLimiter, SlidingWindowLimiter};

// ============================================================================
// Storage
// ============================================================================
pub use storage::{
    ExecutionRecord, HistorySink, JsonStore, MemoryHistory, MemoryStateStore, SqliteHistory,
    StateStore,
};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    ExecutionSettings, ReadinessMode, RestartSettings, ServerConfig, SupervisorSettings,
    ToolforgeConfig, UserToolConfig, CONFIG_FILE, HARD_MAX_TIMEOUT_MS,
};
