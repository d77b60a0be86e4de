//! Permission system
//!
//! - `guard`: 실행 파이프라인용 인터페이스 (PermissionGuard)
//! - `service`: 런타임 권한 관리 (PermissionService)
//! - `settings`: JSON 설정 저장/로드 (PermissionSettings)
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! let service = PermissionService::load(JsonStore::new(dir))?;
//! let request = PermissionRequest::new("run_command", PermissionAction::Execute {
//!     command: "ls".into(),
//! })
//! .with_policy(Some(PermissionPolicy::Ask));
//!
//! match service.check(&request).await? {
//!     PermissionDecision::Allow => { /* 실행 */ }
//!     PermissionDecision::Deny { reason } => { /* 거부 */ }
//! }
//! ```

mod guard;
mod service;
mod settings;

pub use guard::{
    AllowAll, GuardError, PermissionDecision, PermissionGuard, PermissionPolicy,
    PermissionRequest,
};

pub use service::{
    Permission, PermissionAction, PermissionScope, PermissionService, PermissionStatus,
};

pub use settings::{
    PermissionActionType, PermissionDeny, PermissionGrant, PermissionSettings, PERMISSIONS_FILE,
};
