//! Permission 설정 저장/로드
//!
//! 영구 권한(permanent grants)과 거부 패턴을 JSON으로 관리

use super::service::{Permission, PermissionAction, PermissionScope};
use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 설정 파일명
pub const PERMISSIONS_FILE: &str = "permissions.json";

/// Permission 설정 파일 구조
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSettings {
    /// 영구 허용된 권한들
    #[serde(default)]
    pub grants: HashSet<PermissionGrant>,

    /// 항상 거부할 패턴들
    #[serde(default)]
    pub denies: HashSet<PermissionDeny>,

    /// 자동 승인 모드
    #[serde(default)]
    pub auto_approve: bool,

    /// 자동 승인할 도구들 (tool id)
    #[serde(default)]
    pub auto_approve_tools: HashSet<String>,
}

/// 저장용 권한 구조
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    /// tool id (예: "run_command", "fs:read_file")
    pub tool: String,

    pub action_type: PermissionActionType,

    /// 패턴 (예: "/home/user/project/**"), None 이면 모든 대상
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// 거부 패턴
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDeny {
    pub tool: String,

    pub pattern: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// 액션 타입 (저장용 간소화 버전)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PermissionActionType {
    Execute,
    FileRead,
    FileWrite,
    Invoke,
}

impl From<&PermissionAction> for PermissionActionType {
    fn from(action: &PermissionAction) -> Self {
        match action {
            PermissionAction::Execute { .. } => Self::Execute,
            PermissionAction::FileRead { .. } => Self::FileRead,
            PermissionAction::FileWrite { .. } => Self::FileWrite,
            PermissionAction::Invoke { .. } => Self::Invoke,
        }
    }
}

impl PermissionSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: &JsonStore) -> Result<Self> {
        Ok(store.load_optional(PERMISSIONS_FILE)?.unwrap_or_default())
    }

    pub fn save(&self, store: &JsonStore) -> Result<()> {
        store.save(PERMISSIONS_FILE, self)
    }

    pub fn add_grant(&mut self, grant: PermissionGrant) {
        self.grants.insert(grant);
    }

    /// Permission에서 Grant 생성 및 추가
    pub fn add_permission(&mut self, permission: &Permission) {
        self.grants.insert(PermissionGrant {
            tool: permission.tool_id.clone(),
            action_type: PermissionActionType::from(&permission.action),
            pattern: Some(permission.action.target().to_string()),
        });
    }

    pub fn add_deny(&mut self, deny: PermissionDeny) {
        self.denies.insert(deny);
    }

    /// 권한 확인
    pub fn is_granted(&self, tool: &str, action: &PermissionAction) -> bool {
        let action_type = PermissionActionType::from(action);
        let target = action.target();

        self.grants.iter().any(|grant| {
            grant.tool == tool
                && grant.action_type == action_type
                && grant
                    .pattern
                    .as_deref()
                    .map(|p| Self::pattern_matches(p, target))
                    .unwrap_or(true)
        })
    }

    /// 거부 확인 (`*` tool 은 모든 도구에 적용)
    pub fn is_denied(&self, tool: &str, action: &PermissionAction) -> Option<&PermissionDeny> {
        let target = action.target();
        self.denies.iter().find(|deny| {
            (deny.tool == tool || deny.tool == "*") && Self::pattern_matches(&deny.pattern, target)
        })
    }

    pub fn is_auto_approved(&self, tool: &str) -> bool {
        self.auto_approve || self.auto_approve_tools.contains(tool)
    }

    /// 병합
    pub fn merge(&mut self, other: PermissionSettings) {
        self.grants.extend(other.grants);
        self.denies.extend(other.denies);
        self.auto_approve = self.auto_approve || other.auto_approve;
        self.auto_approve_tools.extend(other.auto_approve_tools);
    }

    pub fn to_permissions(&self) -> Vec<Permission> {
        self.grants
            .iter()
            .map(|grant| {
                let target = grant.pattern.clone().unwrap_or_else(|| "**".to_string());
                Permission {
                    tool_id: grant.tool.clone(),
                    action: PermissionAction::from_parts(grant.action_type, target),
                    scope: PermissionScope::Permanent,
                }
            })
            .collect()
    }

    // === Helper functions ===

    fn pattern_matches(pattern: &str, value: &str) -> bool {
        if pattern == "**" || pattern == "*" {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix("/**") {
            return value.starts_with(prefix);
        }
        if let Some(prefix) = pattern.strip_suffix("/*") {
            return value.starts_with(prefix)
                && !value[prefix.len()..].trim_start_matches('/').contains('/');
        }
        if let Some(prefix) = pattern.strip_suffix(" **") {
            return value == prefix || value.starts_with(&format!("{} ", prefix));
        }
        pattern == value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_grant() {
        let mut settings = PermissionSettings::new();

        settings.add_grant(PermissionGrant {
            tool: "write_file".to_string(),
            action_type: PermissionActionType::FileWrite,
            pattern: Some("/home/user/project/**".to_string()),
        });

        assert!(settings.is_granted(
            "write_file",
            &PermissionAction::FileWrite {
                path: "/home/user/project/src/main.rs".to_string()
            }
        ));
        assert!(!settings.is_granted(
            "write_file",
            &PermissionAction::FileWrite {
                path: "/etc/passwd".to_string()
            }
        ));
    }

    #[test]
    fn test_permission_deny() {
        let mut settings = PermissionSettings::new();

        settings.add_deny(PermissionDeny {
            tool: "run_command".to_string(),
            pattern: "rm **".to_string(),
            reason: Some("Dangerous command".to_string()),
        });

        assert!(settings
            .is_denied(
                "run_command",
                &PermissionAction::Execute {
                    command: "rm -rf /".to_string()
                }
            )
            .is_some());
        assert!(settings
            .is_denied(
                "run_command",
                &PermissionAction::Execute {
                    command: "ls".to_string()
                }
            )
            .is_none());
    }

    #[test]
    fn test_wildcard_tool_deny() {
        let mut settings = PermissionSettings::new();
        settings.add_deny(PermissionDeny {
            tool: "*".to_string(),
            pattern: "/etc/**".to_string(),
            reason: None,
        });
        let action = PermissionAction::FileRead {
            path: "/etc/shadow".to_string(),
        };
        assert!(settings.is_denied("read_file", &action).is_some());
        assert!(settings.is_denied("fs:read", &action).is_some());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        let mut settings = PermissionSettings::new();
        settings.auto_approve_tools.insert("calc".to_string());
        settings.save(&store).unwrap();

        let loaded = PermissionSettings::load(&store).unwrap();
        assert!(loaded.is_auto_approved("calc"));
        assert!(!loaded.is_auto_approved("run_command"));
    }
}
