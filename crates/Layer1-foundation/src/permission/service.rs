//! Permission service
//!
//! Session grants in memory, permanent grants in `permissions.json`.
//! Implements [`PermissionGuard`] for the execution pipeline.

use super::guard::{
    GuardError, PermissionDecision, PermissionGuard, PermissionPolicy, PermissionRequest,
};
use super::settings::{PermissionActionType, PermissionSettings};
use crate::storage::JsonStore;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Types of permission actions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    /// Execute a shell command
    Execute { command: String },

    /// Read a file
    FileRead { path: String },

    /// Write to a file
    FileWrite { path: String },

    /// Invoke a tool whose effects are opaque (process-backed tools)
    Invoke { target: String },
}

impl PermissionAction {
    pub fn description(&self) -> String {
        match self {
            Self::Execute { command } => format!("Execute: {}", command),
            Self::FileRead { path } => format!("Read file: {}", path),
            Self::FileWrite { path } => format!("Write file: {}", path),
            Self::Invoke { target } => format!("Invoke: {}", target),
        }
    }

    /// The string deny/grant patterns are matched against
    pub fn target(&self) -> &str {
        match self {
            Self::Execute { command } => command,
            Self::FileRead { path } | Self::FileWrite { path } => path,
            Self::Invoke { target } => target,
        }
    }

    pub(crate) fn from_parts(kind: PermissionActionType, target: String) -> Self {
        match kind {
            PermissionActionType::Execute => Self::Execute { command: target },
            PermissionActionType::FileRead => Self::FileRead { path: target },
            PermissionActionType::FileWrite => Self::FileWrite { path: target },
            PermissionActionType::Invoke => Self::Invoke { target },
        }
    }
}

/// A granted permission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permission {
    pub tool_id: String,
    pub action: PermissionAction,
    pub scope: PermissionScope,
}

/// Scope of a granted permission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PermissionScope {
    /// Valid for current session
    Session,

    /// Saved permanently
    Permanent,
}

/// Permission check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// No grant recorded
    Unknown,
    AutoApproved,
}

/// Permission service managing grants and queries
pub struct PermissionService {
    session_grants: RwLock<HashSet<Permission>>,

    settings: RwLock<PermissionSettings>,

    /// None: in-memory only
    store: Option<JsonStore>,
}

impl PermissionService {
    pub fn new() -> Self {
        Self::with_settings(PermissionSettings::default())
    }

    pub fn with_settings(settings: PermissionSettings) -> Self {
        Self {
            session_grants: RwLock::new(HashSet::new()),
            settings: RwLock::new(settings),
            store: None,
        }
    }

    /// Load `permissions.json` from the store and persist grants back to it
    pub fn load(store: JsonStore) -> Result<Self> {
        let settings = PermissionSettings::load(&store)?;
        Ok(Self {
            session_grants: RwLock::new(HashSet::new()),
            settings: RwLock::new(settings),
            store: Some(store),
        })
    }

    pub fn with_auto_approve() -> Self {
        let mut settings = PermissionSettings::default();
        settings.auto_approve = true;
        Self::with_settings(settings)
    }

    /// Check permission status for an action.
    ///
    /// Deny patterns win over everything, then auto-approve, then grants.
    pub fn status(
        &self,
        tool_id: &str,
        action: &PermissionAction,
    ) -> std::result::Result<PermissionStatus, GuardError> {
        match self.settings_status(tool_id, action)? {
            PermissionStatus::Unknown if self.session_granted(tool_id, action)? => {
                Ok(PermissionStatus::Granted)
            }
            status => Ok(status),
        }
    }

    /// 저장된 설정만 본다 (session grant 제외)
    fn settings_status(
        &self,
        tool_id: &str,
        action: &PermissionAction,
    ) -> std::result::Result<PermissionStatus, GuardError> {
        let settings = self
            .settings
            .read()
            .map_err(|_| GuardError::Unavailable("permission settings lock poisoned".into()))?;

        if settings.is_denied(tool_id, action).is_some() {
            Ok(PermissionStatus::Denied)
        } else if settings.is_auto_approved(tool_id) {
            Ok(PermissionStatus::AutoApproved)
        } else if settings.is_granted(tool_id, action) {
            Ok(PermissionStatus::Granted)
        } else {
            Ok(PermissionStatus::Unknown)
        }
    }

    fn session_granted(
        &self,
        tool_id: &str,
        action: &PermissionAction,
    ) -> std::result::Result<bool, GuardError> {
        let grants = self
            .session_grants
            .read()
            .map_err(|_| GuardError::Degraded("session grant lock poisoned".into()))?;
        Ok(grants
            .iter()
            .any(|g| g.tool_id == tool_id && &g.action == action))
    }

    pub fn is_permitted(&self, tool_id: &str, action: &PermissionAction) -> bool {
        matches!(
            self.status(tool_id, action),
            Ok(PermissionStatus::Granted | PermissionStatus::AutoApproved)
        )
    }

    pub fn grant_session(&self, tool_id: &str, action: PermissionAction) {
        if let Ok(mut grants) = self.session_grants.write() {
            grants.insert(Permission {
                tool_id: tool_id.to_string(),
                action,
                scope: PermissionScope::Session,
            });
        }
    }

    /// Grant and save permanent permission
    pub fn grant_permanent(&self, tool_id: &str, action: PermissionAction) -> Result<()> {
        let permission = Permission {
            tool_id: tool_id.to_string(),
            action,
            scope: PermissionScope::Permanent,
        };

        let mut settings = self
            .settings
            .write()
            .map_err(|_| Error::Internal("permission settings lock poisoned".into()))?;
        settings.add_permission(&permission);

        if let Some(store) = &self.store {
            settings.save(store)?;
        }
        Ok(())
    }

    pub fn set_auto_approve_tool(&self, tool_id: &str, enabled: bool) -> Result<()> {
        let mut settings = self
            .settings
            .write()
            .map_err(|_| Error::Internal("permission settings lock poisoned".into()))?;
        if enabled {
            settings.auto_approve_tools.insert(tool_id.to_string());
        } else {
            settings.auto_approve_tools.remove(tool_id);
        }
        if let Some(store) = &self.store {
            settings.save(store)?;
        }
        Ok(())
    }

    pub fn clear_session(&self) {
        if let Ok(mut grants) = self.session_grants.write() {
            grants.clear();
        }
    }

    pub fn session_grants(&self) -> Vec<Permission> {
        self.session_grants
            .read()
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn permanent_grants(&self) -> Vec<Permission> {
        self.settings
            .read()
            .map(|s| s.to_permissions())
            .unwrap_or_default()
    }

    fn deny_reason(&self, tool_id: &str, action: &PermissionAction) -> String {
        self.settings
            .read()
            .ok()
            .and_then(|s| s.is_denied(tool_id, action).and_then(|d| d.reason.clone()))
            .unwrap_or_else(|| format!("{} is blocked for {}", action.description(), tool_id))
    }
}

impl Default for PermissionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionGuard for PermissionService {
    async fn check(
        &self,
        request: &PermissionRequest,
    ) -> std::result::Result<PermissionDecision, GuardError> {
        // deny pattern 과 policy 는 session grant 보다 먼저 평가
        let status = self.settings_status(&request.tool_id, &request.action)?;
        debug!(tool_id = %request.tool_id, ?status, policy = ?request.policy, "Permission check");

        if status == PermissionStatus::Denied {
            return Ok(PermissionDecision::deny(
                self.deny_reason(&request.tool_id, &request.action),
            ));
        }

        match request.policy.unwrap_or_default() {
            PermissionPolicy::Deny => Ok(PermissionDecision::deny(format!(
                "tool '{}' is not permitted to run",
                request.tool_name
            ))),
            PermissionPolicy::Allow => Ok(PermissionDecision::Allow),
            PermissionPolicy::Ask => {
                let approved = matches!(
                    status,
                    PermissionStatus::Granted | PermissionStatus::AutoApproved
                ) || self.session_granted(&request.tool_id, &request.action)?;

                if approved {
                    Ok(PermissionDecision::Allow)
                } else {
                    warn!(tool_id = %request.tool_id, "No grant recorded for tool requiring approval");
                    Ok(PermissionDecision::deny(format!(
                        "{} requires approval",
                        request.action.description()
                    )))
                }
            }
        }
    }
}
