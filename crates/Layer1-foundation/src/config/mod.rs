//! Config - 통합 설정 관리
//!
//! - `server.rs` - provider process 설정
//! - 이 파일 - ToolforgeConfig (toolforge.toml)
//!
//! ```toml
//! [restart]
//! max_restarts = 3
//! reset_interval_ms = 60000
//!
//! [supervisor.readiness]
//! mode = "notification"
//! method = "ready"
//!
//! [servers.fs]
//! command = "fs-tools"
//!
//! [[tools]]
//! id = "greet"
//! description = "Print a greeting"
//! command = "echo hello {{name}}"
//! schema = { type = "object", properties = { name = { type = "string" } } }
//! ```

mod server;

pub use server::ServerConfig;

use crate::limits::RateLimitPolicy;
use crate::permission::PermissionPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// 설정 파일명
pub const CONFIG_FILE: &str = "toolforge.toml";

// ============================================================================
// Supervisor
// ============================================================================

/// How the supervisor decides a freshly spawned process is ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReadinessMode {
    /// Fixed grace interval after spawn
    Grace,
    /// Wait for a notification with this method
    Notification { method: String },
}

impl Default for ReadinessMode {
    fn default() -> Self {
        Self::Grace
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub startup_grace_ms: u64,
    pub startup_timeout_ms: u64,
    pub readiness: ReadinessMode,
    /// SIGTERM 이후 강제 종료까지 대기
    pub stop_grace_ms: u64,
    /// `tools/call` 요청 timeout
    pub call_timeout_ms: u64,
    /// 그 외 요청 timeout
    pub request_timeout_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            startup_grace_ms: 500,
            startup_timeout_ms: 10_000,
            readiness: ReadinessMode::Grace,
            stop_grace_ms: 5_000,
            call_timeout_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl SupervisorSettings {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Restart circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartSettings {
    pub auto_restart: bool,
    pub max_restarts: u32,
    /// 마지막 재시작 이후 이 시간이 지나면 카운트 초기화
    pub reset_interval_ms: u64,
    pub restart_delay_ms: u64,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            auto_restart: true,
            max_restarts: 3,
            reset_interval_ms: 60_000,
            restart_delay_ms: 1_000,
        }
    }
}

impl RestartSettings {
    pub fn reset_interval(&self) -> Duration {
        Duration::from_millis(self.reset_interval_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

// ============================================================================
// Execution
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    pub default_timeout_ms: u64,
    /// 호출자가 지정할 수 있는 최대 timeout. [`HARD_MAX_TIMEOUT_MS`] 를 넘지 못한다.
    pub max_timeout_ms: u64,
    pub retry_max_attempts: u32,
    /// attempt N 이후 N * retry_delay_ms 대기
    pub retry_delay_ms: u64,
}

/// Absolute timeout ceiling, whatever `max_timeout_ms` says
pub const HARD_MAX_TIMEOUT_MS: u64 = 120_000;

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            max_timeout_ms: HARD_MAX_TIMEOUT_MS,
            retry_max_attempts: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl ExecutionSettings {
    /// Caller override clamped to the ceiling
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        let ceiling = Duration::from_millis(self.max_timeout_ms.min(HARD_MAX_TIMEOUT_MS));
        requested
            .unwrap_or_else(|| Duration::from_millis(self.default_timeout_ms))
            .min(ceiling)
    }
}

// ============================================================================
// User-defined tools
// ============================================================================

/// `[[tools]]` 항목 - command template 기반 도구
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserToolConfig {
    pub id: String,

    /// 표시 이름 (생략 시 id)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: String,

    /// `{{param}}` placeholder 를 포함하는 shell command
    pub command: String,

    #[serde(default = "default_schema")]
    pub schema: Value,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub cwd: Option<std::path::PathBuf>,

    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,

    #[serde(default)]
    pub permission: Option<PermissionPolicy>,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

fn default_true() -> bool {
    true
}

// ============================================================================
// ToolforgeConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolforgeConfig {
    pub supervisor: SupervisorSettings,
    pub restart: RestartSettings,
    pub execution: ExecutionSettings,
    pub servers: HashMap<String, ServerConfig>,
    pub tools: Vec<UserToolConfig>,
}

impl ToolforgeConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// 파일이 없으면 기본값
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = self
            .servers
            .iter()
            .filter_map(|(id, s)| s.validate().err().map(|e| format!("servers.{}: {}", id, e)))
            .collect();

        if self.execution.default_timeout_ms > self.execution.max_timeout_ms {
            errors.push("execution.default_timeout_ms exceeds max_timeout_ms".to_string());
        }
        if self.execution.max_timeout_ms > HARD_MAX_TIMEOUT_MS {
            errors.push(format!(
                "execution.max_timeout_ms exceeds the {} ms ceiling",
                HARD_MAX_TIMEOUT_MS
            ));
        }
        if let ReadinessMode::Notification { method } = &self.supervisor.readiness {
            if method.is_empty() {
                errors.push("supervisor.readiness.method must not be empty".to_string());
            }
        }
        for tool in &self.tools {
            if tool.id.contains(':') {
                errors.push(format!("tools.{}: ':' is reserved for process-backed ids", tool.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(errors.join("; ")))
        }
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &ServerConfig)> {
        self.servers.iter().filter(|(_, s)| s.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToolforgeConfig::default();
        assert_eq!(config.restart.max_restarts, 3);
        assert_eq!(config.restart.reset_interval_ms, 60_000);
        assert_eq!(config.execution.default_timeout_ms, 30_000);
        assert_eq!(config.execution.max_timeout_ms, 120_000);
        assert_eq!(config.supervisor.readiness, ReadinessMode::Grace);
    }

    #[test]
    fn test_effective_timeout_is_capped() {
        let exec = ExecutionSettings::default();
        assert_eq!(exec.effective_timeout(None), Duration::from_secs(30));
        assert_eq!(
            exec.effective_timeout(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        assert_eq!(
            exec.effective_timeout(Some(Duration::from_secs(600))),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_hard_ceiling_beats_configured_max() {
        let exec = ExecutionSettings {
            default_timeout_ms: 300_000,
            max_timeout_ms: 600_000,
            ..ExecutionSettings::default()
        };
        assert_eq!(
            exec.effective_timeout(Some(Duration::from_secs(500))),
            Duration::from_secs(120)
        );
        assert_eq!(exec.effective_timeout(None), Duration::from_secs(120));

        let err = ToolforgeConfig::from_toml(
            r#"
            [execution]
            max_timeout_ms = 600000
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_timeout_ms exceeds"));
    }

    #[test]
    fn test_parse_full_config() {
        let config = ToolforgeConfig::from_toml(
            r#"
            [restart]
            max_restarts = 5

            [supervisor.readiness]
            mode = "notification"
            method = "ready"

            [servers.fs]
            command = "fs-tools"
            args = ["--root", "/tmp"]

            [[tools]]
            id = "greet"
            command = "echo hello {{name}}"
            permission = "ask"
            rate_limit = { max_calls = 2, window_ms = 1000 }
            schema = { type = "object", required = ["name"], properties = { name = { type = "string" } } }
            "#,
        )
        .unwrap();

        assert_eq!(config.restart.max_restarts, 5);
        assert_eq!(config.restart.reset_interval_ms, 60_000);
        assert_eq!(
            config.supervisor.readiness,
            ReadinessMode::Notification {
                method: "ready".into()
            }
        );
        assert_eq!(config.servers["fs"].args, vec!["--root", "/tmp"]);

        let tool = &config.tools[0];
        assert_eq!(tool.permission, Some(PermissionPolicy::Ask));
        assert_eq!(tool.rate_limit.as_ref().map(|r| r.max_calls), Some(2));
        assert_eq!(tool.schema["required"][0], "name");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ToolforgeConfig::from_toml(
            r#"
            [execution]
            default_timeout_ms = 200000

            [[tools]]
            id = "a:b"
            command = "true"
            "#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("default_timeout_ms"));
        assert!(msg.contains("a:b"));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolforgeConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.servers.is_empty());
    }
}
