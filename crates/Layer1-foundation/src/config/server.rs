//! Provider process 설정
//!
//! ```toml
//! [servers.filesystem]
//! command = "npx"
//! args = ["-y", "@modelcontextprotocol/server-filesystem", "/path"]
//! env = { ROOT = "${HOME:-/tmp}" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// 개별 provider process 설정
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// 실행 명령어
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// 환경 변수 (${VAR}, ${VAR:-default} 형식 지원)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// 작업 디렉토리
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    /// 호스트 시작 시 자동 실행 여부
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 시작 후 tools/list 로 도구 동기화
    #[serde(default = "default_true")]
    pub auto_sync_tools: bool,
}

impl ServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
            enabled: true,
            auto_sync_tools: true,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.command.trim().is_empty() {
            return Err("'command' must not be empty".to_string());
        }
        if let Some(cwd) = &self.cwd {
            if !cwd.is_dir() {
                return Err(format!("cwd '{}' is not a directory", cwd.display()));
            }
        }
        Ok(())
    }

    /// 환경변수 확장 (${VAR} 또는 ${VAR:-default})
    pub fn expand_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_var(v)))
            .collect()
    }

    // === Builder methods ===

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.cwd = Some(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

fn expand_env_var(value: &str) -> String {
    let mut result = value.to_string();

    // ${VAR:-default} 패턴
    if let Ok(re_default) = regex::Regex::new(r"\$\{([^}:]+):-([^}]*)\}") {
        result = re_default
            .replace_all(&result, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| caps[2].to_string())
            })
            .to_string();
    }

    // ${VAR} 패턴
    if let Ok(re_simple) = regex::Regex::new(r"\$\{([^}]+)\}") {
        result = re_simple
            .replace_all(&result, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_default()
            })
            .to_string();
    }

    result
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let server = ServerConfig::new("node")
            .arg("server.js")
            .env("MODE", "test")
            .disabled();
        assert_eq!(server.args, vec!["server.js"]);
        assert!(!server.enabled);
        assert!(server.validate().is_ok());
    }

    #[test]
    fn test_empty_command_invalid() {
        assert!(ServerConfig::new("  ").validate().is_err());
    }

    #[test]
    fn test_expand_env_default() {
        let server = ServerConfig::new("x")
            .env("A", "${TOOLFORGE_TEST_SURELY_UNSET:-fallback}")
            .env("B", "pre-${TOOLFORGE_TEST_SURELY_UNSET}-post");
        let env = server.expand_env();
        assert_eq!(env["A"], "fallback");
        assert_eq!(env["B"], "pre--post");
    }

    #[test]
    fn test_deserialize_defaults() {
        let server: ServerConfig = toml::from_str(r#"command = "cat""#).unwrap();
        assert!(server.enabled);
        assert!(server.auto_sync_tools);
        assert!(server.args.is_empty());
    }
}
