//! Side-effect sinks used by builtin and user-defined tools

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use toolforge_foundation::{Error, Result};
use tracing::debug;

// ============================================================================
// Command
// ============================================================================

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout,
        }
    }

    pub fn cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput>;
}

/// Runs through the platform shell
pub struct LocalCommandSink {
    shell: String,
    shell_args: Vec<String>,
}

impl LocalCommandSink {
    pub fn new() -> Self {
        if cfg!(windows) {
            Self {
                shell: "cmd".to_string(),
                shell_args: vec!["/C".to_string()],
            }
        } else {
            Self {
                shell: "sh".to_string(),
                shell_args: vec!["-c".to_string()],
            }
        }
    }
}

impl Default for LocalCommandSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandSink for LocalCommandSink {
    async fn run(&self, request: CommandRequest) -> Result<CommandOutput> {
        debug!(command = %request.command, cwd = ?request.cwd, "Running command");

        let mut cmd = Command::new(&self.shell);
        cmd.args(&self.shell_args)
            .arg(&request.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Internal(format!("Failed to spawn process: {}", e)))?;

        let result = tokio::time::timeout(request.timeout, async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            let mut stdout = child.stdout.take();
            let mut stderr = child.stderr.take();

            let read_out = async {
                if let Some(out) = stdout.as_mut() {
                    let _ = out.read_to_end(&mut stdout_buf).await;
                }
            };
            let read_err = async {
                if let Some(err) = stderr.as_mut() {
                    let _ = err.read_to_end(&mut stderr_buf).await;
                }
            };
            tokio::join!(read_out, read_err);

            let status = child.wait().await;
            (status, stdout_buf, stderr_buf)
        })
        .await;

        match result {
            Ok((status, stdout, stderr)) => {
                let status = status?;
                Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code: status.code(),
                })
            }
            Err(_) => Err(Error::Internal(format!(
                "Command timed out after {}ms",
                request.timeout.as_millis()
            ))),
        }
    }
}

// ============================================================================
// File
// ============================================================================

#[async_trait]
pub trait FileSink: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String>;

    /// Returns the number of bytes written
    async fn write(&self, path: &Path, content: &str) -> Result<usize>;
}

/// tokio::fs 기반
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSink;

#[async_trait]
impl FileSink for LocalFileSink {
    async fn read(&self, path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::NotFound(format!("File not found: {}", path.display())));
        }
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write(&self, path: &Path, content: &str) -> Result<usize> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;
        Ok(content.len())
    }
}
