//! Host context - 설정 로드와 런타임 조립
//!
//! ```text
//! toolforge.toml ─► ToolforgeConfig
//!                     ├── ProcessSupervisor (servers)
//!                     ├── ToolRegistry      (builtin + [[tools]] + provider tools)
//!                     └── ExecutionEngine   (permission, history, execution settings)
//! ```

use anyhow::Context as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use toolforge_core::tool::CommandSink;
use toolforge_core::{
    register_builtins, ExecutionEngine, LocalCommandSink, LocalFileSink, ProcessSpec,
    ProcessSupervisor, ToolRegistry, ToolSync, UserCommandTool,
};
use toolforge_foundation::{
    EventBus, JsonStore, PermissionGuard, PermissionService, SqliteHistory, ToolforgeConfig,
    ToolforgeEvent, CONFIG_FILE,
};
use tracing::{debug, info, warn};

/// `--config` 가 없으면 현재 디렉토리의 toolforge.toml
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Execution history 위치 (~/.local/share/toolforge/)
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolforge")
}

pub struct HostContext {
    pub config: ToolforgeConfig,
    pub supervisor: ProcessSupervisor,
    pub registry: Arc<ToolRegistry>,
    pub sync: ToolSync,
    pub engine: ExecutionEngine,
}

impl HostContext {
    pub fn load(config_path: &Path, auto_approve: bool) -> anyhow::Result<Self> {
        let config = ToolforgeConfig::load_or_default(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let store = JsonStore::global()?;
        Self::build(config, store, &data_dir(), auto_approve)
    }

    pub fn build(
        config: ToolforgeConfig,
        store: JsonStore,
        data_dir: &Path,
        auto_approve: bool,
    ) -> anyhow::Result<Self> {
        let events = Arc::new(EventBus::new());
        spawn_event_logger(&events);

        let supervisor = ProcessSupervisor::new(
            config.supervisor.clone(),
            config.restart.clone(),
            Arc::clone(&events),
        );
        let registry = Arc::new(ToolRegistry::with_store(Arc::new(store.clone())));

        let commands: Arc<dyn CommandSink> = Arc::new(LocalCommandSink::new());
        register_builtins(&registry, Arc::clone(&commands), Arc::new(LocalFileSink))?;

        let user_timeout = Duration::from_millis(config.execution.default_timeout_ms);
        for tool in &config.tools {
            let handler = UserCommandTool::new(tool, Arc::clone(&commands), user_timeout);
            registry
                .register(UserCommandTool::descriptor(tool), Some(Arc::new(handler)))
                .with_context(|| format!("Failed to register tool '{}'", tool.id))?;
        }

        let guard: Arc<dyn PermissionGuard> = if auto_approve {
            Arc::new(PermissionService::with_auto_approve())
        } else {
            Arc::new(PermissionService::load(store)?)
        };
        let history = SqliteHistory::open(data_dir)?;

        let engine = ExecutionEngine::builder(Arc::clone(&registry), events)
            .guard(guard)
            .history(Arc::new(history))
            .settings(config.execution.clone())
            .build();
        let sync = ToolSync::new(supervisor.clone(), Arc::clone(&registry));

        Ok(Self {
            config,
            supervisor,
            registry,
            sync,
            engine,
        })
    }

    /// Starts every enabled server and syncs its tools. Failures are logged
    /// and skipped.
    pub async fn start_servers(&self) -> usize {
        let mut started = 0;
        let mut servers: Vec<_> = self.config.enabled_servers().collect();
        servers.sort_by(|a, b| a.0.cmp(b.0));

        for (id, server) in servers {
            match self.supervisor.start(ProcessSpec::from_config(id.clone(), server)).await {
                Ok(snapshot) => {
                    started += 1;
                    info!(server_id = %id, pid = ?snapshot.pid, "Provider started");
                    if server.auto_sync_tools {
                        if let Err(e) = self.sync.sync_server(id).await {
                            warn!(server_id = %id, error = %e, "Tool sync failed");
                        }
                    }
                }
                Err(e) => warn!(server_id = %id, error = %e, "Failed to start provider"),
            }
        }
        started
    }

    pub async fn shutdown(&self) {
        for (server_id, result) in self.supervisor.stop_all().await {
            self.sync.unsync_server(&server_id);
            if let Err(e) = result {
                warn!(server_id = %server_id, error = %e, "Failed to stop provider");
            }
        }
    }
}

/// 이벤트를 tracing 으로 전달
fn spawn_event_logger(events: &Arc<EventBus>) {
    let mut rx = events.receiver();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn log_event(event: &ToolforgeEvent) {
    match event.as_process() {
        Some(process) => info!(
            server_id = %process.server_id(),
            event = event.name(),
            "{:?}",
            process
        ),
        None => debug!(event = event.name(), "{:?}", event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolforge_foundation::UserToolConfig;

    fn user_tool() -> UserToolConfig {
        serde_json::from_value(serde_json::json!({
            "id": "greet",
            "description": "Print a greeting",
            "command": "echo hello {{name}}"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_build_registers_builtin_and_user_tools() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolforgeConfig {
            tools: vec![user_tool()],
            ..ToolforgeConfig::default()
        };

        let ctx = HostContext::build(
            config,
            JsonStore::new(dir.path().join("state")),
            &dir.path().join("data"),
            true,
        )
        .unwrap();

        assert!(ctx.registry.contains("run_command"));
        assert!(ctx.registry.contains("read_file"));
        assert!(ctx.registry.contains("write_file"));
        assert!(ctx.registry.get("greet").unwrap().enabled);
        assert_eq!(ctx.start_servers().await, 0);
        assert!(dir.path().join("data").join("history.db").exists());
    }

    #[tokio::test]
    async fn test_enablement_survives_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let build = || {
            HostContext::build(
                ToolforgeConfig::default(),
                JsonStore::new(dir.path().join("state")),
                &dir.path().join("data"),
                true,
            )
            .unwrap()
        };

        let first = build();
        assert!(!first.registry.get("read_file").unwrap().enabled);
        first.registry.set_enabled("read_file", true).unwrap();

        let second = build();
        assert!(second.registry.get("read_file").unwrap().enabled);
    }

    #[test]
    fn test_config_path_default() {
        assert_eq!(config_path(None), PathBuf::from(CONFIG_FILE));
        assert_eq!(
            config_path(Some(PathBuf::from("/etc/tf.toml"))),
            PathBuf::from("/etc/tf.toml")
        );
    }
}
