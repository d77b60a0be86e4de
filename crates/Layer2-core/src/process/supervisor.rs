//! Process supervisor - provider process 수명주기 관리
//!
//! ```text
//!  start(spec) ──► spawn ──► [Starting] ──ready──► [Running] ──exit──┐
//!                                                                     ▼
//!                              RestartPolicy.decide ◄──── handle_exit
//!                                 │ approve             │ refuse
//!                                 ▼                     ▼
//!                     sleep(delay) → start(spec)    handle removed
//! ```
//!
//! Every tracked process owns one monitor task (holds the `Child`), one stdout
//! reader feeding its [`RequestMultiplexer`], one stderr logger and one
//! notification forwarder. Start/stop/restart of the same server id are
//! serialized by a per-id async mutex; different ids never contend.

use super::multiplexer::RequestMultiplexer;
use super::protocol::RequestTimeouts;
use super::restart::{RefuseReason, RestartDecision, RestartPolicy};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::AbortHandle;
use toolforge_foundation::{
    Error, EventBus, ProcessEvent, ReadinessMode, RestartSettings, Result, ServerConfig,
    SupervisorSettings,
};
use tracing::{debug, error, info, warn};

// ============================================================================
// Types
// ============================================================================

/// Everything needed to (re)spawn a provider process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub server_id: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(server_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            command: command.into(),
            args: vec![],
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Env values are expanded (`${VAR}`, `${VAR:-default}`) here
    pub fn from_config(server_id: impl Into<String>, config: &ServerConfig) -> Self {
        Self {
            server_id: server_id.into(),
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.expand_env(),
            cwd: config.cwd.clone(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessStatus::Starting => "starting",
            ProcessStatus::Running => "running",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a tracked process
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub server_id: String,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    #[serde(serialize_with = "serialize_secs")]
    pub uptime: Duration,
    pub command: String,
    pub args: Vec<String>,
    pub restart_count: u32,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

#[derive(Debug, Clone, Copy)]
struct ExitInfo {
    code: Option<i32>,
}

struct ManagedProcess {
    spec: ProcessSpec,
    generation: u64,
    pid: Option<u32>,
    started_at: Instant,
    status: Mutex<ProcessStatus>,
    mux: Arc<RequestMultiplexer>,
    /// 명시적 stop 진행 중 (재시작 금지)
    stopping: AtomicBool,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
}

impl ManagedProcess {
    fn status(&self) -> ProcessStatus {
        self.status.lock().map(|s| *s).unwrap_or(ProcessStatus::Error)
    }

    fn set_status(&self, status: ProcessStatus) {
        if let Ok(mut s) = self.status.lock() {
            *s = status;
        }
    }

    /// Ask the monitor task to force-kill the child
    fn request_kill(&self) {
        if let Some(tx) = self.kill_tx.lock().ok().and_then(|mut k| k.take()) {
            let _ = tx.send(());
        }
    }

    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    async fn wait_exit(&self) -> Option<i32> {
        let mut rx = self.exit_rx.clone();
        let exit = match rx.wait_for(|e| e.is_some()).await {
            Ok(info) => *info,
            Err(_) => None,
        };
        exit.and_then(|e| e.code)
    }

    fn snapshot(&self, restart_count: u32) -> ProcessSnapshot {
        ProcessSnapshot {
            server_id: self.spec.server_id.clone(),
            status: self.status(),
            pid: self.pid,
            uptime: self.started_at.elapsed(),
            command: self.spec.command.clone(),
            args: self.spec.args.clone(),
            restart_count,
        }
    }
}

// ============================================================================
// ProcessSupervisor
// ============================================================================

struct SupervisorInner {
    settings: SupervisorSettings,
    timeouts: RequestTimeouts,
    processes: RwLock<HashMap<String, Arc<ManagedProcess>>>,
    /// per-server-id 직렬화
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    pending_restarts: Mutex<HashMap<String, AbortHandle>>,
    restart: RestartPolicy,
    events: Arc<EventBus>,
    generation: AtomicU64,
}

/// Cheap to clone; all clones share the same process table.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ProcessSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        restart: RestartSettings,
        events: Arc<EventBus>,
    ) -> Self {
        let timeouts = RequestTimeouts::from(&settings);
        Self {
            inner: Arc::new(SupervisorInner {
                settings,
                timeouts,
                processes: RwLock::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                pending_restarts: Mutex::new(HashMap::new()),
                restart: RestartPolicy::new(restart),
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Spawn and wait until ready.
    ///
    /// `AlreadyRunning` if a handle for the id exists.
    pub async fn start(&self, spec: ProcessSpec) -> Result<ProcessSnapshot> {
        let lock = self.inner.server_lock(&spec.server_id);
        let _guard = lock.lock().await;

        self.inner.cancel_pending_restart(&spec.server_id);
        let snapshot = self.inner.start_locked(&spec).await?;
        self.inner.restart.remember(&spec);
        self.inner
            .events
            .publish(ProcessEvent::Started {
                server_id: spec.server_id.clone(),
                pid: snapshot.pid,
            })
            .await;
        Ok(snapshot)
    }

    /// SIGTERM, wait up to the stop grace, then force kill. The handle is
    /// always removed afterwards.
    pub async fn stop(&self, server_id: &str) -> Result<()> {
        let lock = self.inner.server_lock(server_id);
        let _guard = lock.lock().await;

        let had_pending = self.inner.cancel_pending_restart(server_id);
        self.inner.restart.forget(server_id);

        let process = self.inner.processes.read().await.get(server_id).cloned();
        let Some(process) = process else {
            if had_pending {
                info!(server_id, "Cancelled pending restart");
                self.inner
                    .events
                    .publish(ProcessEvent::Stopped {
                        server_id: server_id.to_string(),
                    })
                    .await;
                return Ok(());
            }
            return Err(Error::NotRunning(server_id.to_string()));
        };

        process.stopping.store(true, Ordering::SeqCst);
        info!(server_id, pid = ?process.pid, "Stopping process");

        terminate(&process);
        let grace = self.inner.settings.stop_grace();
        if tokio::time::timeout(grace, process.wait_exit()).await.is_err() {
            warn!(server_id, ?grace, "Process ignored SIGTERM, killing");
            process.request_kill();
            process.wait_exit().await;
        }

        self.inner.remove_if_current(server_id, process.generation).await;
        Ok(())
    }

    /// Stop every tracked process concurrently
    pub async fn stop_all(&self) -> Vec<(String, Result<()>)> {
        let mut ids: Vec<String> = self.inner.processes.read().await.keys().cloned().collect();
        let pending: Vec<String> = self
            .inner
            .pending_restarts
            .lock()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        for id in pending {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        ids.into_iter().zip(results).collect()
    }

    pub async fn status(&self, server_id: &str) -> Option<ProcessSnapshot> {
        let process = self.inner.processes.read().await.get(server_id).cloned()?;
        Some(process.snapshot(self.inner.restart.restart_count(server_id)))
    }

    /// Sorted by server id
    pub async fn status_all(&self) -> Vec<ProcessSnapshot> {
        let processes: Vec<Arc<ManagedProcess>> =
            self.inner.processes.read().await.values().cloned().collect();
        let mut snapshots: Vec<ProcessSnapshot> = processes
            .iter()
            .map(|p| p.snapshot(self.inner.restart.restart_count(&p.spec.server_id)))
            .collect();
        snapshots.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        snapshots
    }

    pub async fn is_running(&self, server_id: &str) -> bool {
        matches!(
            self.status(server_id).await.map(|s| s.status),
            Some(ProcessStatus::Running)
        )
    }

    pub fn restart_count(&self, server_id: &str) -> u32 {
        self.inner.restart.restart_count(server_id)
    }

    /// Round trip through the process's multiplexer
    pub async fn send(&self, server_id: &str, method: &str, params: Value) -> Result<Value> {
        let process = self
            .inner
            .processes
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| Error::NotRunning(server_id.to_string()))?;

        if process.status() != ProcessStatus::Running {
            return Err(Error::NotRunning(server_id.to_string()));
        }
        process.mux.send(method, params).await
    }
}

impl SupervisorInner {
    fn server_lock(&self, server_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(server_id.to_string()).or_default())
    }

    fn cancel_pending_restart(&self, server_id: &str) -> bool {
        let handle = self
            .pending_restarts
            .lock()
            .ok()
            .and_then(|mut p| p.remove(server_id));
        match handle {
            Some(h) => {
                h.abort();
                true
            }
            None => false,
        }
    }

    async fn remove_if_current(&self, server_id: &str, generation: u64) -> Option<Arc<ManagedProcess>> {
        let mut processes = self.processes.write().await;
        if processes.get(server_id).map(|p| p.generation) == Some(generation) {
            processes.remove(server_id)
        } else {
            None
        }
    }

    /// Caller holds the server lock
    async fn start_locked(self: &Arc<Self>, spec: &ProcessSpec) -> Result<ProcessSnapshot> {
        let server_id = spec.server_id.clone();
        if self.processes.read().await.contains_key(&server_id) {
            return Err(Error::AlreadyRunning(server_id));
        }

        info!(server_id = %server_id, command = %spec.command, args = ?spec.args, "Spawning process");

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                let message = format!("Failed to spawn '{}': {}", spec.command, e);
                error!(server_id = %server_id, "{}", message);
                self.events
                    .publish(ProcessEvent::Error {
                        server_id: server_id.clone(),
                        message: message.clone(),
                    })
                    .await;
                return Err(Error::Internal(message));
            }
        };

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("Failed to capture stdout".to_string()))?;
        let stderr = child.stderr.take();
        let pid = child.id();

        let mux = Arc::new(RequestMultiplexer::new(&server_id, stdin, self.timeouts));

        // 구독은 reader 시작 전에
        let mut ready_rx = mux.subscribe();
        self.spawn_notification_forwarder(&server_id, mux.subscribe());
        mux.spawn_reader(stdout);
        if let Some(stderr) = stderr {
            spawn_stderr_logger(&server_id, stderr);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        let process = Arc::new(ManagedProcess {
            spec: spec.clone(),
            generation,
            pid,
            started_at: Instant::now(),
            status: Mutex::new(ProcessStatus::Starting),
            mux,
            stopping: AtomicBool::new(false),
            kill_tx: Mutex::new(Some(kill_tx)),
            exit_rx,
        });
        self.processes
            .write()
            .await
            .insert(server_id.clone(), Arc::clone(&process));

        self.spawn_monitor(server_id.clone(), generation, child, kill_rx, exit_tx);

        // readiness
        let ready: Result<()> = match &self.settings.readiness {
            ReadinessMode::Grace => {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.startup_grace()) => Ok(()),
                    code = process.wait_exit() => Err(Error::process_exited(&server_id, code)),
                }
            }
            ReadinessMode::Notification { method } => {
                let wait_ready = async {
                    loop {
                        match ready_rx.recv().await {
                            Ok(n) if n.method.as_deref() == Some(method.as_str()) => break,
                            Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                                std::future::pending::<()>().await
                            }
                        }
                    }
                };
                let timeout = self.settings.startup_timeout();
                tokio::select! {
                    _ = wait_ready => Ok(()),
                    code = process.wait_exit() => Err(Error::process_exited(&server_id, code)),
                    _ = tokio::time::sleep(timeout) => Err(Error::StartupTimeout {
                        server_id: server_id.clone(),
                        timeout,
                    }),
                }
            }
        };

        if let Err(e) = ready {
            if matches!(e, Error::StartupTimeout { .. }) {
                warn!(server_id = %server_id, "Process not ready in time, killing");
                process.stopping.store(true, Ordering::SeqCst);
                process.request_kill();
                process.wait_exit().await;
                self.remove_if_current(&server_id, generation).await;
            }
            return Err(e);
        }

        if process.has_exited() {
            return Err(Error::process_exited(&server_id, None));
        }
        process.set_status(ProcessStatus::Running);
        info!(server_id = %server_id, ?pid, "Process running");

        Ok(process.snapshot(self.restart.restart_count(&server_id)))
    }

    fn spawn_monitor(
        self: &Arc<Self>,
        server_id: String,
        generation: u64,
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        exit_tx: watch::Sender<Option<ExitInfo>>,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = match status {
                Ok(s) => s.code(),
                Err(e) => {
                    warn!(server_id = %server_id, error = %e, "Failed to wait for process");
                    None
                }
            };
            let _ = exit_tx.send(Some(ExitInfo { code }));
            inner.handle_exit(&server_id, generation, code).await;
        });
    }

    fn spawn_notification_forwarder(
        self: &Arc<Self>,
        server_id: &str,
        mut rx: tokio::sync::broadcast::Receiver<super::protocol::Notification>,
    ) {
        let events = Arc::clone(&self.events);
        let server_id = server_id.to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(n) => {
                        events
                            .publish(ProcessEvent::Notification {
                                server_id: server_id.clone(),
                                method: n.method,
                                params: n.params,
                            })
                            .await
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(server_id = %server_id, skipped, "Notification forwarder lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn handle_exit(self: &Arc<Self>, server_id: &str, generation: u64, code: Option<i32>) {
        let Some(process) = self.remove_if_current(server_id, generation).await else {
            // stale generation, or already removed after a startup timeout
            return;
        };

        process.mux.fail_all(code);
        let stopping = process.stopping.load(Ordering::SeqCst);
        process.set_status(if code == Some(0) || stopping {
            ProcessStatus::Stopped
        } else {
            ProcessStatus::Error
        });

        info!(server_id, ?code, stopping, "Process exited");
        self.events
            .publish(ProcessEvent::Exited {
                server_id: server_id.to_string(),
                code,
            })
            .await;

        if stopping {
            self.events
                .publish(ProcessEvent::Stopped {
                    server_id: server_id.to_string(),
                })
                .await;
            return;
        }

        match self.restart.decide(server_id, code, Instant::now()) {
            RestartDecision::Restart { attempt, delay, spec } => {
                info!(server_id, attempt, ?delay, "Scheduling restart");
                self.events
                    .publish(ProcessEvent::Restarting {
                        server_id: server_id.to_string(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    })
                    .await;
                self.schedule_restart(spec, delay);
            }
            RestartDecision::Refuse(RefuseReason::LimitExceeded { max_restarts }) => {
                error!(server_id, max_restarts, "Restart limit exceeded");
                self.events
                    .publish(ProcessEvent::RestartLimitExceeded {
                        server_id: server_id.to_string(),
                        max_restarts,
                    })
                    .await;
            }
            RestartDecision::Refuse(reason) => {
                debug!(server_id, ?reason, "Not restarting");
            }
        }
    }

    fn schedule_restart(self: &Arc<Self>, spec: ProcessSpec, delay: Duration) {
        let inner = Arc::clone(self);
        let server_id = spec.server_id.clone();

        // lock held while registering so the task cannot remove its entry first
        let mut pending = match self.pending_restarts.lock() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let lock = inner.server_lock(&spec.server_id);
            let _guard = lock.lock().await;

            // stop() may have cancelled us while we waited for the lock
            let still_pending = inner
                .pending_restarts
                .lock()
                .ok()
                .and_then(|mut p| p.remove(&spec.server_id))
                .is_some();
            if !still_pending {
                return;
            }

            match inner.start_locked(&spec).await {
                Ok(snapshot) => {
                    inner
                        .events
                        .publish(ProcessEvent::Restarted {
                            server_id: spec.server_id.clone(),
                            pid: snapshot.pid,
                        })
                        .await;
                }
                Err(e) => {
                    error!(server_id = %spec.server_id, error = %e, "Restart failed");
                    inner
                        .events
                        .publish(ProcessEvent::RestartFailed {
                            server_id: spec.server_id.clone(),
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });
        if let Some(previous) = pending.insert(server_id, task.abort_handle()) {
            previous.abort();
        }
    }
}

fn spawn_stderr_logger(server_id: &str, stderr: tokio::process::ChildStderr) {
    let server_id = server_id.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(server_id = %server_id, "stderr: {}", line);
        }
    });
}

/// Graceful termination request
#[cfg(unix)]
fn terminate(process: &ManagedProcess) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match process.pid {
        Some(pid) => {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid, error = %e, "SIGTERM failed, killing");
                process.request_kill();
            }
        }
        None => process.request_kill(),
    }
}

#[cfg(not(unix))]
fn terminate(process: &ManagedProcess) {
    process.request_kill();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use toolforge_foundation::{EventCategory, ToolforgeEvent};

    fn fast_settings() -> SupervisorSettings {
        SupervisorSettings {
            startup_grace_ms: 100,
            startup_timeout_ms: 500,
            stop_grace_ms: 500,
            ..SupervisorSettings::default()
        }
    }

    fn fast_restart() -> RestartSettings {
        RestartSettings {
            restart_delay_ms: 50,
            ..RestartSettings::default()
        }
    }

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(fast_settings(), fast_restart(), Arc::new(EventBus::new()))
    }

    fn sh(id: &str, script: &str) -> ProcessSpec {
        ProcessSpec::new(id, "sh").args(["-c", script])
    }

    async fn wait_for_event(
        rx: &mut tokio::sync::broadcast::Receiver<ToolforgeEvent>,
        name: &str,
    ) -> ToolforgeEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let ev = rx.recv().await.unwrap();
                if ev.category() == EventCategory::Process && ev.name() == name {
                    return ev;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no '{}' event", name))
    }

    #[tokio::test]
    async fn test_start_twice_is_already_running() {
        let sup = supervisor();
        let snap = sup.start(ProcessSpec::new("cat", "cat")).await.unwrap();
        assert_eq!(snap.status, ProcessStatus::Running);
        assert!(snap.pid.is_some());

        let err = sup.start(ProcessSpec::new("cat", "cat")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyRunning(_)));
        assert_eq!(sup.status_all().await.len(), 1);

        sup.stop("cat").await.unwrap();
        assert!(sup.status("cat").await.is_none());
    }

    #[tokio::test]
    async fn test_stop_unknown_is_not_running() {
        let sup = supervisor();
        assert!(matches!(sup.stop("ghost").await, Err(Error::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_send_requires_running() {
        let sup = supervisor();
        let err = sup.send("ghost", "ping", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_send_round_trip_through_cat() {
        // cat echoes the request back: same id, no result → Null
        let sup = supervisor();
        sup.start(ProcessSpec::new("echo", "cat")).await.unwrap();
        let result = sup
            .send("echo", "ping", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
        sup.stop("echo").await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let sup = ProcessSupervisor::new(
            SupervisorSettings {
                stop_grace_ms: 200,
                ..fast_settings()
            },
            fast_restart(),
            Arc::new(EventBus::new()),
        );
        sup.start(sh("stubborn", "trap '' TERM; while true; do sleep 0.05; done"))
            .await
            .unwrap();

        let started = Instant::now();
        sup.stop("stubborn").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(sup.status("stubborn").await.is_none());
    }

    #[tokio::test]
    async fn test_clean_exit_is_not_restarted() {
        let sup = supervisor();
        let mut rx = sup.events().receiver();
        sup.start(sh("clean", "sleep 0.3; exit 0")).await.unwrap();

        wait_for_event(&mut rx, "exited").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sup.status("clean").await.is_none());
        assert_eq!(sup.restart_count("clean"), 0);
    }

    #[tokio::test]
    async fn test_crash_restarts_once() {
        let sup = supervisor();
        let mut rx = sup.events().receiver();
        let marker = tempfile::tempdir().unwrap();
        let flag = marker.path().join("ran");
        // crash the first time only
        let script = format!(
            "if [ -e {f} ]; then sleep 30; else touch {f}; sleep 0.3; exit 1; fi",
            f = flag.display()
        );
        sup.start(sh("crashy", &script)).await.unwrap();

        let ev = wait_for_event(&mut rx, "restarting").await;
        match ev.as_process() {
            Some(ProcessEvent::Restarting { attempt, .. }) => assert_eq!(*attempt, 1),
            other => panic!("unexpected: {:?}", other),
        }
        wait_for_event(&mut rx, "restarted").await;
        assert_eq!(sup.restart_count("crashy"), 1);
        assert!(sup.is_running("crashy").await);

        sup.stop("crashy").await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_limit_exceeded() {
        let sup = ProcessSupervisor::new(
            fast_settings(),
            RestartSettings {
                max_restarts: 2,
                restart_delay_ms: 20,
                ..RestartSettings::default()
            },
            Arc::new(EventBus::new()),
        );
        let mut rx = sup.events().receiver();
        sup.start(sh("doomed", "sleep 0.2; exit 3")).await.unwrap();

        let ev = wait_for_event(&mut rx, "restart-limit-exceeded").await;
        match ev.as_process() {
            Some(ProcessEvent::RestartLimitExceeded { max_restarts, .. }) => {
                assert_eq!(*max_restarts, 2)
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(sup.status("doomed").await.is_none());
    }

    #[tokio::test]
    async fn test_exit_during_startup_grace() {
        let sup = supervisor();
        let err = sup.start(sh("early", "exit 4")).await.unwrap_err();
        assert!(matches!(err, Error::ProcessExited { .. }));
    }

    #[tokio::test]
    async fn test_pending_requests_rejected_on_exit() {
        let sup = supervisor();
        // reads nothing, dies shortly after start
        sup.start(sh("dies", "sleep 0.3; exit 2")).await.unwrap();
        let err = sup
            .send("dies", "tools/call", Value::Null)
            .await
            .unwrap_err();
        match err {
            Error::ProcessExited { code, .. } => assert_eq!(code, Some(2)),
            other => panic!("unexpected: {:?}", other),
        }
        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_notification_readiness() {
        let sup = ProcessSupervisor::new(
            SupervisorSettings {
                readiness: ReadinessMode::Notification {
                    method: "ready".into(),
                },
                ..fast_settings()
            },
            fast_restart(),
            Arc::new(EventBus::new()),
        );
        sup.start(sh("ready", "echo '{\"method\":\"ready\"}'; exec cat"))
            .await
            .unwrap();
        assert!(sup.is_running("ready").await);

        let err = sup.start(ProcessSpec::new("silent", "cat")).await.unwrap_err();
        assert!(matches!(err, Error::StartupTimeout { .. }));
        assert!(sup.status("silent").await.is_none());

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_all() {
        let sup = supervisor();
        sup.start(ProcessSpec::new("a", "cat")).await.unwrap();
        sup.start(ProcessSpec::new("b", "cat")).await.unwrap();

        let results = sup.stop_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(sup.status_all().await.is_empty());
    }
}
