//! Request multiplexer - 프로세스 하나당 하나
//!
//! Correlates outbound requests with inbound responses over a single byte
//! stream. Inbound bytes are buffered, split on `\n`, and each complete line is
//! parsed on its own; a bad line is dropped without affecting its neighbours.

use super::protocol::{Inbound, Notification, Request, RequestTimeouts};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use toolforge_foundation::{Error, Result};
use tracing::{debug, trace, warn};

type Reply = Result<Value>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// 개행 없이 이보다 길어진 입력은 버린다
pub const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

/// Bytes not yet terminated by `\n`. `scanned` bytes are known to hold none.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
    scanned: usize,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.bytes.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(rel) = self.bytes[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + rel;
            lines.push(self.bytes[start..end].to_vec());
            start = end + 1;
            self.scanned = start;
        }
        self.bytes.drain(..start);
        self.scanned = self.bytes.len();
        lines
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.scanned = 0;
    }
}

/// Removes the pending entry however `send` exits, including when the
/// caller drops the future.
struct PendingGuard<'a> {
    mux: &'a RequestMultiplexer,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.mux.take_pending(self.id);
    }
}

pub struct RequestMultiplexer {
    server_id: String,

    /// 요청 ID 카운터
    next_id: AtomicU64,

    /// 대기 중인 요청들 (id -> response sender)
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,

    /// 아직 개행을 받지 못한 바이트
    buffer: Mutex<LineBuffer>,
    max_line_bytes: usize,

    writer: tokio::sync::Mutex<Writer>,

    notifications: broadcast::Sender<Notification>,

    timeouts: RequestTimeouts,

    closed: AtomicBool,
}

impl RequestMultiplexer {
    pub fn new(
        server_id: impl Into<String>,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        timeouts: RequestTimeouts,
    ) -> Self {
        let (notifications, _) = broadcast::channel(256);
        Self {
            server_id: server_id.into(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            buffer: Mutex::new(LineBuffer::default()),
            max_line_bytes: MAX_LINE_BYTES,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            notifications,
            timeouts,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send one request and wait for its response or the method-class timeout
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::NotRunning(self.server_id.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = Request::new(id, method, params).to_line()?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?
            .insert(id, tx);
        let _guard = PendingGuard { mux: self, id };

        trace!(server_id = %self.server_id, id, method, "Sending request");

        if let Err(e) = self.write_line(&line).await {
            warn!(server_id = %self.server_id, error = %e, "Failed to write request");
            return Err(Error::process_exited(&self.server_id, None));
        }

        let timeout = self.timeouts.for_method(method);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            // sender dropped without a reply
            Ok(Err(_)) => Err(Error::process_exited(&self.server_id, None)),
            Err(_) => {
                debug!(server_id = %self.server_id, id, method, "Request timed out");
                Err(Error::RequestTimeout {
                    server_id: self.server_id.clone(),
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await
    }

    fn take_pending(&self, id: u64) -> Option<oneshot::Sender<Reply>> {
        self.pending.lock().ok().and_then(|mut p| p.remove(&id))
    }

    /// Append inbound bytes and dispatch every complete line
    pub fn feed(&self, chunk: &[u8]) {
        let lines: Vec<Vec<u8>> = {
            let mut buffer = match self.buffer.lock() {
                Ok(b) => b,
                Err(poisoned) => poisoned.into_inner(),
            };
            let lines = buffer.push(chunk);
            if buffer.bytes.len() > self.max_line_bytes {
                warn!(
                    server_id = %self.server_id,
                    bytes = buffer.bytes.len(),
                    limit = self.max_line_bytes,
                    "Discarding oversized unterminated line"
                );
                buffer.clear();
            }
            lines
        };

        for line in lines {
            self.dispatch_line(&line);
        }
    }

    fn dispatch_line(&self, line: &[u8]) {
        let trimmed = trim_ascii(line);
        if trimmed.is_empty() {
            return;
        }

        let message: Value = match serde_json::from_slice(trimmed) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    server_id = %self.server_id,
                    error = %e,
                    line = %String::from_utf8_lossy(trimmed),
                    "Discarding unparsable line"
                );
                return;
            }
        };

        let inbound: Inbound = match serde_json::from_value(message.clone()) {
            Ok(m) => m,
            Err(e) => {
                warn!(server_id = %self.server_id, error = %e, "Discarding non-object message");
                return;
            }
        };

        if let Some(tx) = inbound.request_id().and_then(|id| self.take_pending(id)) {
            let reply = inbound.into_outcome().map_err(|message| Error::Remote {
                server_id: self.server_id.clone(),
                message,
            });
            // 호출자가 이미 포기했으면 무시
            let _ = tx.send(reply);
            return;
        }

        let notification = Notification {
            method: inbound.method_name().map(str::to_string),
            params: inbound.params.unwrap_or(Value::Null),
            message,
        };
        trace!(server_id = %self.server_id, method = ?notification.method, "Notification");
        let _ = self.notifications.send(notification);
    }

    /// Reject every pending request with `ProcessExited` and refuse new ones
    pub fn fail_all(&self, code: Option<i32>) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = match self.pending.lock() {
            Ok(mut p) => p.drain().collect(),
            Err(_) => return,
        };
        if !drained.is_empty() {
            debug!(server_id = %self.server_id, count = drained.len(), "Rejecting pending requests");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(Error::process_exited(&self.server_id, code)));
        }
    }

    /// Pump `reader` into [`feed`](Self::feed) until EOF
    pub fn spawn_reader<R>(self: &Arc<Self>, mut reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mux = Arc::clone(self);
        tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => mux.feed(&chunk[..n]),
                    Err(e) => {
                        debug!(server_id = %mux.server_id, error = %e, "stdout read failed");
                        break;
                    }
                }
            }
            debug!(server_id = %mux.server_id, "stdout reader finished");
        })
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
