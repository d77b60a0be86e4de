//! Cancel tokens for cancelable executions

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 실행에 쓰이지 않은 발급 토큰의 수명
pub const ISSUED_TOKEN_TTL: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct Entry {
    token: CancellationToken,
    issued_at: Instant,
    in_use: bool,
}

impl Entry {
    fn new(in_use: bool) -> Self {
        Self {
            token: CancellationToken::new(),
            issued_at: Instant::now(),
            in_use,
        }
    }
}

/// Token id → CancellationToken
///
/// Entries exist only for issued tokens and running executions. Issued
/// tokens that never run expire after the TTL.
#[derive(Debug)]
pub struct CancelRegistry {
    tokens: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for CancelRegistry {
    fn default() -> Self {
        Self::with_ttl(ISSUED_TOKEN_TTL)
    }
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// 새 토큰 발급
    pub fn issue(&self) -> String {
        let id = Uuid::new_v4().to_string();
        if let Ok(mut tokens) = self.tokens.lock() {
            let ttl = self.ttl;
            tokens.retain(|_, e| e.in_use || e.issued_at.elapsed() < ttl);
            tokens.insert(id.clone(), Entry::new(false));
        }
        id
    }

    /// Token for an execution about to run. Registers caller-supplied ids
    /// until [`release`](Self::release).
    pub fn token(&self, id: &str) -> CancellationToken {
        match self.tokens.lock() {
            Ok(mut tokens) => {
                let entry = tokens
                    .entry(id.to_string())
                    .or_insert_with(|| Entry::new(true));
                entry.in_use = true;
                entry.token.clone()
            }
            Err(_) => CancellationToken::new(),
        }
    }

    /// Marks a known token cancelled. An issued token cancelled before its
    /// execution starts stays cancelled. Unknown ids are ignored.
    pub fn cancel(&self, id: &str) -> bool {
        let Ok(tokens) = self.tokens.lock() else {
            return false;
        };
        match tokens.get(id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_cancelled(&self, id: &str) -> bool {
        self.tokens
            .lock()
            .ok()
            .and_then(|t| t.get(id).map(|e| e.token.is_cancelled()))
            .unwrap_or(false)
    }

    pub fn release(&self, id: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
