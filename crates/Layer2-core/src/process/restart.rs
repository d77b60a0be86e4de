//! Restart policy (circuit breaker)
//!
//! 결정 순서:
//! 1. exit code 0 → 재시작 안 함
//! 2. auto restart 비활성 → 재시작 안 함
//! 3. 보관된 시작 설정 없음 → 재시작 안 함
//! 4. 마지막 재시작 이후 reset window 경과 → count 초기화
//! 5. count >= max → 재시작 안 함 (limit exceeded)
//! 6. count += 1, 시각 기록, delay 후 재시작

use super::supervisor::ProcessSpec;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use toolforge_foundation::RestartSettings;

#[derive(Debug, Clone)]
struct RestartState {
    count: u32,
    last_restart: Option<Instant>,
    spec: ProcessSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefuseReason {
    CleanExit,
    Disabled,
    Unknown,
    LimitExceeded { max_restarts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RestartDecision {
    Restart {
        attempt: u32,
        delay: Duration,
        spec: ProcessSpec,
    },
    Refuse(RefuseReason),
}

pub struct RestartPolicy {
    settings: RestartSettings,
    states: Mutex<HashMap<String, RestartState>>,
}

impl RestartPolicy {
    pub fn new(settings: RestartSettings) -> Self {
        Self {
            settings,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RestartSettings {
        &self.settings
    }

    /// Retain the start configuration. An existing count survives.
    pub fn remember(&self, spec: &ProcessSpec) {
        if let Ok(mut states) = self.states.lock() {
            states
                .entry(spec.server_id.clone())
                .and_modify(|s| s.spec = spec.clone())
                .or_insert_with(|| RestartState {
                    count: 0,
                    last_restart: None,
                    spec: spec.clone(),
                });
        }
    }

    /// Drop all retained state (explicit stop)
    pub fn forget(&self, server_id: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(server_id);
        }
    }

    pub fn restart_count(&self, server_id: &str) -> u32 {
        self.states
            .lock()
            .ok()
            .and_then(|s| s.get(server_id).map(|st| st.count))
            .unwrap_or(0)
    }

    pub fn decide(&self, server_id: &str, exit_code: Option<i32>, now: Instant) -> RestartDecision {
        if exit_code == Some(0) {
            return RestartDecision::Refuse(RefuseReason::CleanExit);
        }
        if !self.settings.auto_restart {
            return RestartDecision::Refuse(RefuseReason::Disabled);
        }

        let mut states = match self.states.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(state) = states.get_mut(server_id) else {
            return RestartDecision::Refuse(RefuseReason::Unknown);
        };

        if let Some(last) = state.last_restart {
            if now.saturating_duration_since(last) > self.settings.reset_interval() {
                state.count = 0;
            }
        }

        if state.count >= self.settings.max_restarts {
            return RestartDecision::Refuse(RefuseReason::LimitExceeded {
                max_restarts: self.settings.max_restarts,
            });
        }

        state.count += 1;
        state.last_restart = Some(now);

        RestartDecision::Restart {
            attempt: state.count,
            delay: self.settings.restart_delay(),
            spec: state.spec.clone(),
        }
    }
}
