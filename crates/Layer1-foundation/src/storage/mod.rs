//! Storage module
//!
//! - `history`: 실행 기록 (SQLite / 메모리)
//! - `json`: JSON - 범용 파일 저장/로드, 도구 활성화 상태

mod history;
mod json;

use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

pub use history::{ExecutionRecord, HistorySink, MemoryHistory, SqliteHistory};
pub use json::JsonStore;

/// Opaque key/value persistence for small state blobs
pub trait StateStore: Send + Sync {
    fn load_state(&self, key: &str) -> Result<Option<Value>>;

    fn save_state(&self, key: &str, value: &Value) -> Result<()>;
}

/// 메모리 상태 저장소 (테스트용)
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load_state(&self, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| crate::Error::Internal("Lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save_state(&self, key: &str, value: &Value) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| crate::Error::Internal("Lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.clone());
        Ok(())
    }
}
