//! Tool Registry - 도구 등록 및 관리
//!
//! ## 기능
//! - id → descriptor 맵 + name → ids 다중 인덱스
//! - 출처별 기본 활성화 (builtin/process: 비활성, user: 설정값)
//! - 활성화 상태 영속화 (`tool_state`), hidden 도구 제외
//! - id/이름 조회, 이름 충돌 시 process 도구 우선
//!
//! ```ignore
//! let registry = ToolRegistry::with_store(Arc::new(JsonStore::global()?));
//! registry.register(ToolDescriptor::builtin("read_file"), Some(handler))?;
//! registry.set_enabled("read_file", true)?;
//!
//! if let Some(tool) = registry.lookup("read_file") {
//!     tool.handler.call(args).await?;
//! }
//! ```

use super::descriptor::ToolDescriptor;
use super::handler::ToolHandler;
use super::schema::{SchemaFormat, SchemaTranslator};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use toolforge_foundation::{Error, Result, StateStore};
use tracing::{debug, info, warn};

/// `StateStore` 키
pub const TOOL_STATE_KEY: &str = "tool_state";

struct ToolEntry {
    descriptor: ToolDescriptor,
    handler: Option<Arc<dyn ToolHandler>>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, ToolEntry>,
    /// 등록 순서 유지
    by_name: HashMap<String, Vec<String>>,
    /// 저장된 사용자 선택
    preferences: HashMap<String, bool>,
}

/// Lookup result
#[derive(Clone)]
pub struct ResolvedTool {
    pub descriptor: ToolDescriptor,
    pub handler: Option<Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("descriptor", &self.descriptor)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// 도구 레지스트리
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
    store: Option<Arc<dyn StateStore>>,
}

impl ToolRegistry {
    /// 빈 레지스트리 (영속화 없음)
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            store: None,
        }
    }

    /// Saved enablement is loaded once here and applied on registration.
    pub fn with_store(store: Arc<dyn StateStore>) -> Self {
        let preferences = match store.load_state(TOOL_STATE_KEY) {
            Ok(Some(Value::Object(map))) => map
                .into_iter()
                .filter_map(|(id, v)| v.as_bool().map(|b| (id, b)))
                .collect(),
            Ok(_) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load tool state, using defaults");
                HashMap::new()
            }
        };

        Self {
            inner: RwLock::new(RegistryInner {
                preferences,
                ..RegistryInner::default()
            }),
            store: Some(store),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryInner>> {
        self.inner
            .read()
            .map_err(|_| Error::Internal("Tool registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryInner>> {
        self.inner
            .write()
            .map_err(|_| Error::Internal("Tool registry lock poisoned".to_string()))
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// 도구 등록
    ///
    /// Re-registering an existing id replaces its descriptor and handler but
    /// keeps its current enabled state.
    pub fn register(
        &self,
        mut descriptor: ToolDescriptor,
        handler: Option<Arc<dyn ToolHandler>>,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let id = descriptor.id.clone();

        if let Some(existing) = inner.entries.get(&id) {
            descriptor.enabled = existing.descriptor.enabled;
            let old_name = existing.descriptor.name.clone();
            if old_name != descriptor.name {
                remove_from_index(&mut inner.by_name, &old_name, &id);
                inner
                    .by_name
                    .entry(descriptor.name.clone())
                    .or_default()
                    .push(id.clone());
            }
            debug!(tool_id = %id, "Replaced tool");
        } else {
            if !descriptor.hidden {
                descriptor.enabled = match inner.preferences.get(&id) {
                    Some(saved) => *saved,
                    None => default_enabled(&descriptor),
                };
            }
            inner
                .by_name
                .entry(descriptor.name.clone())
                .or_default()
                .push(id.clone());
            debug!(tool_id = %id, origin = descriptor.origin.label(), enabled = descriptor.enabled, "Registered tool");
        }

        inner.entries.insert(id, ToolEntry { descriptor, handler });
        Ok(())
    }

    /// 도구 제거 (builtin 불가)
    pub fn remove(&self, id: &str) -> Result<ToolDescriptor> {
        let mut inner = self.write()?;
        match inner.entries.get(id) {
            None => return Err(Error::NotFound(format!("Tool '{}' not found", id))),
            Some(entry) if entry.descriptor.origin.is_builtin() => {
                return Err(Error::InvalidInput(format!(
                    "Builtin tool '{}' cannot be removed",
                    id
                )))
            }
            Some(_) => {}
        }

        let entry = inner
            .entries
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("Tool '{}' not found", id)))?;
        remove_from_index(&mut inner.by_name, &entry.descriptor.name, id);
        debug!(tool_id = %id, "Removed tool");
        Ok(entry.descriptor)
    }

    // ========================================================================
    // Enablement
    // ========================================================================

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let snapshot = {
            let mut inner = self.write()?;
            let entry = inner
                .entries
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("Tool '{}' not found", id)))?;
            entry.descriptor.enabled = enabled;
            if entry.descriptor.hidden {
                return Ok(());
            }
            inner.preferences.insert(id.to_string(), enabled);
            inner
                .preferences
                .iter()
                .map(|(k, v)| (k.clone(), Value::Bool(*v)))
                .collect::<Map<String, Value>>()
        };

        info!(tool_id = %id, enabled, "Tool enablement changed");
        if let Some(store) = &self.store {
            if let Err(e) = store.save_state(TOOL_STATE_KEY, &Value::Object(snapshot)) {
                warn!(tool_id = %id, error = %e, "Failed to persist tool state");
            }
        }
        Ok(())
    }

    /// 저장된 선택을 현재 도구들에 다시 적용
    pub fn restore(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let saved: HashMap<String, bool> = match store.load_state(TOOL_STATE_KEY)? {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(id, v)| v.as_bool().map(|b| (id, b)))
                .collect(),
            _ => HashMap::new(),
        };

        let mut inner = self.write()?;
        let mut applied = 0;
        for (id, enabled) in &saved {
            if let Some(entry) = inner.entries.get_mut(id) {
                if !entry.descriptor.hidden {
                    entry.descriptor.enabled = *enabled;
                    applied += 1;
                }
            }
        }
        inner.preferences = saved;
        Ok(applied)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Exact id first, then display name. Among same-named tools a
    /// process-backed one wins, otherwise the first registered.
    pub fn lookup(&self, id_or_name: &str) -> Option<ResolvedTool> {
        let inner = self.read().ok()?;
        if let Some(entry) = inner.entries.get(id_or_name) {
            return Some(resolved(entry));
        }

        let ids = inner.by_name.get(id_or_name)?;
        let chosen = ids
            .iter()
            .filter_map(|id| inner.entries.get(id))
            .find(|e| e.descriptor.origin.is_process())
            .or_else(|| ids.iter().find_map(|id| inner.entries.get(id)))?;
        Some(resolved(chosen))
    }

    pub fn get(&self, id: &str) -> Option<ToolDescriptor> {
        self.read()
            .ok()?
            .entries
            .get(id)
            .map(|e| e.descriptor.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read()
            .map(|i| i.entries.contains_key(id))
            .unwrap_or(false)
    }

    /// 모든 도구 (id 순)
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut list: Vec<ToolDescriptor> = match self.read() {
            Ok(inner) => inner.entries.values().map(|e| e.descriptor.clone()).collect(),
            Err(_) => return vec![],
        };
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// 활성화되고 숨겨지지 않은 도구
    pub fn list_enabled(&self) -> Vec<ToolDescriptor> {
        self.list()
            .into_iter()
            .filter(|d| d.enabled && !d.hidden)
            .collect()
    }

    /// 특정 서버가 제공하는 도구 id
    pub fn ids_for_server(&self, server_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = match self.read() {
            Ok(inner) => inner
                .entries
                .values()
                .filter(|e| e.descriptor.origin.server_id() == Some(server_id))
                .map(|e| e.descriptor.id.clone())
                .collect(),
            Err(_) => return vec![],
        };
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 활성 도구 스키마를 consumer 형식으로
    pub fn schemas(&self, format: SchemaFormat) -> Vec<Value> {
        self.list_enabled()
            .iter()
            .map(|d| SchemaTranslator::translate(d, format))
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_enabled(descriptor: &ToolDescriptor) -> bool {
    match descriptor.origin {
        super::ToolOrigin::Builtin | super::ToolOrigin::Process { .. } => false,
        super::ToolOrigin::User => descriptor.enabled,
    }
}

fn resolved(entry: &ToolEntry) -> ResolvedTool {
    ResolvedTool {
        descriptor: entry.descriptor.clone(),
        handler: entry.handler.clone(),
    }
}

fn remove_from_index(index: &mut HashMap<String, Vec<String>>, name: &str, id: &str) {
    if let Some(ids) = index.get_mut(name) {
        ids.retain(|i| i != id);
        if ids.is_empty() {
            index.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{FnHandler, ToolOrigin};
    use serde_json::json;
    use toolforge_foundation::MemoryStateStore;

    fn noop() -> Option<Arc<dyn ToolHandler>> {
        Some(Arc::new(FnHandler::new(|_args: Value| async { Ok(Value::Null) })))
    }

    #[test]
    fn test_default_enablement_by_origin() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::builtin("read_file").enabled(true), noop())
            .unwrap();
        registry
            .register(ToolDescriptor::process("math", "add").enabled(true), noop())
            .unwrap();
        registry
            .register(ToolDescriptor::user("greet", "greet").enabled(true), noop())
            .unwrap();
        registry
            .register(ToolDescriptor::user("off", "off").enabled(false), noop())
            .unwrap();

        assert!(!registry.get("read_file").unwrap().enabled);
        assert!(!registry.get("math:add").unwrap().enabled);
        assert!(registry.get("greet").unwrap().enabled);
        assert!(!registry.get("off").unwrap().enabled);
    }

    #[test]
    fn test_lookup_prefers_process_backed() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::user("calc", "calculator"), noop())
            .unwrap();
        registry
            .register(ToolDescriptor::user("calculator", "calc-alt"), noop())
            .unwrap();
        registry
            .register(ToolDescriptor::process("math", "calculator"), noop())
            .unwrap();

        // "calculator" is an exact id
        assert_eq!(registry.lookup("calculator").unwrap().descriptor.id, "calculator");
        assert_eq!(registry.lookup("calc").unwrap().descriptor.id, "calc");

        registry.remove("calculator").unwrap();
        let tool = registry.lookup("calculator").unwrap();
        assert_eq!(tool.descriptor.id, "math:calculator");
        assert!(tool.descriptor.origin.is_process());
    }

    #[test]
    fn test_lookup_first_registered_without_process() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::user("a", "dup"), noop())
            .unwrap();
        registry
            .register(ToolDescriptor::user("b", "dup"), noop())
            .unwrap();
        assert_eq!(registry.lookup("dup").unwrap().descriptor.id, "a");
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_remove_rejects_builtin() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::builtin("run_command"), noop())
            .unwrap();
        assert!(matches!(
            registry.remove("run_command"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(registry.remove("nope"), Err(Error::NotFound(_))));
        assert!(registry.contains("run_command"));
    }

    #[test]
    fn test_remove_clears_name_index() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::process("s", "echo"), noop())
            .unwrap();
        registry.remove("s:echo").unwrap();
        assert!(registry.lookup("echo").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_enablement_persisted_and_restored() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

        let registry = ToolRegistry::with_store(Arc::clone(&store));
        registry
            .register(ToolDescriptor::builtin("read_file"), noop())
            .unwrap();
        registry.set_enabled("read_file", true).unwrap();
        assert_eq!(
            store.load_state(TOOL_STATE_KEY).unwrap(),
            Some(json!({"read_file": true}))
        );

        // next startup
        let registry = ToolRegistry::with_store(Arc::clone(&store));
        registry
            .register(ToolDescriptor::builtin("read_file"), noop())
            .unwrap();
        assert!(registry.get("read_file").unwrap().enabled);
    }

    #[test]
    fn test_hidden_never_persisted_or_restored() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        store
            .save_state(TOOL_STATE_KEY, &json!({"internal": false}))
            .unwrap();

        let registry = ToolRegistry::with_store(Arc::clone(&store));
        registry
            .register(
                ToolDescriptor::builtin("internal").hidden(true).enabled(true),
                noop(),
            )
            .unwrap();
        assert!(registry.get("internal").unwrap().enabled);

        registry.set_enabled("internal", false).unwrap();
        assert!(!registry.get("internal").unwrap().enabled);
        assert_eq!(
            store.load_state(TOOL_STATE_KEY).unwrap(),
            Some(json!({"internal": false}))
        );

        registry.set_enabled("internal", true).unwrap();
        assert_eq!(registry.restore().unwrap(), 0);
        assert!(registry.get("internal").unwrap().enabled);
    }

    #[test]
    fn test_set_enabled_unknown() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.set_enabled("x", true),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_reregister_keeps_enabled_state() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::process("s", "t"), noop())
            .unwrap();
        registry.set_enabled("s:t", true).unwrap();
        registry
            .register(
                ToolDescriptor::process("s", "t").description("updated"),
                noop(),
            )
            .unwrap();

        let d = registry.get("s:t").unwrap();
        assert!(d.enabled);
        assert_eq!(d.description, "updated");
        assert_eq!(registry.ids_for_server("s"), vec!["s:t".to_string()]);
        assert_eq!(registry.lookup("t").unwrap().descriptor.origin, ToolOrigin::Process { server_id: "s".into() });
    }

    #[test]
    fn test_schemas_only_enabled_visible() {
        let registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::user("on", "on").enabled(true), noop())
            .unwrap();
        registry
            .register(ToolDescriptor::user("off", "off").enabled(false), noop())
            .unwrap();
        let schemas = registry.schemas(SchemaFormat::Anthropic);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["name"], "on");
    }
}
