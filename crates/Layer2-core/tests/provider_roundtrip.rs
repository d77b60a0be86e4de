//! Provider 통합 테스트 - sh 로 작성한 provider 와 실제 왕복
//!
//! `cargo test -p toolforge-core --test provider_roundtrip`

#![cfg(unix)]

use serde_json::json;
use std::sync::Arc;
use toolforge_core::{
    ExecuteOptions, ExecutionEngine, ProcessSpec, ProcessSupervisor, ToolRegistry, ToolSync,
};
use toolforge_foundation::{
    Error, EventBus, ExecutionEvent, ReadinessMode, RestartSettings, SupervisorSettings,
};

/// Line-delimited JSON provider with two tools: `echo` and `fail`
const PROVIDER: &str = r##"
echo '{"method":"ready"}'
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/^{"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"tools/list"'*)
      printf '{"id":%s,"result":{"tools":[{"name":"echo","description":"Echo text","inputSchema":{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}},{"name":"fail"}]}}\n' "$id" ;;
    *'"name":"echo"'*)
      text=$(printf '%s' "$line" | sed -n 's/.*"text":"\([^"]*\)".*/\1/p')
      printf '{"id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$text" ;;
    *'"name":"fail"'*)
      printf '{"id":%s,"result":{"isError":true,"content":[{"type":"text","text":"boom"}]}}\n' "$id" ;;
    *)
      printf '{"id":%s,"error":{"message":"unknown method"}}\n' "$id" ;;
  esac
done
"##;

fn supervisor(events: Arc<EventBus>) -> ProcessSupervisor {
    ProcessSupervisor::new(
        SupervisorSettings {
            readiness: ReadinessMode::Notification {
                method: "ready".into(),
            },
            startup_timeout_ms: 5_000,
            stop_grace_ms: 1_000,
            ..SupervisorSettings::default()
        },
        RestartSettings {
            auto_restart: false,
            ..RestartSettings::default()
        },
        events,
    )
}

#[tokio::test]
async fn test_provider_tools_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("provider.sh");
    std::fs::write(&script, PROVIDER).unwrap();

    let events = Arc::new(EventBus::new());
    let mut rx = events.receiver();
    let sup = supervisor(Arc::clone(&events));
    let registry = Arc::new(ToolRegistry::new());
    let sync = ToolSync::new(sup.clone(), Arc::clone(&registry));

    sup.start(ProcessSpec::new("demo", "sh").args([script.to_string_lossy().to_string()]))
        .await
        .unwrap();

    let count = sync.sync_server("demo").await.unwrap();
    assert_eq!(count, 2);
    assert!(registry.contains("demo:echo"));
    assert!(registry.contains("demo:fail"));

    // provider 도구는 기본 비활성
    registry.set_enabled("demo:echo", true).unwrap();
    registry.set_enabled("demo:fail", true).unwrap();

    let engine = ExecutionEngine::builder(Arc::clone(&registry), Arc::clone(&events)).build();

    let out = engine
        .execute("echo", json!({"text": "hi"}), ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(out, json!("hi"));

    let err = engine
        .execute("echo", json!({}), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ValidationFailed { .. }));

    let err = engine
        .execute("demo:fail", json!({}), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "handler_error");
    assert!(err.to_string().contains("boom"));

    let mut successes = 0;
    while let Ok(ev) = rx.try_recv() {
        if let Some(ExecutionEvent::Success { tool_id, .. }) = ev.as_execution() {
            assert_eq!(tool_id, "demo:echo");
            successes += 1;
        }
    }
    assert_eq!(successes, 1);

    sup.stop("demo").await.unwrap();
    assert_eq!(sync.unsync_server("demo"), 2);
    assert!(registry.is_empty());

    let err = engine
        .execute("echo", json!({"text": "hi"}), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
