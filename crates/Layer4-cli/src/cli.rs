//! Non-interactive commands

use crate::context::{self, HostContext};
use anyhow::Context as _;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use toolforge_core::{ExecuteOptions, RetryOptions, SchemaFormat, ToolDescriptor};
use toolforge_foundation::{ExecutionRecord, SqliteHistory};

/// Start providers, print their status, stop them again
pub async fn status(config_path: &Path) -> anyhow::Result<()> {
    let ctx = HostContext::load(config_path, false)?;
    ctx.start_servers().await;

    let snapshots = ctx.supervisor.status_all().await;
    let mut configured: Vec<_> = ctx.config.servers.keys().cloned().collect();
    configured.sort();

    if configured.is_empty() {
        println!("No servers configured in {}.", config_path.display());
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<8} {:<10} {:<30}",
        "SERVER", "STATUS", "PID", "RESTARTS", "COMMAND"
    );
    println!("{}", "-".repeat(78));
    for id in configured {
        match snapshots.iter().find(|s| s.server_id == id) {
            Some(snap) => println!(
                "{:<16} {:<10} {:<8} {:<10} {:<30}",
                truncate(&id, 16),
                snap.status.to_string(),
                snap.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                snap.restart_count,
                truncate(&format!("{} {}", snap.command, snap.args.join(" ")), 30)
            ),
            None => {
                let state = match ctx.config.servers.get(&id) {
                    Some(server) if !server.enabled => "disabled",
                    _ => "failed",
                };
                println!("{:<16} {:<10}", truncate(&id, 16), state);
            }
        }
    }

    ctx.shutdown().await;
    Ok(())
}

/// List tools as a table, or as consumer schemas with `--format`
pub async fn tools(
    config_path: &Path,
    format: Option<SchemaFormat>,
    all: bool,
) -> anyhow::Result<()> {
    let ctx = HostContext::load(config_path, false)?;
    ctx.start_servers().await;

    if let Some(format) = format {
        let schemas = ctx.registry.schemas(format);
        println!("{}", serde_json::to_string_pretty(&schemas)?);
    } else {
        let mut tools: Vec<ToolDescriptor> = ctx
            .registry
            .list()
            .into_iter()
            .filter(|t| !t.hidden && (all || t.enabled))
            .collect();
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        print_tools(&tools);
    }

    ctx.shutdown().await;
    Ok(())
}

fn print_tools(tools: &[ToolDescriptor]) {
    if tools.is_empty() {
        println!("No tools. Use --all to include disabled tools.");
        return;
    }

    println!(
        "{:<28} {:<10} {:<4} {:<40}",
        "ID", "ORIGIN", "ON", "DESCRIPTION"
    );
    println!("{}", "-".repeat(84));
    for tool in tools {
        println!(
            "{:<28} {:<10} {:<4} {:<40}",
            truncate(&tool.id, 28),
            tool.origin.label(),
            if tool.enabled { "✓" } else { "✗" },
            truncate(&tool.description, 40)
        );
    }
}

pub async fn set_enabled(config_path: &Path, id: &str, enabled: bool) -> anyhow::Result<()> {
    let ctx = HostContext::load(config_path, false)?;
    // provider 도구는 sync 이후에만 등록됨
    if !ctx.registry.contains(id) {
        ctx.start_servers().await;
    }

    let result = ctx.registry.set_enabled(id, enabled);
    ctx.shutdown().await;
    result?;

    println!("{} {}", if enabled { "Enabled" } else { "Disabled" }, id);
    Ok(())
}

/// Execute one tool. Ctrl-C cancels a single attempt; retries run to the end.
pub async fn run(
    config_path: &Path,
    tool: &str,
    args: &str,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
    auto_approve: bool,
) -> anyhow::Result<()> {
    let args: Value =
        serde_json::from_str(args).with_context(|| format!("Arguments are not JSON: {}", args))?;
    let options = ExecuteOptions {
        timeout: timeout_ms.map(Duration::from_millis),
    };

    let ctx = HostContext::load(config_path, auto_approve)?;
    ctx.start_servers().await;

    let result = match retries {
        Some(max_attempts) => {
            let retry = RetryOptions {
                max_attempts,
                ..RetryOptions::from(ctx.engine.settings())
            };
            ctx.engine.execute_with_retry(tool, args, options, retry).await
        }
        None => {
            let token = ctx.engine.cancel_token();
            let call = ctx.engine.execute_cancelable(tool, args, options, &token);
            tokio::pin!(call);
            tokio::select! {
                result = &mut call => result,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("Cancelling...");
                    ctx.engine.cancel(&token);
                    call.await
                }
            }
        }
    };

    ctx.shutdown().await;

    match result {
        Ok(output) => {
            match output {
                Value::String(text) => println!("{}", text),
                other => println!("{}", serde_json::to_string_pretty(&other)?),
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ [{}] {}", e.kind(), e);
            Err(e.into())
        }
    }
}

pub fn history(limit: u32, failed_only: bool) -> anyhow::Result<()> {
    let history = SqliteHistory::open(&context::data_dir())?;
    let records = if failed_only {
        history.failures(limit)?
    } else {
        history.recent(limit)?
    };

    if records.is_empty() {
        println!("No executions recorded.");
        return Ok(());
    }

    println!(
        "{:<20} {:<24} {:<4} {:<8} {:<30}",
        "TIME", "TOOL", "OK", "MS", "ERROR"
    );
    println!("{}", "-".repeat(90));
    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &ExecutionRecord) {
    let error = match (&record.error_kind, &record.error_message) {
        (Some(kind), Some(message)) => format!("{}: {}", kind, message),
        (Some(kind), None) => kind.clone(),
        _ => String::new(),
    };
    println!(
        "{:<20} {:<24} {:<4} {:<8} {:<30}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        truncate(&record.tool_id, 24),
        if record.success { "✓" } else { "✗" },
        record.duration_ms,
        truncate(&error, 30)
    );
}

/// Truncate a string for display
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_len {
        s
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
