//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use tabzone_host::HostEvent;

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `tabzone status`
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let status = rpc_call(socket_path, "status", serde_json::json!({})).await?;
    println!("{}", format_status(&status));
    Ok(())
}

/// `tabzone event '<json>'`: validated locally before it is sent.
pub async fn cmd_event(socket_path: &str, json: &str) -> anyhow::Result<()> {
    let event: HostEvent =
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("invalid event: {e}"))?;
    let result = rpc_call(socket_path, "event", serde_json::to_value(&event)?).await?;
    println!("{}: {}", event.kind(), result.as_str().unwrap_or("?"));
    Ok(())
}

pub(crate) fn format_status(status: &serde_json::Value) -> String {
    let stats = &status["stats"];
    let mut lines = vec![
        format!(
            "tracking {} tabs in {} windows, activity {}s",
            status["items"].as_u64().unwrap_or(0),
            status["windows"].as_u64().unwrap_or(0),
            status["activity_ms"].as_u64().unwrap_or(0) / 1000
        ),
        format!(
            "passes: {} completed, {} skipped, {} aborted; re-sorts: {}; recoveries: {}",
            stats["cycles_completed"].as_u64().unwrap_or(0),
            stats["cycles_skipped"].as_u64().unwrap_or(0),
            stats["cycles_aborted"].as_u64().unwrap_or(0),
            stats["sorts_completed"].as_u64().unwrap_or(0),
            stats["recoveries"].as_u64().unwrap_or(0)
        ),
    ];
    if status["cycle_in_progress"].as_bool() == Some(true) {
        lines.push("pass in progress".to_string());
    }
    let counts = &status["last_pass"]["counts"];
    if counts.is_object() {
        lines.push(format!(
            "last pass: {} fresh, {} aging, {} stale, {} expired",
            counts["fresh"].as_u64().unwrap_or(0),
            counts["aging"].as_u64().unwrap_or(0),
            counts["stale"].as_u64().unwrap_or(0),
            counts["expired"].as_u64().unwrap_or(0)
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_status_without_pass() {
        let status = serde_json::json!({
            "items": 4,
            "windows": 2,
            "activity_ms": 61_500,
            "cycle_in_progress": false,
            "stats": {"cycles_completed": 0, "recoveries": 1},
            "last_pass": null,
        });
        let out = format_status(&status);
        assert!(out.starts_with("tracking 4 tabs in 2 windows, activity 61s"));
        assert!(out.contains("recoveries: 1"));
        assert!(!out.contains("last pass"));
    }

    #[test]
    fn format_status_with_pass() {
        let status = serde_json::json!({
            "items": 3,
            "windows": 1,
            "activity_ms": 0,
            "cycle_in_progress": true,
            "stats": {"cycles_completed": 2},
            "last_pass": {"counts": {"fresh": 1, "aging": 1, "stale": 1, "expired": 0}},
        });
        let out = format_status(&status);
        assert!(out.contains("pass in progress"));
        assert!(out.contains("last pass: 1 fresh, 1 aging, 1 stale, 0 expired"));
    }

    #[tokio::test]
    async fn unreachable_daemon_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("missing.sock");
        let err = rpc_call(socket.to_str().expect("utf8"), "status", serde_json::json!({}))
            .await
            .expect_err("no daemon");
        assert!(err.to_string().contains("cannot connect to daemon"));
    }
}
