//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use tabzone_core::{PersistedState, WindowId};
use tabzone_host::HostEvent;

use crate::poll_loop::DaemonState;

/// Run the UDS JSON-RPC server.
pub async fn run_server(socket_path: &str, state: Arc<DaemonState>) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

fn error_response(code: i64, message: &str, id: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    })
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    state: Arc<DaemonState>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let response = dispatch(&state, &request).await?;

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

async fn dispatch(
    state: &DaemonState,
    request: &serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();
    let params = &request["params"];
    let orchestrator = &state.orchestrator;

    let result = match method {
        "status" => {
            let persisted = orchestrator.context().state.read().await;
            build_status(state, &persisted)
        }
        "list_items" => {
            let window = params["window_id"].as_u64().map(WindowId);
            let persisted = orchestrator.context().state.read().await;
            build_item_list(&persisted, window)
        }
        "run_pass" => serde_json::to_value(orchestrator.run_cycle().await)?,
        "event" => {
            let event: HostEvent = match serde_json::from_value(params.clone()) {
                Ok(event) => event,
                Err(e) => {
                    return Ok(error_response(
                        -32602,
                        &format!("invalid event: {e}"),
                        id,
                    ));
                }
            };
            if let Err(e) = state.simulate(&event) {
                tracing::warn!("host rejected {}: {e:#}", event.kind());
            }
            let disposition = orchestrator.handle_event(event).await?;
            serde_json::to_value(disposition)?
        }
        _ => return Ok(error_response(-32601, "method not found", id)),
    };

    Ok(serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    }))
}

pub(crate) fn build_status(state: &DaemonState, persisted: &PersistedState) -> serde_json::Value {
    let orchestrator = &state.orchestrator;
    serde_json::json!({
        "nonce": orchestrator.context().nonce,
        "state_current": persisted.runtime_nonce.as_deref() == Some(orchestrator.context().nonce.as_str()),
        "cycle_in_progress": orchestrator.cycle_in_progress(),
        "windows": persisted.windows.len(),
        "items": persisted.items.len(),
        "activity_ms": persisted.clock.accumulated_ms,
        "stats": orchestrator.stats(),
        "last_pass": orchestrator.last_report(),
    })
}

/// Tracked tabs, ordered by window then id.
pub(crate) fn build_item_list(
    persisted: &PersistedState,
    window: Option<WindowId>,
) -> serde_json::Value {
    let mut records: Vec<_> = persisted
        .items
        .values()
        .filter(|r| window.is_none_or(|w| r.window_id == w))
        .collect();
    records.sort_by_key(|r| (r.window_id, r.id));

    let items: Vec<serde_json::Value> = records
        .into_iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id.0,
                "window_id": r.window_id.0,
                "status": r.status,
                "group_id": r.group_id.map(|g| g.0),
                "in_state_group": r.in_state_group,
                "pinned": r.pinned,
                "url": r.url,
                "refreshed_at": r.refreshed_at,
            })
        })
        .collect();
    serde_json::Value::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;
    use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    use crate::settings_source::StaticSettings;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use tabzone_core::{ItemId, ItemRecord, LiveTab, LiveWindow, Settings, Status};
    use tabzone_host::{HostLayout, MemoryHost};

    fn tab(id: u64, window: u64) -> LiveTab {
        LiveTab {
            id: ItemId(id),
            window_id: WindowId(window),
            index: 0,
            pinned: false,
            group_id: None,
            url: format!("https://t{id}.test/"),
            title: String::new(),
        }
    }

    fn make_state() -> DaemonState {
        let host = Arc::new(MemoryHost::new(HostLayout {
            windows: vec![LiveWindow {
                id: WindowId(1),
                focused: true,
            }],
            tabs: vec![tab(1, 1)],
            ..HostLayout::default()
        }));
        let ctx = EngineContext::new(
            host.clone(),
            Arc::new(MemoryStore::default()),
            Arc::new(StaticSettings(Settings::default())),
        );
        DaemonState {
            orchestrator: Arc::new(Orchestrator::new(
                Arc::new(ctx),
                OrchestratorConfig::default(),
            )),
            host,
        }
    }

    fn request(method: &str, params: serde_json::Value) -> serde_json::Value {
        serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 7})
    }

    #[test]
    fn item_list_filters_and_orders() {
        let mut persisted = PersistedState::default();
        for (id, window) in [(5, 2), (3, 1), (1, 2)] {
            let record = ItemRecord::fresh(&tab(id, window), 0, Utc::now());
            persisted.items.insert(record.id, record);
        }

        let all = build_item_list(&persisted, None);
        let ids: Vec<u64> = all
            .as_array()
            .expect("array")
            .iter()
            .map(|i| i["id"].as_u64().expect("id"))
            .collect();
        assert_eq!(ids, vec![3, 1, 5]);

        let second = build_item_list(&persisted, Some(WindowId(2)));
        assert_eq!(second.as_array().expect("array").len(), 2);
        assert_eq!(second[0]["status"], Status::Fresh.as_str());
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let state = make_state();
        let resp = dispatch(&state, &request("nope", serde_json::json!({})))
            .await
            .expect("dispatch");
        assert_eq!(resp["error"]["code"], -32601);
        assert_eq!(resp["id"], 7);
    }

    #[tokio::test]
    async fn malformed_event_is_invalid_params() {
        let state = make_state();
        let resp = dispatch(&state, &request("event", serde_json::json!({"type": "bogus"})))
            .await
            .expect("dispatch");
        assert_eq!(resp["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn run_pass_then_list_items() {
        let state = make_state();
        let resp = dispatch(&state, &request("run_pass", serde_json::json!({})))
            .await
            .expect("dispatch");
        assert_eq!(resp["result"]["outcome"], "completed");
        assert_eq!(resp["result"]["detail"]["recovered"], true);

        let resp = dispatch(&state, &request("list_items", serde_json::json!({})))
            .await
            .expect("dispatch");
        assert_eq!(resp["result"][0]["id"], 1);

        let resp = dispatch(&state, &request("status", serde_json::json!({})))
            .await
            .expect("dispatch");
        assert_eq!(resp["result"]["items"], 1);
        assert_eq!(resp["result"]["stats"]["cycles_completed"], 1);
    }

    #[tokio::test]
    async fn event_is_mirrored_and_applied() {
        let state = make_state();
        let resp = dispatch(
            &state,
            &request(
                "event",
                serde_json::json!({
                    "type": "tab_created",
                    "tab": {
                        "id": 2, "window_id": 1, "index": 1, "pinned": false,
                        "group_id": null, "url": "https://new.test/", "title": ""
                    }
                }),
            ),
        )
        .await
        .expect("dispatch");
        assert_eq!(resp["result"], "applied");
        assert_eq!(state.host.layout().tabs.len(), 2);
    }

    #[tokio::test]
    async fn serves_over_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("rpc").join("tabzoned.sock");
        let socket = socket.to_str().expect("utf8 path").to_string();

        let state = Arc::new(make_state());
        let server_socket = socket.clone();
        let server = tokio::spawn(async move { run_server(&server_socket, state).await });

        let mut result = None;
        for _ in 0..50 {
            match crate::client::rpc_call(&socket, "status", serde_json::json!({})).await {
                Ok(value) => {
                    result = Some(value);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
            }
        }
        server.abort();

        let result = result.expect("server answered");
        assert_eq!(result["cycle_in_progress"], false);
    }
}
