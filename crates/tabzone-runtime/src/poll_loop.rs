//! Daemon wiring: host → orchestrator → periodic passes + UDS server.

use std::path::Path;
use std::sync::Arc;

use tokio::time::{Duration, interval};

use tabzone_host::{HostEvent, HostLayout, MemoryHost, TabHost};

use crate::cli::{DaemonOpts, StateOpts, default_settings_path, default_state_path};
use crate::collab::LogEviction;
use crate::context::EngineContext;
use crate::orchestrator::{CycleOutcome, Orchestrator, OrchestratorConfig};
use crate::server;
use crate::settings_source::FileSettings;
use crate::store::JsonFileStore;

/// State shared by the poll loop and the server.
pub struct DaemonState {
    pub orchestrator: Arc<Orchestrator>,
    /// In-process host the daemon drives.
    pub host: Arc<MemoryHost>,
}

impl DaemonState {
    /// Mirror a forwarded event onto the in-process host where it describes
    /// a change the host itself would have made.
    pub fn simulate(&self, event: &HostEvent) -> anyhow::Result<()> {
        match event {
            HostEvent::TabCreated { tab } => self.host.add_tab(tab.clone())?,
            HostEvent::TabRemoved {
                tab_id,
                window_closing: false,
                ..
            } => {
                if self.host.tabs(event_window(event)?)?.iter().any(|t| t.id == *tab_id) {
                    self.host.remove_tabs(&[*tab_id])?;
                }
            }
            HostEvent::TabNavigated { tab_id, url, .. } => self.host.navigate(*tab_id, url)?,
            HostEvent::WindowFocusChanged { window_id } => self.host.set_focused(*window_id),
            _ => {}
        }
        Ok(())
    }
}

fn event_window(event: &HostEvent) -> anyhow::Result<tabzone_core::WindowId> {
    event
        .window()
        .ok_or_else(|| anyhow::anyhow!("{} carries no window", event.kind()))
}

/// Build the engine context from file-backed collaborators.
pub fn build_context(host: Arc<dyn TabHost>, opts: &StateOpts) -> EngineContext {
    let state_path = opts.state.clone().unwrap_or_else(default_state_path);
    let settings_path = opts.settings.clone().unwrap_or_else(default_settings_path);
    let store = JsonFileStore::open(state_path);
    tracing::debug!(
        "state at {}, settings at {}",
        store.path().display(),
        settings_path.display()
    );

    let ctx = EngineContext::new(
        host,
        Arc::new(store),
        Arc::new(FileSettings::new(settings_path)),
    );
    if opts.evict {
        ctx.with_eviction(Arc::new(LogEviction))
    } else {
        ctx
    }
}

pub fn load_host(layout: Option<&Path>) -> anyhow::Result<MemoryHost> {
    match layout {
        Some(path) if path.exists() => Ok(MemoryHost::load(path)?),
        Some(path) => {
            tracing::info!("layout {} not found, starting empty", path.display());
            Ok(MemoryHost::new(HostLayout::default()))
        }
        None => Ok(MemoryHost::new(HostLayout::default())),
    }
}

/// Run the daemon: recovery, periodic passes and the UDS server until a
/// shutdown signal arrives.
pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let host = Arc::new(load_host(opts.layout.as_deref())?);
    let ctx = build_context(host.clone(), &opts.state);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(ctx),
        OrchestratorConfig {
            guard_ceiling: Duration::from_secs(opts.guard_ceiling_secs),
            debounce: Duration::from_millis(opts.debounce_ms),
        },
    ));

    match orchestrator.recover().await {
        Ok(true) => tracing::info!("startup recovery complete"),
        Ok(false) => {}
        Err(e) => tracing::warn!("startup recovery failed: {e:#}"),
    }

    let state = Arc::new(DaemonState {
        orchestrator: Arc::clone(&orchestrator),
        host: Arc::clone(&host),
    });

    // Start UDS server
    let server_state = Arc::clone(&state);
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_state).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Start poll loop
    let poll_orchestrator = Arc::clone(&orchestrator);
    let poll_secs = opts.interval_secs.max(1);
    let poll_handle = tokio::spawn(async move {
        run_poll_loop(poll_orchestrator, poll_secs).await;
    });

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = poll_handle => {
            tracing::warn!("poll loop exited unexpectedly");
        }
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    if let Some(path) = &opts.layout
        && let Err(e) = host.save(path)
    {
        tracing::warn!("could not write layout {}: {e}", path.display());
    }
    tracing::info!("daemon stopped");
    Ok(())
}

async fn run_poll_loop(orchestrator: Arc<Orchestrator>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs));

    loop {
        ticker.tick().await;

        match orchestrator.run_cycle().await {
            CycleOutcome::Completed(report) if report.sort.is_noop() => {
                tracing::debug!("pass complete: {} items, layout unchanged", report.items);
            }
            CycleOutcome::Completed(report) => {
                tracing::debug!("pass complete: {} items", report.items);
            }
            CycleOutcome::Skipped => tracing::debug!("pass skipped"),
            // already logged by the orchestrator
            CycleOutcome::Aborted(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings_source::StaticSettings;
    use crate::store::MemoryStore;
    use tabzone_core::{ItemId, LiveTab, LiveWindow, Settings, WindowId};

    fn daemon_state() -> DaemonState {
        let host = Arc::new(MemoryHost::new(HostLayout {
            windows: vec![LiveWindow {
                id: WindowId(1),
                focused: false,
            }],
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

    fn tab(id: u64) -> LiveTab {
        LiveTab {
            id: ItemId(id),
            window_id: WindowId(1),
            index: 0,
            pinned: false,
            group_id: None,
            url: "https://a.test/".into(),
            title: String::new(),
        }
    }

    #[test]
    fn simulate_mirrors_host_changes() {
        let state = daemon_state();
        state
            .simulate(&HostEvent::TabCreated { tab: tab(4) })
            .expect("create");
        assert_eq!(state.host.tabs(WindowId(1)).expect("tabs").len(), 1);

        state
            .simulate(&HostEvent::TabNavigated {
                tab_id: ItemId(4),
                window_id: WindowId(1),
                url: "https://moved.test/".into(),
            })
            .expect("navigate");
        assert_eq!(
            state.host.tabs(WindowId(1)).expect("tabs")[0].url,
            "https://moved.test/"
        );

        state
            .simulate(&HostEvent::WindowFocusChanged {
                window_id: Some(WindowId(1)),
            })
            .expect("focus");
        assert!(state.host.layout().windows[0].focused);

        let removal = HostEvent::TabRemoved {
            tab_id: ItemId(4),
            window_id: WindowId(1),
            window_closing: false,
        };
        state.simulate(&removal).expect("remove");
        // already gone: no error
        state.simulate(&removal).expect("remove again");
        assert!(state.host.tabs(WindowId(1)).expect("tabs").is_empty());
    }

    #[test]
    fn missing_layout_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = load_host(Some(&dir.path().join("none.json"))).expect("host");
        assert!(host.layout().windows.is_empty());
    }

    #[test]
    fn evict_flag_installs_sink() {
        let host: Arc<dyn TabHost> = Arc::new(MemoryHost::new(HostLayout::default()));
        let dir = tempfile::tempdir().expect("tempdir");
        let opts = StateOpts {
            state: Some(dir.path().join("state.json")),
            settings: Some(dir.path().join("settings.toml")),
            evict: true,
        };
        assert!(build_context(Arc::clone(&host), &opts).eviction.is_some());
        let opts = StateOpts {
            evict: false,
            ..opts
        };
        assert!(build_context(host, &opts).eviction.is_none());
    }
}
