//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tabzone", about = "tab aging and zone-sorting engine")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/tabzone/tabzoned.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (recovery + periodic passes + UDS server)
    Daemon(DaemonOpts),
    /// Run one recovery and evaluation pass against a layout file
    Pass(PassOpts),
    /// Show daemon status summary
    Status,
    /// List tracked tabs with their status
    Ls(LsOpts),
    /// Forward a host event (JSON) to the daemon
    Event(EventOpts),
    /// Print the status a tab of the given age would have
    Classify(ClassifyOpts),
}

#[derive(clap::Args)]
pub struct StateOpts {
    /// Persisted state file (default: $XDG_STATE_HOME/tabzone/state.json)
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Settings file (default: $XDG_CONFIG_HOME/tabzone/settings.toml)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Evict expired tabs (logged, then closed)
    #[arg(long)]
    pub evict: bool,
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Seconds between evaluation passes
    #[arg(long, default_value = "60")]
    pub interval_secs: u64,

    /// Host layout file; loaded at start and written back on shutdown
    #[arg(long)]
    pub layout: Option<PathBuf>,

    #[command(flatten)]
    pub state: StateOpts,

    /// Quiet period before a reactive re-sort
    #[arg(long, default_value = "750")]
    pub debounce_ms: u64,

    /// Seconds after which a stuck pass guard is force-released
    #[arg(long, default_value = "60")]
    pub guard_ceiling_secs: u64,
}

#[derive(clap::Args)]
pub struct PassOpts {
    /// Host layout file, rewritten after the pass
    #[arg(long)]
    pub layout: PathBuf,

    #[command(flatten)]
    pub state: StateOpts,
}

#[derive(clap::Args)]
pub struct LsOpts {
    /// Only tabs of this window
    #[arg(long)]
    pub window: Option<u64>,
}

#[derive(clap::Args)]
pub struct EventOpts {
    /// Event JSON, e.g. '{"type":"window_removed","window_id":3}'
    pub json: String,
}

#[derive(clap::Args)]
pub struct ClassifyOpts {
    /// Age of the tab in seconds
    #[arg(long)]
    pub age_secs: u64,

    /// Settings file (default: $XDG_CONFIG_HOME/tabzone/settings.toml)
    #[arg(long)]
    pub settings: Option<PathBuf>,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/tabzone/tabzoned.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/tabzone-{user}/tabzoned.sock")
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    if let Ok(dir) = std::env::var(var)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(fallback)
}

pub fn default_state_path() -> PathBuf {
    xdg_dir("XDG_STATE_HOME", ".local/state")
        .join("tabzone")
        .join("state.json")
}

pub fn default_settings_path() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
        .join("tabzone")
        .join("settings.toml")
}
