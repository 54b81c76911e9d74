//! tabzone: tab aging and zone-sorting runtime binary.
//! Single process embedding the engine, its collaborators and the daemon
//! surface.

use clap::Parser;

mod cli;
mod client;
mod cmd_classify;
mod cmd_ls;
mod cmd_pass;
mod collab;
mod context;
mod guard;
mod orchestrator;
mod poll_loop;
mod recovery;
mod server;
mod settings_source;
mod sorter;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("TABZONE_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("tabzone daemon starting");

            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            poll_loop::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Pass(opts) => {
            cmd_pass::cmd_pass(opts).await?;
        }
        cli::Command::Status => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_status(&socket_path).await?;
        }
        cli::Command::Ls(opts) => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            cmd_ls::cmd_ls(&socket_path, opts.window).await?;
        }
        cli::Command::Event(opts) => {
            let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);
            client::cmd_event(&socket_path, &opts.json).await?;
        }
        cli::Command::Classify(opts) => {
            cmd_classify::cmd_classify(&opts)?;
        }
    }

    Ok(())
}
