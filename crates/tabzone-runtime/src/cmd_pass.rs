//! `tabzone pass`: one recovery + evaluation pass against a layout file.

use std::sync::Arc;

use crate::cli::PassOpts;
use crate::orchestrator::{CycleOutcome, Orchestrator, OrchestratorConfig};
use crate::poll_loop::{build_context, load_host};

/// Each invocation is a fresh process, so the pass starts with recovery
/// against whatever the previous run persisted.
pub async fn run_pass(opts: &PassOpts) -> anyhow::Result<CycleOutcome> {
    let host = Arc::new(load_host(Some(&opts.layout))?);
    let ctx = build_context(host.clone(), &opts.state);
    let orchestrator = Orchestrator::new(Arc::new(ctx), OrchestratorConfig::default());

    let outcome = orchestrator.run_cycle().await;
    host.save(&opts.layout)?;
    Ok(outcome)
}

pub async fn cmd_pass(opts: PassOpts) -> anyhow::Result<()> {
    let outcome = run_pass(&opts).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let CycleOutcome::Aborted(reason) = outcome {
        anyhow::bail!("pass aborted: {reason}");
    }
    Ok(())
}
