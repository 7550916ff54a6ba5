//! Session controller
//!
//! Sequences build, the operator-confirmation pause, and teardown. A build
//! failure triggers an immediate best-effort teardown over whatever subset
//! went live, so partially built infrastructure is never silently left
//! running. The pause is the session's only suspension point; if the
//! process dies there, nothing is cleaned up automatically (run the tool
//! again and tear down by tags, or reclaim manually).

use crate::config::SessionConfig;
use crate::gateway::ProviderGateway;
use crate::graph::{DependencyGraph, NodeState};
use crate::orchestrator::{build, destroy, RetryPolicy, TeardownReport};
use crate::topology;
use anyhow::{Context, Result};
use std::future::Future;
use tracing::{info, warn};

/// Blocking operator signal between build and teardown.
pub trait ConfirmTeardown: Send + Sync {
    fn wait(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Waits for the operator to press Enter.
pub struct StdinConfirm;

impl ConfirmTeardown for StdinConfirm {
    async fn wait(&self) -> Result<()> {
        println!("Topology is live. Press Enter to destroy the infrastructure.");
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| ())
        })
        .await
        .context("confirmation task failed")?
        .context("reading operator confirmation")
    }
}

/// Skips the pause (`--yes`).
pub struct AutoConfirm;

impl ConfirmTeardown for AutoConfirm {
    async fn wait(&self) -> Result<()> {
        info!("teardown pre-confirmed, not pausing");
        Ok(())
    }
}

/// Build the session topology, await the operator signal, tear it down.
///
/// Returns the teardown report; the caller decides whether failed entries
/// constitute an overall session failure.
pub async fn run<G: ProviderGateway, C: ConfirmTeardown>(
    config: &SessionConfig,
    gateway: &G,
    confirm: &C,
) -> Result<TeardownReport> {
    let descriptors = topology::plan(config)?;
    let mut graph = DependencyGraph::new(descriptors)?;
    let policy = RetryPolicy::from(&config.retry);

    if let Err(build_err) = build(&mut graph, gateway).await {
        warn!(
            error = %build_err,
            node = build_err.failed_node().unwrap_or("(resolution)"),
            "build failed, tearing down the live subset"
        );
        let report = destroy(&mut graph, gateway, &policy).await;
        debug_assert_eq!(graph.count_in_state(NodeState::Live), 0);
        for failure in report.failed() {
            warn!(
                node = %failure.logical_name,
                kind = %failure.kind,
                "cleanup after failed build also failed, reclaim manually"
            );
        }
        return Err(anyhow::Error::from(build_err).context("session build failed"));
    }

    info!(
        session = %config.session_id,
        nodes = graph.creation_order().len(),
        "topology is live"
    );

    confirm.wait().await?;

    Ok(destroy(&mut graph, gateway, &policy).await)
}
