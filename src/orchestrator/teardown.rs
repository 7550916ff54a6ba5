//! Teardown walk and retry policy
//!
//! Deletes nodes in the exact reverse of the creation order. Unlike build,
//! teardown is best-effort: a failed node is recorded and the walk
//! continues, because abandoning cleanup on the first error strands
//! resources and keeps costing money.

use crate::config::RetryConfig;
use crate::gateway::{DeleteErrorKind, ProviderGateway};
use crate::graph::{DependencyGraph, NodeState, ResourceKind};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded retry with linearly increasing delay for in-use delete failures.
///
/// The provider's internal release of a cross-reference (a security group
/// still attached to a load balancer whose deletion was just accepted) is
/// asynchronous and lags the delete-accepted response, so a delete can fail
/// in-use even after every declared dependent is gone.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub delay_step: Duration,
}

impl RetryPolicy {
    /// Delay to sleep after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay + self.delay_step * attempt.saturating_sub(1)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            delay_step: config.delay_step,
        }
    }
}

/// Per-node teardown result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Deleted,
    Failed { cause: String },
    /// The node never went live; there is nothing to delete.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    pub logical_name: String,
    pub kind: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// What happened to every node, in teardown order.
#[derive(Debug, Default, Serialize)]
pub struct TeardownReport {
    pub outcomes: Vec<NodeOutcome>,
}

impl TeardownReport {
    /// True when no node failed to delete.
    pub fn is_clean(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| matches!(o.outcome, Outcome::Failed { .. }))
    }

    /// Nodes that must be reclaimed manually.
    pub fn failed(&self) -> impl Iterator<Item = &NodeOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. }))
    }

    pub fn deleted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == Outcome::Deleted)
            .count()
    }
}

/// Delete every node with a live id, in reverse creation order.
///
/// Never fails fast: each node's result lands in the report and the walk
/// continues. Kinds that require confirmation (instances, the load
/// balancer) are awaited fully deleted before the next node is attempted,
/// so nodes deleted later do not race the provider's release.
pub async fn destroy<G: ProviderGateway>(
    graph: &mut DependencyGraph,
    gateway: &G,
    policy: &RetryPolicy,
) -> TeardownReport {
    let order = graph.teardown_order();
    info!(nodes = order.len(), "tearing down topology");

    let mut report = TeardownReport::default();
    for name in order {
        let node = graph.node(&name);
        let kind = node.kind();

        // A node that failed mid-create may still hold a provider id; it
        // needs deletion like any live node.
        let Some(live_id) = node.live_id.clone() else {
            debug!(node = %name, "never live, skipping");
            report.outcomes.push(NodeOutcome {
                logical_name: name,
                kind: kind.label().to_string(),
                outcome: Outcome::Skipped,
            });
            continue;
        };

        graph.node_mut(&name).state = NodeState::Deleting;
        let outcome = delete_with_retry(gateway, kind, &name, &live_id, policy).await;

        match &outcome {
            Outcome::Deleted => {
                if kind.awaits_deleted() {
                    if let Err(e) = gateway.await_deleted(kind, &live_id).await {
                        // The delete was accepted; dependents that race the
                        // propagation are covered by their own retries.
                        warn!(node = %name, error = %e, "could not confirm deletion");
                    }
                }
                let done = graph.node_mut(&name);
                done.live_id = None;
                done.state = NodeState::Deleted;
                info!(node = %name, kind = %kind, "deleted");
            }
            Outcome::Failed { cause } => {
                graph.node_mut(&name).state = NodeState::Failed;
                warn!(node = %name, kind = %kind, cause = %cause, "teardown failed, continuing");
            }
            Outcome::Skipped => unreachable!("live node cannot be skipped"),
        }

        report.outcomes.push(NodeOutcome {
            logical_name: name,
            kind: kind.label().to_string(),
            outcome,
        });
    }

    report
}

async fn delete_with_retry<G: ProviderGateway>(
    gateway: &G,
    kind: ResourceKind,
    name: &str,
    live_id: &str,
    policy: &RetryPolicy,
) -> Outcome {
    for attempt in 1..=policy.max_attempts {
        match gateway.delete(kind, live_id).await {
            Ok(()) => return Outcome::Deleted,
            Err(e) if e.kind == DeleteErrorKind::NotFound => {
                debug!(node = %name, "already deleted");
                return Outcome::Deleted;
            }
            Err(e) if e.kind == DeleteErrorKind::InUse => {
                if attempt == policy.max_attempts {
                    return Outcome::Failed {
                        cause: format!(
                            "still in use after {} attempts: {e}",
                            policy.max_attempts
                        ),
                    };
                }
                let delay = policy.delay_after(attempt);
                warn!(
                    node = %name,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "still in use, waiting for the provider to release it"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Outcome::Failed {
                    cause: e.to_string(),
                };
            }
        }
    }
    unreachable!("retry loop returns on the final attempt")
}
