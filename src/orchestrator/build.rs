//! Provisioning walk
//!
//! Creates each node in creation order, feeding the live ids of its
//! dependencies into the gateway call. Fail-fast: the first create failure
//! halts the walk and propagates; the caller is responsible for tearing
//! down whatever subset reached `Live`.

use super::resolve::resolve;
use crate::error::BuildError;
use crate::gateway::ProviderGateway;
use crate::graph::{DependencyGraph, NodeState};
use tracing::{error, info};

/// Resolve dynamic attributes, then create every node in creation order.
///
/// On success every node is `Live` with a recorded live id. On failure the
/// failed node is marked `Failed`, nodes after it stay `Pending`, and the
/// returned [`BuildError`] names the node; the session controller then runs
/// a best-effort teardown over the `Live` subset.
pub async fn build<G: ProviderGateway>(
    graph: &mut DependencyGraph,
    gateway: &G,
) -> Result<(), BuildError> {
    resolve(graph, gateway).await?;

    let order: Vec<String> = graph.creation_order().to_vec();
    info!(nodes = order.len(), "provisioning topology");

    for name in order {
        let deps = graph.resolved_dependencies(&name);
        graph.node_mut(&name).state = NodeState::Creating;

        let node = graph.node(&name).clone();
        info!(node = %name, kind = %node.kind(), "creating");

        let live_id = match gateway.create(&node, &deps).await {
            Ok(id) => id,
            Err(e) => {
                error!(node = %name, error = %e, "create failed, halting build");
                graph.node_mut(&name).state = NodeState::Failed;
                return Err(BuildError::Create {
                    node: name,
                    source: e,
                });
            }
        };

        if node.kind().awaits_ready() {
            info!(node = %name, live_id = %live_id, "waiting until ready");
            if let Err(e) = gateway.await_ready(node.kind(), &live_id).await {
                error!(node = %name, error = %e, "resource never became ready");
                // The provider did hand out an id; keep it so cleanup can
                // still delete the resource.
                let failed = graph.node_mut(&name);
                failed.live_id = Some(live_id);
                failed.state = NodeState::Failed;
                return Err(BuildError::Create {
                    node: name,
                    source: e,
                });
            }
        }

        let done = graph.node_mut(&name);
        done.live_id = Some(live_id);
        done.state = NodeState::Live;
        info!(node = %name, live_id = %done.live_id.as_deref().unwrap_or(""), "live");
    }

    Ok(())
}
