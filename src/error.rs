//! Error taxonomy for graph construction and provisioning
//!
//! Graph errors are static and fatal before any provider call. Build errors
//! are fatal to provisioning and trigger a best-effort teardown of whatever
//! subset reached `Live`. Teardown never surfaces a single error; failures
//! aggregate into a [`TeardownReport`](crate::orchestrator::TeardownReport).

use thiserror::Error;

/// Errors detected while validating descriptors or assembling the DAG.
///
/// All variants are fatal and guaranteed to occur before any gateway call.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Two descriptors share a logical name
    #[error("duplicate logical name `{0}`")]
    DuplicateName(String),

    /// A `depends_on` entry names a node that is not in the graph
    #[error("node `{node}` depends on unknown node `{dependency}`")]
    UnknownDependency { node: String, dependency: String },

    /// A descriptor is missing an attribute or dependency its kind requires
    #[error("invalid descriptor `{node}`: {reason}")]
    InvalidDescriptor { node: String, reason: String },

    /// Kahn's algorithm could not consume every node
    #[error("dependency cycle involving `{0}`")]
    CyclicDependency(String),
}

impl GraphError {
    pub(crate) fn invalid(node: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphError::InvalidDescriptor {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that abort provisioning.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A pre-build resolution query failed (no matching image, not enough
    /// availability zones). Never retried; no resource has been created yet.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// A node's create call failed. The walk halts here; the session runs a
    /// best-effort teardown over the subset that reached `Live`.
    #[error("failed to create `{node}`")]
    Create {
        node: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BuildError {
    /// Logical name of the node whose creation failed, if any.
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            BuildError::Resolution(_) => None,
            BuildError::Create { node, .. } => Some(node),
        }
    }
}
