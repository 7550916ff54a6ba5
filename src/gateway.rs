//! Provider gateway capability surface
//!
//! The orchestrators never talk to the network directly; every create,
//! delete, wait, and lookup goes through [`ProviderGateway`]. The AWS
//! implementation lives in [`crate::aws`]; tests drive the orchestrators
//! against in-memory stubs of this trait.

use crate::graph::{ResourceKind, ResourceNode};
use anyhow::Result;
use std::future::Future;
use thiserror::Error;

/// How a delete failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteErrorKind {
    /// The provider still holds a reference to the resource. Dependents may
    /// already be deleted; the provider's internal release is asynchronous
    /// and lags the delete-accepted response. Retryable.
    InUse,
    /// The resource no longer exists. Treated as already-deleted.
    NotFound,
    /// Anything else. Not retried; recorded and teardown continues.
    Other,
}

/// A classified delete failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DeleteError {
    pub kind: DeleteErrorKind,
    pub message: String,
}

impl DeleteError {
    pub fn in_use(message: impl Into<String>) -> Self {
        Self {
            kind: DeleteErrorKind::InUse,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: DeleteErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: DeleteErrorKind::Other,
            message: message.into(),
        }
    }
}

/// One resolved dependency of a node: its identity plus the provider id it
/// received when it went `Live`.
#[derive(Debug, Clone)]
pub struct ResolvedDep {
    pub logical_name: String,
    pub kind: ResourceKind,
    pub live_id: String,
}

/// The live ids of a node's dependencies, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDeps {
    entries: Vec<ResolvedDep>,
}

impl ResolvedDeps {
    pub fn new(entries: Vec<ResolvedDep>) -> Self {
        Self { entries }
    }

    /// The single dependency of the given kind.
    ///
    /// Graph validation guarantees the cardinality each kind requires, so a
    /// miss here means the gateway asked for a dependency the descriptor
    /// never declared.
    pub fn one(&self, kind: ResourceKind) -> Result<&str> {
        let mut matching = self.entries.iter().filter(|d| d.kind == kind);
        let first = matching
            .next()
            .ok_or_else(|| anyhow::anyhow!("no {kind} dependency resolved"))?;
        if matching.next().is_some() {
            anyhow::bail!("multiple {kind} dependencies where one was expected");
        }
        Ok(&first.live_id)
    }

    /// All dependencies of the given kind, in declaration order.
    pub fn all(&self, kind: ResourceKind) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|d| d.kind == kind)
            .map(|d| d.live_id.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pre-build lookup queries. Performed once per session before the
/// topological walk; failures are fatal to the whole build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeQuery {
    /// Distinct availability zones to spread subnets across.
    AvailabilityZones { count: usize },
    /// Newest machine image matching the name pattern and architecture.
    ImageByFilters {
        name_pattern: String,
        architecture: String,
    },
}

/// Answers to [`DescribeQuery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeAnswer {
    Zones(Vec<String>),
    ImageId(String),
}

/// Abstract capability surface over the cloud provider.
///
/// Every call is a potentially long-latency blocking operation from the
/// core's perspective; polling happens only inside the wait primitives.
pub trait ProviderGateway: Send + Sync {
    /// Create the resource described by `node`, wiring in the live ids of
    /// its dependencies. Returns the provider-assigned identifier.
    ///
    /// Composite steps are part of the same logical create: a route table's
    /// default route and subnet associations are issued here, not as
    /// separate nodes.
    fn create(
        &self,
        node: &ResourceNode,
        deps: &ResolvedDeps,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Delete the resource, classifying failures for the retry policy.
    fn delete(
        &self,
        kind: ResourceKind,
        live_id: &str,
    ) -> impl Future<Output = Result<(), DeleteError>> + Send;

    /// Block until the resource is usable (e.g. the load balancer reports
    /// an address). Only called for kinds where
    /// [`ResourceKind::awaits_ready`] holds.
    fn await_ready(
        &self,
        kind: ResourceKind,
        live_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Block until deletion is fully propagated. Only called for kinds
    /// where [`ResourceKind::awaits_deleted`] holds.
    fn await_deleted(
        &self,
        kind: ResourceKind,
        live_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Run a pre-build resolution query.
    fn describe(&self, query: DescribeQuery) -> impl Future<Output = Result<DescribeAnswer>> + Send;
}
