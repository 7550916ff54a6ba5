//! Dependency graph of session resources
//!
//! Assembles the descriptors requested for a session into a validated DAG
//! keyed by logical name. The creation order is a deterministic topological
//! sort; the teardown order is the exact reverse of the creation order, not
//! an independently computed sort, which guarantees symmetry between build
//! and destroy.

mod dag;
mod node;

pub use node::{
    ImageSelector, IngressRule, NodeState, ResourceKind, ResourceNode, ResourceSpec, SubnetScope,
};

use crate::error::GraphError;
use crate::gateway::{ResolvedDep, ResolvedDeps};
use dag::DependencyDag;
use std::collections::HashMap;

/// A session's resources and their creation order.
///
/// Owns every [`ResourceNode`] for the duration of one session; only the
/// currently active orchestrator (build xor teardown) mutates node state.
pub struct DependencyGraph {
    nodes: HashMap<String, ResourceNode>,
    creation_order: Vec<String>,
}

impl DependencyGraph {
    /// Validate descriptors and compute the creation order.
    ///
    /// Fails with a [`GraphError`] before any provider call when a logical
    /// name is duplicated, a dependency reference does not resolve, a
    /// descriptor is missing something its kind requires, or the induced
    /// relation is cyclic.
    pub fn new(descriptors: Vec<ResourceNode>) -> Result<Self, GraphError> {
        let mut nodes: HashMap<String, ResourceNode> = HashMap::with_capacity(descriptors.len());
        let mut dag = DependencyDag::new();

        for node in &descriptors {
            if nodes.contains_key(&node.logical_name) {
                return Err(GraphError::DuplicateName(node.logical_name.clone()));
            }
            node.validate_attributes()?;
            dag.add_node(&node.logical_name);
            nodes.insert(node.logical_name.clone(), node.clone());
        }

        for node in &descriptors {
            for dependency in &node.depends_on {
                if !nodes.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        node: node.logical_name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                dag.add_dependency(dependency, &node.logical_name);
            }
        }

        let kinds: HashMap<&str, ResourceKind> = descriptors
            .iter()
            .map(|n| (n.logical_name.as_str(), n.kind()))
            .collect();
        for node in &descriptors {
            validate_dependency_kinds(node, &kinds)?;
        }

        let creation_order = dag.creation_order()?;

        Ok(Self {
            nodes,
            creation_order,
        })
    }

    /// Logical names in creation order.
    pub fn creation_order(&self) -> &[String] {
        &self.creation_order
    }

    /// Logical names in teardown order: the exact reverse of the creation
    /// order.
    pub fn teardown_order(&self) -> Vec<String> {
        self.creation_order.iter().rev().cloned().collect()
    }

    pub fn node(&self, name: &str) -> &ResourceNode {
        &self.nodes[name]
    }

    pub(crate) fn node_mut(&mut self, name: &str) -> &mut ResourceNode {
        self.nodes.get_mut(name).expect("node present in graph")
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.creation_order.iter().map(|name| &self.nodes[name])
    }

    /// Number of nodes currently in the given state.
    pub fn count_in_state(&self, state: NodeState) -> usize {
        self.nodes.values().filter(|n| n.state == state).count()
    }

    /// Collect the live ids of a node's dependencies.
    ///
    /// Called only after the topological walk has made every dependency
    /// `Live`; a dependency without a live id at that point is a walk-order
    /// bug, hence the panic rather than an error.
    pub(crate) fn resolved_dependencies(&self, name: &str) -> ResolvedDeps {
        let node = &self.nodes[name];
        let entries = node
            .depends_on
            .iter()
            .map(|dep_name| {
                let dep = &self.nodes[dep_name];
                let live_id = dep
                    .live_id
                    .clone()
                    .unwrap_or_else(|| panic!("dependency `{dep_name}` has no live id"));
                ResolvedDep {
                    logical_name: dep_name.clone(),
                    kind: dep.kind(),
                    live_id,
                }
            })
            .collect();
        ResolvedDeps::new(entries)
    }
}

/// Count a node's dependencies of a given kind.
fn deps_of_kind(node: &ResourceNode, kinds: &HashMap<&str, ResourceKind>, kind: ResourceKind) -> usize {
    node.depends_on
        .iter()
        .filter(|d| kinds[d.as_str()] == kind)
        .count()
}

/// Cross-node validation: each kind requires dependencies of certain kinds
/// so that its create call has the live ids it needs.
fn validate_dependency_kinds(
    node: &ResourceNode,
    kinds: &HashMap<&str, ResourceKind>,
) -> Result<(), GraphError> {
    let name = &node.logical_name;
    let networks = deps_of_kind(node, kinds, ResourceKind::Network);
    let subnets = deps_of_kind(node, kinds, ResourceKind::Subnet);
    let groups = deps_of_kind(node, kinds, ResourceKind::SecurityGroup);

    match &node.spec {
        ResourceSpec::Network { .. } => Ok(()),
        ResourceSpec::Gateway
        | ResourceSpec::Subnet { .. }
        | ResourceSpec::SecurityGroup { .. }
        | ResourceSpec::TargetGroup { .. }
            if networks != 1 =>
        {
            Err(GraphError::invalid(
                name,
                format!("{} must depend on exactly one network", node.kind()),
            ))
        }
        ResourceSpec::RouteTable { default_route } => {
            if networks != 1 {
                return Err(GraphError::invalid(
                    name,
                    "route table must depend on exactly one network",
                ));
            }
            let gateways = deps_of_kind(node, kinds, ResourceKind::Gateway);
            if *default_route && gateways != 1 {
                return Err(GraphError::invalid(
                    name,
                    "default route requires exactly one gateway dependency",
                ));
            }
            Ok(())
        }
        ResourceSpec::LoadBalancer { .. } => {
            if subnets == 0 || groups == 0 {
                return Err(GraphError::invalid(
                    name,
                    "load balancer requires subnet and security group dependencies",
                ));
            }
            Ok(())
        }
        ResourceSpec::Listener { .. } => {
            let balancers = deps_of_kind(node, kinds, ResourceKind::LoadBalancer);
            let targets = deps_of_kind(node, kinds, ResourceKind::TargetGroup);
            if balancers != 1 || targets != 1 {
                return Err(GraphError::invalid(
                    name,
                    "listener requires one load balancer and one target group",
                ));
            }
            Ok(())
        }
        ResourceSpec::Instance { .. } => {
            if subnets != 1 || groups == 0 {
                return Err(GraphError::invalid(
                    name,
                    "instance requires one subnet and at least one security group",
                ));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
