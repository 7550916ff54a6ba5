//! Resource descriptor model
//!
//! Pure data: each node carries its kind-specific attributes, its declared
//! dependency edges, and its lifecycle state. Attributes are immutable once
//! the node is constructed, except for the resolution slots (availability
//! zone, image id) that the orchestrator fills exactly once before the
//! topological walk begins.

use crate::error::GraphError;
use std::fmt;

/// Kinds of resources the topology engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Network,
    Gateway,
    Subnet,
    RouteTable,
    SecurityGroup,
    LoadBalancer,
    TargetGroup,
    Listener,
    Instance,
}

impl ResourceKind {
    /// Creation must block until the provider reports the resource usable
    /// (e.g. the load balancer has a routable address) before the node
    /// counts as `Live`.
    pub fn awaits_ready(self) -> bool {
        matches!(self, ResourceKind::LoadBalancer)
    }

    /// Deletion must be confirmed fully propagated before the walk advances,
    /// so that nodes deleted later (e.g. the security group a load balancer
    /// referenced) do not race the provider's internal release.
    pub fn awaits_deleted(self) -> bool {
        matches!(self, ResourceKind::Instance | ResourceKind::LoadBalancer)
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Gateway => "gateway",
            ResourceKind::Subnet => "subnet",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::TargetGroup => "target-group",
            ResourceKind::Listener => "listener",
            ResourceKind::Instance => "instance",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Node lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Creating,
    Live,
    Deleting,
    Deleted,
    Failed,
}

/// Whether a subnet is routed to the internet gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubnetScope {
    Public,
    Private,
}

/// One ingress rule on a security group (single port, single CIDR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub protocol: String,
    pub port: u16,
    pub cidr: String,
    pub description: String,
}

impl IngressRule {
    pub fn tcp(port: u16, cidr: &str, description: &str) -> Self {
        Self {
            protocol: "tcp".to_string(),
            port,
            cidr: cidr.to_string(),
            description: description.to_string(),
        }
    }
}

/// Criteria for selecting a machine image at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSelector {
    pub name_pattern: String,
    pub architecture: String,
}

/// Kind-specific creation attributes.
#[derive(Debug, Clone)]
pub enum ResourceSpec {
    Network {
        cidr_block: String,
    },
    Gateway,
    Subnet {
        cidr_block: String,
        scope: SubnetScope,
        /// Index into the availability-zone pool sampled at resolution time.
        /// `None` lets the provider pick.
        zone_slot: Option<usize>,
        /// Filled by the resolution phase when `zone_slot` is set.
        zone: Option<String>,
    },
    RouteTable {
        /// Issue a 0.0.0.0/0 route via the gateway dependency as part of the
        /// create step. A default route without a gateway dependency is a
        /// configuration error, not a routeless route.
        default_route: bool,
    },
    SecurityGroup {
        group_name: String,
        description: String,
        ingress: Vec<IngressRule>,
    },
    LoadBalancer {
        name: String,
    },
    TargetGroup {
        name: String,
        protocol: String,
        port: u16,
    },
    Listener {
        protocol: String,
        port: u16,
    },
    Instance {
        instance_type: String,
        image: ImageSelector,
        /// Filled by the resolution phase.
        image_id: Option<String>,
    },
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Network { .. } => ResourceKind::Network,
            ResourceSpec::Gateway => ResourceKind::Gateway,
            ResourceSpec::Subnet { .. } => ResourceKind::Subnet,
            ResourceSpec::RouteTable { .. } => ResourceKind::RouteTable,
            ResourceSpec::SecurityGroup { .. } => ResourceKind::SecurityGroup,
            ResourceSpec::LoadBalancer { .. } => ResourceKind::LoadBalancer,
            ResourceSpec::TargetGroup { .. } => ResourceKind::TargetGroup,
            ResourceSpec::Listener { .. } => ResourceKind::Listener,
            ResourceSpec::Instance { .. } => ResourceKind::Instance,
        }
    }
}

/// One requested resource instance in the session graph.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub logical_name: String,
    pub spec: ResourceSpec,
    /// Logical names of nodes that must be `Live` before this one is created.
    pub depends_on: Vec<String>,
    pub state: NodeState,
    /// Provider-assigned identifier; set on create success, cleared once
    /// deletion succeeds.
    pub live_id: Option<String>,
}

impl ResourceNode {
    pub fn new(
        logical_name: impl Into<String>,
        spec: ResourceSpec,
        depends_on: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            spec,
            depends_on: depends_on.into_iter().collect(),
            state: NodeState::Pending,
            live_id: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    /// Validate attributes that can be checked without looking at other
    /// nodes. Cross-node checks (dependency kinds) live in the graph builder.
    pub(crate) fn validate_attributes(&self) -> Result<(), GraphError> {
        let name = &self.logical_name;
        match &self.spec {
            ResourceSpec::Network { cidr_block } | ResourceSpec::Subnet { cidr_block, .. }
                if cidr_block.is_empty() =>
            {
                Err(GraphError::invalid(name, "missing CIDR block"))
            }
            ResourceSpec::SecurityGroup { group_name, .. } if group_name.is_empty() => {
                Err(GraphError::invalid(name, "missing security group name"))
            }
            ResourceSpec::LoadBalancer { name: lb_name } if lb_name.is_empty() => {
                Err(GraphError::invalid(name, "missing load balancer name"))
            }
            ResourceSpec::TargetGroup { name: tg_name, .. } if tg_name.is_empty() => {
                Err(GraphError::invalid(name, "missing target group name"))
            }
            ResourceSpec::Instance {
                instance_type,
                image,
                ..
            } => {
                if instance_type.is_empty() {
                    return Err(GraphError::invalid(name, "missing instance type"));
                }
                if image.name_pattern.is_empty() {
                    return Err(GraphError::invalid(name, "missing image name pattern"));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_balancer_waits_on_both_sides() {
        assert!(ResourceKind::LoadBalancer.awaits_ready());
        assert!(ResourceKind::LoadBalancer.awaits_deleted());
    }

    #[test]
    fn instances_confirm_termination() {
        assert!(!ResourceKind::Instance.awaits_ready());
        assert!(ResourceKind::Instance.awaits_deleted());
    }

    #[test]
    fn plain_kinds_never_wait() {
        for kind in [
            ResourceKind::Network,
            ResourceKind::Gateway,
            ResourceKind::Subnet,
            ResourceKind::RouteTable,
            ResourceKind::SecurityGroup,
            ResourceKind::TargetGroup,
            ResourceKind::Listener,
        ] {
            assert!(!kind.awaits_ready(), "{kind} should not await ready");
            assert!(!kind.awaits_deleted(), "{kind} should not await deleted");
        }
    }

    #[test]
    fn subnet_without_cidr_is_invalid() {
        let node = ResourceNode::new(
            "subnet-a",
            ResourceSpec::Subnet {
                cidr_block: String::new(),
                scope: SubnetScope::Private,
                zone_slot: None,
                zone: None,
            },
            ["net".to_string()],
        );
        assert!(matches!(
            node.validate_attributes(),
            Err(GraphError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn instance_requires_type_and_image() {
        let node = ResourceNode::new(
            "web-1",
            ResourceSpec::Instance {
                instance_type: String::new(),
                image: ImageSelector {
                    name_pattern: "al2023-*".into(),
                    architecture: "x86_64".into(),
                },
                image_id: None,
            },
            [],
        );
        assert!(node.validate_attributes().is_err());
    }
}
