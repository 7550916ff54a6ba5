//! Session topology catalog
//!
//! Translates a [`SessionConfig`] into the ordered descriptor list the
//! graph builder consumes. Every corpus variant comes out of here: the full
//! topology with load balancer and instances, subsets without either, down
//! to a single standalone network.

use crate::config::SessionConfig;
use crate::error::GraphError;
use crate::graph::{IngressRule, ResourceNode, ResourceSpec, SubnetScope};

/// Build the descriptor list for a session.
///
/// Descriptor order is meaningful: siblings at the same dependency depth
/// are created in this sequence.
pub fn plan(config: &SessionConfig) -> Result<Vec<ResourceNode>, GraphError> {
    let net = &config.network;
    let mut nodes = Vec::new();
    // Consecutive /24 blocks carved out of the VPC CIDR.
    let mut block = 0usize;

    nodes.push(ResourceNode::new(
        "vpc",
        ResourceSpec::Network {
            cidr_block: net.cidr_block.clone(),
        },
        [],
    ));

    if net.public_subnet_count > 0 {
        nodes.push(ResourceNode::new(
            "igw",
            ResourceSpec::Gateway,
            ["vpc".to_string()],
        ));
    }

    let private_subnets: Vec<String> = (1..=net.private_subnet_count)
        .map(|i| format!("private-subnet-{i}"))
        .collect();
    for name in &private_subnets {
        nodes.push(ResourceNode::new(
            name.clone(),
            ResourceSpec::Subnet {
                cidr_block: subnet_cidr(&net.cidr_block, block)?,
                scope: SubnetScope::Private,
                zone_slot: None,
                zone: None,
            },
            ["vpc".to_string()],
        ));
        block += 1;
    }

    let public_subnets: Vec<String> = (1..=net.public_subnet_count)
        .map(|i| format!("public-subnet-{i}"))
        .collect();
    for (slot, name) in public_subnets.iter().enumerate() {
        nodes.push(ResourceNode::new(
            name.clone(),
            ResourceSpec::Subnet {
                cidr_block: subnet_cidr(&net.cidr_block, block)?,
                scope: SubnetScope::Public,
                zone_slot: Some(slot),
                zone: None,
            },
            ["vpc".to_string()],
        ));
        block += 1;
    }

    if !private_subnets.is_empty() {
        let mut deps = vec!["vpc".to_string()];
        deps.extend(private_subnets.iter().cloned());
        nodes.push(ResourceNode::new(
            "private-rt",
            ResourceSpec::RouteTable {
                default_route: false,
            },
            deps,
        ));
    }

    if !public_subnets.is_empty() {
        let mut deps = vec!["vpc".to_string(), "igw".to_string()];
        deps.extend(public_subnets.iter().cloned());
        nodes.push(ResourceNode::new(
            "public-rt",
            ResourceSpec::RouteTable { default_route: true },
            deps,
        ));
    }

    if !private_subnets.is_empty() {
        nodes.push(ResourceNode::new(
            "private-sg",
            ResourceSpec::SecurityGroup {
                group_name: format!("{}-private-sg", config.name_prefix),
                description: "Security group for private instances".to_string(),
                ingress: vec![IngressRule::tcp(22, &net.cidr_block, "SSH from inside the VPC")],
            },
            ["vpc".to_string()],
        ));
    }

    if !public_subnets.is_empty() {
        nodes.push(ResourceNode::new(
            "public-sg",
            ResourceSpec::SecurityGroup {
                group_name: format!("{}-public-sg", config.name_prefix),
                description: "Security group for public instances".to_string(),
                ingress: vec![
                    IngressRule::tcp(22, "0.0.0.0/0", "SSH access"),
                    IngressRule::tcp(80, "0.0.0.0/0", "HTTP access"),
                ],
            },
            ["vpc".to_string()],
        ));
    }

    let compute = &config.compute;
    // (name, subnet) pairs; the target group registers these instances.
    let mut public_instances: Vec<(String, String)> = Vec::new();
    for subnet in &public_subnets {
        for _ in 0..compute.instances_per_public_subnet {
            public_instances.push((
                format!("public-instance-{}", public_instances.len() + 1),
                subnet.clone(),
            ));
        }
    }

    if let Some(lb) = &config.load_balancer {
        nodes.push(ResourceNode::new(
            "alb-sg",
            ResourceSpec::SecurityGroup {
                group_name: format!("{}-alb-sg", config.name_prefix),
                description: "Security group for the load balancer".to_string(),
                ingress: vec![IngressRule::tcp(lb.port, "0.0.0.0/0", "HTTP to the ALB")],
            },
            ["vpc".to_string()],
        ));

        let mut deps: Vec<String> = public_subnets.clone();
        deps.push("alb-sg".to_string());
        nodes.push(ResourceNode::new(
            "alb",
            ResourceSpec::LoadBalancer {
                name: format!("{}-alb", config.name_prefix),
            },
            deps,
        ));

        let mut deps = vec!["vpc".to_string()];
        deps.extend(public_instances.iter().map(|(name, _)| name.clone()));
        nodes.push(ResourceNode::new(
            "tg",
            ResourceSpec::TargetGroup {
                name: format!("{}-tg", config.name_prefix),
                protocol: "HTTP".to_string(),
                port: lb.port,
            },
            deps,
        ));

        nodes.push(ResourceNode::new(
            "http-listener",
            ResourceSpec::Listener {
                protocol: "HTTP".to_string(),
                port: lb.port,
            },
            ["alb".to_string(), "tg".to_string()],
        ));
    }

    for (name, subnet) in &public_instances {
        nodes.push(ResourceNode::new(
            name.clone(),
            ResourceSpec::Instance {
                instance_type: compute.instance_type.clone(),
                image: compute.image.clone(),
                image_id: None,
            },
            [subnet.clone(), "public-sg".to_string()],
        ));
    }

    if compute.private_instance_count > 0 {
        let subnet = private_subnets.first().ok_or_else(|| {
            GraphError::invalid(
                "private-instance-1",
                "private instances requested but no private subnet configured",
            )
        })?;
        for i in 1..=compute.private_instance_count {
            nodes.push(ResourceNode::new(
                format!("private-instance-{i}"),
                ResourceSpec::Instance {
                    instance_type: compute.instance_type.clone(),
                    image: compute.image.clone(),
                    image_id: None,
                },
                [subnet.clone(), "private-sg".to_string()],
            ));
        }
    }

    Ok(nodes)
}

/// Carve the `index`-th /24 block out of the VPC CIDR.
///
/// The prefix must be /16 through /23 so whole /24 blocks fit inside it,
/// and `index` must stay within the blocks the prefix provides; otherwise
/// the derived subnets would lie outside the VPC and fail only at the
/// provider.
fn subnet_cidr(vpc_cidr: &str, index: usize) -> Result<String, GraphError> {
    let parsed = vpc_cidr.split_once('/').and_then(|(addr, prefix)| {
        let octets: Vec<u8> = addr.split('.').filter_map(|o| o.parse().ok()).collect();
        let prefix: u8 = prefix.parse().ok()?;
        (octets.len() == 4).then_some((octets, prefix))
    });
    let Some((octets, prefix)) = parsed else {
        return Err(GraphError::invalid(
            "vpc",
            format!("cannot parse VPC CIDR `{vpc_cidr}`"),
        ));
    };

    if !(16..=23).contains(&prefix) {
        return Err(GraphError::invalid(
            "vpc",
            format!("VPC CIDR `{vpc_cidr}` must be /16 through /23 to carve /24 subnets"),
        ));
    }

    let blocks = 1usize << (24 - prefix);
    if index >= blocks {
        return Err(GraphError::invalid(
            "vpc",
            format!("subnet block {index} does not fit inside `{vpc_cidr}`"),
        ));
    }

    let start = octets[2] as usize & !(blocks - 1);
    Ok(format!(
        "{}.{}.{}.0/24",
        octets[0],
        octets[1],
        start + index
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::graph::DependencyGraph;

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn full_topology_builds_a_valid_graph() {
        let config = SessionConfig::full("test", "us-east-2");
        let graph = DependencyGraph::new(plan(&config).unwrap()).unwrap();

        let order = graph.creation_order().to_vec();
        assert_eq!(order[0], "vpc");

        // The load balancer comes after both its subnets and its group.
        let alb = position(&order, "alb");
        assert!(position(&order, "public-subnet-1") < alb);
        assert!(position(&order, "public-subnet-2") < alb);
        assert!(position(&order, "alb-sg") < alb);

        // The listener comes after the balancer and the target group.
        let listener = position(&order, "http-listener");
        assert!(alb < listener);
        assert!(position(&order, "tg") < listener);

        // 1 vpc + igw + 3 subnets + 2 route tables + 3 groups + alb stack
        // (3) + 2 public + 2 private instances.
        assert_eq!(order.len(), 17);
    }

    #[test]
    fn network_only_variant_is_one_node() {
        let config = SessionConfig::network_only("test", "us-east-2");
        let graph = DependencyGraph::new(plan(&config).unwrap()).unwrap();
        assert_eq!(graph.creation_order(), ["vpc"]);
    }

    #[test]
    fn subnet_blocks_are_consecutive() {
        let config = SessionConfig::full("test", "us-east-2");
        let nodes = plan(&config).unwrap();
        let cidr_of = |name: &str| {
            nodes
                .iter()
                .find(|n| n.logical_name == name)
                .map(|n| match &n.spec {
                    ResourceSpec::Subnet { cidr_block, .. } => cidr_block.clone(),
                    _ => panic!("not a subnet"),
                })
                .unwrap()
        };
        assert_eq!(cidr_of("private-subnet-1"), "172.32.0.0/24");
        assert_eq!(cidr_of("public-subnet-1"), "172.32.1.0/24");
        assert_eq!(cidr_of("public-subnet-2"), "172.32.2.0/24");
    }

    #[test]
    fn private_instances_need_a_private_subnet() {
        let mut config = SessionConfig::full("test", "us-east-2");
        config.network.private_subnet_count = 0;
        assert!(plan(&config).is_err());
    }

    #[test]
    fn malformed_vpc_cidr_is_rejected() {
        let mut config = SessionConfig::full("test", "us-east-2");
        config.network.cidr_block = "not-a-cidr".to_string();
        assert!(plan(&config).is_err());
    }

    #[test]
    fn vpc_prefix_without_room_for_24_blocks_is_rejected() {
        let mut config = SessionConfig::full("test", "us-east-2");
        config.network.cidr_block = "10.0.0.0/24".to_string();
        assert!(plan(&config).is_err());
    }

    #[test]
    fn subnets_must_fit_inside_the_vpc_prefix() {
        // A /23 holds two /24 blocks; the full topology needs three subnets.
        let mut config = SessionConfig::full("test", "us-east-2");
        config.network.cidr_block = "10.0.0.0/23".to_string();
        assert!(plan(&config).is_err());
    }

    #[test]
    fn blocks_are_carved_from_the_vpc_own_range() {
        let mut config = SessionConfig::full("test", "us-east-2");
        config.network.cidr_block = "10.0.4.0/22".to_string();
        let nodes = plan(&config).unwrap();
        let first_subnet = nodes
            .iter()
            .find_map(|n| match &n.spec {
                ResourceSpec::Subnet { cidr_block, .. } => Some(cidr_block.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(first_subnet, "10.0.4.0/24");
    }

    #[test]
    fn public_zone_slots_are_distinct() {
        let config = SessionConfig::full("test", "us-east-2");
        let nodes = plan(&config).unwrap();
        let slots: Vec<usize> = nodes
            .iter()
            .filter_map(|n| match &n.spec {
                ResourceSpec::Subnet {
                    zone_slot: Some(s), ..
                } => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(slots, [0, 1]);
    }
}
