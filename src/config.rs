//! Session configuration
//!
//! Enumerates which resources a session includes and their static
//! attributes. The topology module translates this into the descriptor
//! list; dynamic attributes (zones, image id) are resolved by the
//! orchestrator just before the build walk.

use crate::graph::ImageSelector;
use std::time::Duration;

/// Network layout parameters.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// VPC CIDR; subnets carve consecutive /24 blocks out of it.
    pub cidr_block: String,
    pub public_subnet_count: usize,
    pub private_subnet_count: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr_block: "172.32.0.0/16".to_string(),
            public_subnet_count: 2,
            private_subnet_count: 1,
        }
    }
}

/// Compute instance parameters.
#[derive(Debug, Clone)]
pub struct ComputeConfig {
    /// Instances launched into each public subnet.
    pub instances_per_public_subnet: usize,
    /// Instances launched into the first private subnet.
    pub private_instance_count: usize,
    pub instance_type: String,
    pub image: ImageSelector,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            instances_per_public_subnet: 1,
            private_instance_count: 2,
            instance_type: "t2.micro".to_string(),
            image: ImageSelector {
                name_pattern: "al2023-ami-*-x86_64".to_string(),
                architecture: "x86_64".to_string(),
            },
        }
    }
}

/// Application load balancer parameters.
#[derive(Debug, Clone)]
pub struct LoadBalancerConfig {
    /// Listener and target group port.
    pub port: u16,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self { port: 80 }
    }
}

/// Bounds for the teardown retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    /// Added to the delay after each failed attempt (linear backoff).
    pub delay_step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            initial_delay: Duration::from_secs(5),
            delay_step: Duration::from_secs(5),
        }
    }
}

/// Everything one session needs to know.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique id stamped into resource tags for discovery and cleanup.
    pub session_id: String,
    /// Prefix for provider-side `Name` tags (e.g. `vpclab-vpc`).
    pub name_prefix: String,
    pub region: String,
    pub network: NetworkConfig,
    pub compute: ComputeConfig,
    /// `None` omits the load balancer, target group, and listener.
    pub load_balancer: Option<LoadBalancerConfig>,
    pub retry: RetryConfig,
}

impl SessionConfig {
    /// The full reference topology: VPC, gateway, 1 private + 2 public
    /// subnets, route tables, three security groups, ALB stack, and
    /// instances.
    pub fn full(session_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            name_prefix: "vpclab".to_string(),
            region: region.into(),
            network: NetworkConfig::default(),
            compute: ComputeConfig::default(),
            load_balancer: Some(LoadBalancerConfig::default()),
            retry: RetryConfig::default(),
        }
    }

    /// A single standalone network, the smallest corpus variant.
    pub fn network_only(session_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            network: NetworkConfig {
                public_subnet_count: 0,
                private_subnet_count: 0,
                ..NetworkConfig::default()
            },
            compute: ComputeConfig {
                instances_per_public_subnet: 0,
                private_instance_count: 0,
                ..ComputeConfig::default()
            },
            load_balancer: None,
            ..Self::full(session_id, region)
        }
    }
}
