//! AWS implementation of the provider gateway
//!
//! [`AwsGateway`] dispatches each abstract create/delete/wait onto the EC2
//! or ELBv2 client for the resource's kind. All session state lives in the
//! graph; this layer only translates nodes into SDK calls.

mod context;
mod ec2;
mod elb;
mod error;
pub mod tags;

pub use context::AwsContext;
pub use ec2::Ec2Client;
pub use elb::ElbClient;

use crate::config::SessionConfig;
use crate::gateway::{
    DeleteError, DescribeAnswer, DescribeQuery, ProviderGateway, ResolvedDeps,
};
use crate::graph::{ResourceKind, ResourceNode, ResourceSpec};
use anyhow::Result;

pub struct AwsGateway {
    ec2: Ec2Client,
    elb: ElbClient,
    session_id: String,
    name_prefix: String,
}

impl AwsGateway {
    pub fn new(config: &SessionConfig, ctx: &AwsContext) -> Self {
        Self {
            ec2: Ec2Client::from_context(ctx),
            elb: ElbClient::from_context(ctx),
            session_id: config.session_id.clone(),
            name_prefix: config.name_prefix.clone(),
        }
    }

    /// Provider-side `Name` tag for a node.
    fn name_tag(&self, node: &ResourceNode) -> String {
        format!("{}-{}", self.name_prefix, node.logical_name)
    }
}

impl ProviderGateway for AwsGateway {
    async fn create(&self, node: &ResourceNode, deps: &ResolvedDeps) -> Result<String> {
        let name = self.name_tag(node);
        let sid = &self.session_id;

        match &node.spec {
            ResourceSpec::Network { cidr_block } => {
                self.ec2.create_vpc(cidr_block, sid, &name).await
            }
            ResourceSpec::Gateway => {
                let vpc = deps.one(ResourceKind::Network)?;
                self.ec2.create_gateway(vpc, sid, &name).await
            }
            ResourceSpec::Subnet {
                cidr_block, zone, ..
            } => {
                let vpc = deps.one(ResourceKind::Network)?;
                self.ec2
                    .create_subnet(vpc, cidr_block, zone.as_deref(), sid, &name)
                    .await
            }
            ResourceSpec::RouteTable { default_route } => {
                let vpc = deps.one(ResourceKind::Network)?;
                let gateway = if *default_route {
                    Some(deps.one(ResourceKind::Gateway)?)
                } else {
                    None
                };
                let subnets = deps.all(ResourceKind::Subnet);
                self.ec2
                    .create_route_table(vpc, gateway, &subnets, sid, &name)
                    .await
            }
            ResourceSpec::SecurityGroup {
                group_name,
                description,
                ingress,
            } => {
                let vpc = deps.one(ResourceKind::Network)?;
                self.ec2
                    .create_security_group(vpc, group_name, description, ingress, sid, &name)
                    .await
            }
            ResourceSpec::LoadBalancer { name: lb_name } => {
                let subnets = deps.all(ResourceKind::Subnet);
                let groups = deps.all(ResourceKind::SecurityGroup);
                self.elb
                    .create_load_balancer(lb_name, &subnets, &groups, sid, &name)
                    .await
            }
            ResourceSpec::TargetGroup {
                name: tg_name,
                port,
                ..
            } => {
                let vpc = deps.one(ResourceKind::Network)?;
                let instances = deps.all(ResourceKind::Instance);
                self.elb
                    .create_target_group(tg_name, vpc, *port, &instances, sid, &name)
                    .await
            }
            ResourceSpec::Listener { port, .. } => {
                let lb = deps.one(ResourceKind::LoadBalancer)?;
                let tg = deps.one(ResourceKind::TargetGroup)?;
                self.elb.create_listener(lb, tg, *port, sid, &name).await
            }
            ResourceSpec::Instance {
                instance_type,
                image_id,
                ..
            } => {
                let image_id = image_id
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("instance image was never resolved"))?;
                let subnet = deps.one(ResourceKind::Subnet)?;
                let groups = deps.all(ResourceKind::SecurityGroup);
                self.ec2
                    .run_instance(image_id, instance_type, subnet, &groups, sid, &name)
                    .await
            }
        }
    }

    async fn delete(&self, kind: ResourceKind, live_id: &str) -> Result<(), DeleteError> {
        match kind {
            ResourceKind::Network => self.ec2.delete_vpc(live_id).await,
            ResourceKind::Gateway => self.ec2.delete_gateway(live_id).await,
            ResourceKind::Subnet => self.ec2.delete_subnet(live_id).await,
            ResourceKind::RouteTable => self.ec2.delete_route_table(live_id).await,
            ResourceKind::SecurityGroup => self.ec2.delete_security_group(live_id).await,
            ResourceKind::LoadBalancer => self.elb.delete_load_balancer(live_id).await,
            ResourceKind::TargetGroup => self.elb.delete_target_group(live_id).await,
            ResourceKind::Listener => self.elb.delete_listener(live_id).await,
            ResourceKind::Instance => self.ec2.terminate_instance(live_id).await,
        }
    }

    async fn await_ready(&self, kind: ResourceKind, live_id: &str) -> Result<()> {
        match kind {
            ResourceKind::LoadBalancer => self.elb.await_active(live_id).await,
            _ => Ok(()),
        }
    }

    async fn await_deleted(&self, kind: ResourceKind, live_id: &str) -> Result<()> {
        match kind {
            ResourceKind::Instance => self.ec2.await_instance_terminated(live_id).await,
            ResourceKind::LoadBalancer => self.elb.await_load_balancer_deleted(live_id).await,
            _ => Ok(()),
        }
    }

    async fn describe(&self, query: DescribeQuery) -> Result<DescribeAnswer> {
        match query {
            DescribeQuery::AvailabilityZones { count } => {
                Ok(DescribeAnswer::Zones(self.ec2.sample_zones(count).await?))
            }
            DescribeQuery::ImageByFilters {
                name_pattern,
                architecture,
            } => Ok(DescribeAnswer::ImageId(
                self.ec2.find_image(&name_pattern, &architecture).await?,
            )),
        }
    }
}
