//! EC2 operations: VPC, gateway, subnets, route tables, security groups,
//! and instances
//!
//! Create calls return the provider id; delete calls classify their
//! failures for the teardown retry policy. Composite steps (gateway
//! attachment, default routes, subnet associations, ingress rules) are part
//! of the owning resource's create call.

use crate::aws::context::AwsContext;
use crate::aws::error::{is_not_found, sdk_delete_error};
use crate::aws::tags;
use crate::gateway::DeleteError;
use crate::graph::IngressRule;
use crate::wait::{poll_until, PollConfig};
use anyhow::{Context, Result};
use aws_sdk_ec2::types::{Filter, InstanceStateName, IpPermission, IpRange, ResourceType};
use rand::seq::SliceRandom;
use std::time::Duration;
use tracing::{debug, info};

pub struct Ec2Client {
    client: aws_sdk_ec2::Client,
}

impl Ec2Client {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }

    pub async fn create_vpc(&self, cidr: &str, session_id: &str, name: &str) -> Result<String> {
        let response = self
            .client
            .create_vpc()
            .cidr_block(cidr)
            .tag_specifications(tags::ec2_tag_spec(ResourceType::Vpc, session_id, name))
            .send()
            .await
            .context("Failed to create VPC")?;

        let vpc_id = response
            .vpc()
            .and_then(|v| v.vpc_id())
            .context("No VPC ID in response")?
            .to_string();
        info!(vpc_id = %vpc_id, cidr = %cidr, "VPC created");
        Ok(vpc_id)
    }

    /// Create an internet gateway and attach it to the VPC in one step.
    pub async fn create_gateway(&self, vpc_id: &str, session_id: &str, name: &str) -> Result<String> {
        let response = self
            .client
            .create_internet_gateway()
            .tag_specifications(tags::ec2_tag_spec(
                ResourceType::InternetGateway,
                session_id,
                name,
            ))
            .send()
            .await
            .context("Failed to create internet gateway")?;

        let igw_id = response
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .context("No internet gateway ID in response")?
            .to_string();

        self.client
            .attach_internet_gateway()
            .internet_gateway_id(&igw_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .context("Failed to attach internet gateway")?;

        info!(igw_id = %igw_id, vpc_id = %vpc_id, "Internet gateway created and attached");
        Ok(igw_id)
    }

    pub async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr: &str,
        zone: Option<&str>,
        session_id: &str,
        name: &str,
    ) -> Result<String> {
        let mut request = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr)
            .tag_specifications(tags::ec2_tag_spec(ResourceType::Subnet, session_id, name));
        if let Some(zone) = zone {
            request = request.availability_zone(zone);
        }

        let response = request.send().await.context("Failed to create subnet")?;
        let subnet_id = response
            .subnet()
            .and_then(|s| s.subnet_id())
            .context("No subnet ID in response")?
            .to_string();
        info!(subnet_id = %subnet_id, cidr = %cidr, zone = ?zone, "Subnet created");
        Ok(subnet_id)
    }

    /// Create a route table, optionally issue its default route via the
    /// gateway, and associate it with the given subnets. One logical create.
    pub async fn create_route_table(
        &self,
        vpc_id: &str,
        default_route_gateway: Option<&str>,
        subnet_ids: &[&str],
        session_id: &str,
        name: &str,
    ) -> Result<String> {
        let response = self
            .client
            .create_route_table()
            .vpc_id(vpc_id)
            .tag_specifications(tags::ec2_tag_spec(
                ResourceType::RouteTable,
                session_id,
                name,
            ))
            .send()
            .await
            .context("Failed to create route table")?;

        let rt_id = response
            .route_table()
            .and_then(|r| r.route_table_id())
            .context("No route table ID in response")?
            .to_string();

        if let Some(igw_id) = default_route_gateway {
            self.client
                .create_route()
                .route_table_id(&rt_id)
                .destination_cidr_block("0.0.0.0/0")
                .gateway_id(igw_id)
                .send()
                .await
                .context("Failed to create default route")?;
        }

        for subnet_id in subnet_ids {
            self.client
                .associate_route_table()
                .route_table_id(&rt_id)
                .subnet_id(*subnet_id)
                .send()
                .await
                .with_context(|| format!("Failed to associate subnet {subnet_id}"))?;
        }

        info!(
            rt_id = %rt_id,
            default_route = default_route_gateway.is_some(),
            associations = subnet_ids.len(),
            "Route table created"
        );
        Ok(rt_id)
    }

    pub async fn create_security_group(
        &self,
        vpc_id: &str,
        group_name: &str,
        description: &str,
        ingress: &[IngressRule],
        session_id: &str,
        name: &str,
    ) -> Result<String> {
        let response = self
            .client
            .create_security_group()
            .group_name(group_name)
            .description(description)
            .vpc_id(vpc_id)
            .tag_specifications(tags::ec2_tag_spec(
                ResourceType::SecurityGroup,
                session_id,
                name,
            ))
            .send()
            .await
            .context("Failed to create security group")?;

        let sg_id = response
            .group_id()
            .context("No security group ID in response")?
            .to_string();

        if !ingress.is_empty() {
            let mut request = self
                .client
                .authorize_security_group_ingress()
                .group_id(&sg_id);
            for rule in ingress {
                request = request.ip_permissions(
                    IpPermission::builder()
                        .ip_protocol(&rule.protocol)
                        .from_port(i32::from(rule.port))
                        .to_port(i32::from(rule.port))
                        .ip_ranges(
                            IpRange::builder()
                                .cidr_ip(&rule.cidr)
                                .description(&rule.description)
                                .build(),
                        )
                        .build(),
                );
            }
            request
                .send()
                .await
                .context("Failed to add ingress rules to security group")?;
        }

        info!(sg_id = %sg_id, rules = ingress.len(), "Security group created");
        Ok(sg_id)
    }

    pub async fn run_instance(
        &self,
        image_id: &str,
        instance_type: &str,
        subnet_id: &str,
        security_group_ids: &[&str],
        session_id: &str,
        name: &str,
    ) -> Result<String> {
        let instance_type_enum: aws_sdk_ec2::types::InstanceType = instance_type
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid instance type: {instance_type}"))?;

        let mut request = self
            .client
            .run_instances()
            .image_id(image_id)
            .instance_type(instance_type_enum)
            .min_count(1)
            .max_count(1)
            .subnet_id(subnet_id)
            .tag_specifications(tags::ec2_tag_spec(ResourceType::Instance, session_id, name));
        for sg_id in security_group_ids {
            request = request.security_group_ids(*sg_id);
        }

        let response = request.send().await.context("Failed to launch instance")?;
        let instance_id = response
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .context("No instance ID in response")?
            .to_string();
        info!(instance_id = %instance_id, instance_type = %instance_type, "Instance launched");
        Ok(instance_id)
    }

    /// Randomly select `count` distinct availability zones.
    pub async fn sample_zones(&self, count: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .describe_availability_zones()
            .send()
            .await
            .context("Failed to describe availability zones")?;

        let mut zones: Vec<String> = response
            .availability_zones()
            .iter()
            .filter_map(|z| z.zone_name().map(str::to_string))
            .collect();
        if zones.len() < count {
            anyhow::bail!(
                "region offers {} availability zones, {} requested",
                zones.len(),
                count
            );
        }
        zones.shuffle(&mut rand::thread_rng());
        zones.truncate(count);
        debug!(zones = ?zones, "sampled availability zones");
        Ok(zones)
    }

    /// Find the newest available image matching the name pattern and
    /// architecture.
    pub async fn find_image(&self, name_pattern: &str, architecture: &str) -> Result<String> {
        let response = self
            .client
            .describe_images()
            .owners("amazon")
            .filters(Filter::builder().name("name").values(name_pattern).build())
            .filters(
                Filter::builder()
                    .name("architecture")
                    .values(architecture)
                    .build(),
            )
            .filters(Filter::builder().name("state").values("available").build())
            .send()
            .await
            .context("Failed to describe images")?;

        let mut images: Vec<_> = response.images().iter().collect();
        images.sort_by(|a, b| {
            b.creation_date()
                .unwrap_or_default()
                .cmp(a.creation_date().unwrap_or_default())
        });

        let image_id = images
            .first()
            .and_then(|img| img.image_id())
            .with_context(|| format!("No image matches `{name_pattern}` ({architecture})"))?
            .to_string();
        debug!(image_id = %image_id, pattern = %name_pattern, "image selected");
        Ok(image_id)
    }

    pub async fn delete_vpc(&self, vpc_id: &str) -> Result<(), DeleteError> {
        self.client
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    /// Detach the gateway from whatever VPC it is attached to, then delete
    /// it. The attachment is discovered from the gateway id so that delete
    /// needs nothing beyond the live id.
    pub async fn delete_gateway(&self, igw_id: &str) -> Result<(), DeleteError> {
        let described = self
            .client
            .describe_internet_gateways()
            .internet_gateway_ids(igw_id)
            .send()
            .await;

        let attached_vpc = match described {
            Ok(response) => response
                .internet_gateways()
                .first()
                .and_then(|g| g.attachments().first())
                .and_then(|a| a.vpc_id())
                .map(str::to_string),
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) => return Err(sdk_delete_error(&e)),
        };

        if let Some(vpc_id) = attached_vpc {
            self.client
                .detach_internet_gateway()
                .internet_gateway_id(igw_id)
                .vpc_id(&vpc_id)
                .send()
                .await
                .map_err(|e| sdk_delete_error(&e))?;
        }

        self.client
            .delete_internet_gateway()
            .internet_gateway_id(igw_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    pub async fn delete_subnet(&self, subnet_id: &str) -> Result<(), DeleteError> {
        self.client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    pub async fn delete_route_table(&self, rt_id: &str) -> Result<(), DeleteError> {
        self.client
            .delete_route_table()
            .route_table_id(rt_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    pub async fn delete_security_group(&self, sg_id: &str) -> Result<(), DeleteError> {
        self.client
            .delete_security_group()
            .group_id(sg_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    pub async fn terminate_instance(&self, instance_id: &str) -> Result<(), DeleteError> {
        self.client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    /// Block until the instance reports terminated (or is gone entirely).
    pub async fn await_instance_terminated(&self, instance_id: &str) -> Result<()> {
        poll_until(
            PollConfig::with_timeout(Duration::from_secs(600)),
            &format!("instance {instance_id} terminated"),
            || async {
                let response = self
                    .client
                    .describe_instances()
                    .instance_ids(instance_id)
                    .send()
                    .await;

                match response {
                    Ok(resp) => {
                        let state = resp
                            .reservations()
                            .first()
                            .and_then(|r| r.instances().first())
                            .and_then(|i| i.state())
                            .and_then(|s| s.name());
                        match state {
                            Some(InstanceStateName::Terminated) | None => Ok(true),
                            _ => Ok(false),
                        }
                    }
                    Err(e) if is_not_found(&e) => Ok(true),
                    Err(e) => Err(anyhow::Error::from(e).context("describing instance")),
                }
            },
        )
        .await
    }
}
