//! ELBv2 operations: load balancer, target group, listener
//!
//! The load balancer is the one resource whose create is asynchronous on
//! the provider side; [`ElbClient::await_active`] polls until it reports
//! `active`, and [`ElbClient::await_deleted`] polls after delete until the
//! describe comes back not-found.

use crate::aws::context::AwsContext;
use crate::aws::error::{is_not_found, sdk_delete_error};
use crate::aws::tags;
use crate::gateway::DeleteError;
use crate::wait::{poll_until, PollConfig};
use anyhow::{Context, Result};
use aws_sdk_elasticloadbalancingv2::types::{
    Action, ActionTypeEnum, LoadBalancerSchemeEnum, LoadBalancerStateEnum, LoadBalancerTypeEnum,
    ProtocolEnum, TargetDescription, TargetTypeEnum,
};
use tracing::{debug, info};

pub struct ElbClient {
    client: aws_sdk_elasticloadbalancingv2::Client,
}

impl ElbClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.elb_client(),
        }
    }

    /// Create an internet-facing application load balancer spanning the
    /// given subnets. Returns its ARN; readiness is a separate wait.
    pub async fn create_load_balancer(
        &self,
        lb_name: &str,
        subnet_ids: &[&str],
        security_group_ids: &[&str],
        session_id: &str,
        name: &str,
    ) -> Result<String> {
        let mut request = self
            .client
            .create_load_balancer()
            .name(lb_name)
            .scheme(LoadBalancerSchemeEnum::InternetFacing)
            .r#type(LoadBalancerTypeEnum::Application)
            .set_tags(Some(tags::elb_tags(session_id, name)?));
        for subnet_id in subnet_ids {
            request = request.subnets(*subnet_id);
        }
        for sg_id in security_group_ids {
            request = request.security_groups(*sg_id);
        }

        let response = request
            .send()
            .await
            .context("Failed to create load balancer")?;
        let arn = response
            .load_balancers()
            .first()
            .and_then(|lb| lb.load_balancer_arn())
            .context("No load balancer ARN in response")?
            .to_string();
        info!(arn = %arn, subnets = subnet_ids.len(), "Load balancer created");
        Ok(arn)
    }

    /// Block until the load balancer reports the `active` state.
    pub async fn await_active(&self, arn: &str) -> Result<()> {
        poll_until(PollConfig::default(), "load balancer active", || async {
            let response = self
                .client
                .describe_load_balancers()
                .load_balancer_arns(arn)
                .send()
                .await
                .context("describing load balancer")?;

            let code = response
                .load_balancers()
                .first()
                .and_then(|lb| lb.state())
                .and_then(|s| s.code());
            match code {
                Some(LoadBalancerStateEnum::Active) => Ok(true),
                Some(LoadBalancerStateEnum::Failed) => {
                    anyhow::bail!("load balancer {arn} entered the failed state")
                }
                other => {
                    debug!(state = ?other, "load balancer not active yet");
                    Ok(false)
                }
            }
        })
        .await
    }

    /// Create an instance target group and register the given instances.
    pub async fn create_target_group(
        &self,
        tg_name: &str,
        vpc_id: &str,
        port: u16,
        instance_ids: &[&str],
        session_id: &str,
        name: &str,
    ) -> Result<String> {
        let response = self
            .client
            .create_target_group()
            .name(tg_name)
            .protocol(ProtocolEnum::Http)
            .port(i32::from(port))
            .vpc_id(vpc_id)
            .target_type(TargetTypeEnum::Instance)
            .set_tags(Some(tags::elb_tags(session_id, name)?))
            .send()
            .await
            .context("Failed to create target group")?;

        let arn = response
            .target_groups()
            .first()
            .and_then(|tg| tg.target_group_arn())
            .context("No target group ARN in response")?
            .to_string();

        if !instance_ids.is_empty() {
            let mut request = self.client.register_targets().target_group_arn(&arn);
            for instance_id in instance_ids {
                request = request.targets(
                    TargetDescription::builder()
                        .id(*instance_id)
                        .build()
                        .context("building target description")?,
                );
            }
            request
                .send()
                .await
                .context("Failed to register targets")?;
        }

        info!(arn = %arn, targets = instance_ids.len(), "Target group created");
        Ok(arn)
    }

    /// Create an HTTP listener forwarding to the target group.
    pub async fn create_listener(
        &self,
        lb_arn: &str,
        tg_arn: &str,
        port: u16,
        session_id: &str,
        name: &str,
    ) -> Result<String> {
        let response = self
            .client
            .create_listener()
            .load_balancer_arn(lb_arn)
            .protocol(ProtocolEnum::Http)
            .port(i32::from(port))
            .default_actions(
                Action::builder()
                    .r#type(ActionTypeEnum::Forward)
                    .target_group_arn(tg_arn)
                    .build()
                    .context("building forward action")?,
            )
            .set_tags(Some(tags::elb_tags(session_id, name)?))
            .send()
            .await
            .context("Failed to create listener")?;

        let arn = response
            .listeners()
            .first()
            .and_then(|l| l.listener_arn())
            .context("No listener ARN in response")?
            .to_string();
        info!(arn = %arn, port = port, "Listener created");
        Ok(arn)
    }

    pub async fn delete_load_balancer(&self, arn: &str) -> Result<(), DeleteError> {
        self.client
            .delete_load_balancer()
            .load_balancer_arn(arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    pub async fn delete_target_group(&self, arn: &str) -> Result<(), DeleteError> {
        self.client
            .delete_target_group()
            .target_group_arn(arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    pub async fn delete_listener(&self, arn: &str) -> Result<(), DeleteError> {
        self.client
            .delete_listener()
            .listener_arn(arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| sdk_delete_error(&e))
    }

    /// Block until the deleted load balancer stops appearing in describes.
    /// Subnets and security groups it referenced stay `in use` until then.
    pub async fn await_load_balancer_deleted(&self, arn: &str) -> Result<()> {
        poll_until(PollConfig::default(), "load balancer deleted", || async {
            let response = self
                .client
                .describe_load_balancers()
                .load_balancer_arns(arn)
                .send()
                .await;

            match response {
                Ok(resp) => Ok(resp.load_balancers().is_empty()),
                Err(e) if is_not_found(&e) => Ok(true),
                Err(e) => Err(anyhow::Error::from(e).context("describing load balancer")),
            }
        })
        .await
    }
}
