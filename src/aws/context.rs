//! Shared AWS configuration context
//!
//! Loads AWS SDK configuration once and hands out service clients built
//! from the same config.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use std::sync::Arc;

#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
}

impl AwsContext {
    /// Load credentials and settings from the environment, config files,
    /// and IAM roles for the given region.
    pub async fn new(region: &str) -> Self {
        Self::with_profile(region, None).await
    }

    /// Like [`AwsContext::new`] but pinning a named credentials profile.
    pub async fn with_profile(region: &str, profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        Self {
            config: Arc::new(config),
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(&self.config)
    }

    pub fn elb_client(&self) -> aws_sdk_elasticloadbalancingv2::Client {
        aws_sdk_elasticloadbalancingv2::Client::new(&self.config)
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
