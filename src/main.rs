//! vpclab: build an AWS VPC topology, pause, tear it down
//!
//! Provisions the configured topology in dependency order, waits for the
//! operator to press Enter (or proceeds immediately with `--yes`), then
//! deletes everything in reverse order and reports the result per resource.

use anyhow::{Context, Result};
use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use vpclab::aws::{AwsContext, AwsGateway};
use vpclab::config::{LoadBalancerConfig, SessionConfig};
use vpclab::orchestrator::TeardownReport;
use vpclab::session::{self, AutoConfirm, StdinConfirm};

#[derive(Parser, Debug)]
#[command(name = "vpclab")]
#[command(about = "Dependency-ordered provisioning and teardown of an AWS VPC topology")]
#[command(version)]
struct Args {
    /// AWS region
    #[arg(long, default_value = "us-east-2")]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long)]
    aws_profile: Option<String>,

    /// Session id stamped into resource tags (default: generated)
    #[arg(long)]
    session_id: Option<String>,

    /// VPC CIDR block; subnets carve consecutive /24s out of it
    #[arg(long, default_value = "172.32.0.0/16")]
    vpc_cidr: String,

    /// Number of public subnets (each in a distinct availability zone)
    #[arg(long, default_value_t = 2)]
    public_subnets: usize,

    /// Number of private subnets
    #[arg(long, default_value_t = 1)]
    private_subnets: usize,

    /// Instances launched into each public subnet
    #[arg(long, default_value_t = 1)]
    public_instances_per_subnet: usize,

    /// Instances launched into the first private subnet
    #[arg(long, default_value_t = 2)]
    private_instances: usize,

    /// EC2 instance type
    #[arg(long, default_value = "t2.micro")]
    instance_type: String,

    /// Skip the load balancer, target group, and listener
    #[arg(long)]
    no_load_balancer: bool,

    /// Listener and target group port
    #[arg(long, default_value_t = 80)]
    lb_port: u16,

    /// Provision only the VPC (smallest variant; implies no instances)
    #[arg(long)]
    network_only: bool,

    /// Maximum delete attempts while a resource is still in use
    #[arg(long, default_value_t = 12)]
    retry_attempts: u32,

    /// Seconds to wait before the first delete retry
    #[arg(long, default_value_t = 5)]
    retry_initial_secs: u64,

    /// Seconds added to the delay after each further failed attempt
    #[arg(long, default_value_t = 5)]
    retry_step_secs: u64,

    /// Tear down without pausing for confirmation
    #[arg(long, short = 'y')]
    yes: bool,

    /// Write the teardown report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let session_id = self
            .session_id
            .clone()
            .unwrap_or_else(generate_session_id);

        let mut config = if self.network_only {
            SessionConfig::network_only(session_id, &self.region)
        } else {
            SessionConfig::full(session_id, &self.region)
        };

        config.network.cidr_block = self.vpc_cidr.clone();
        if !self.network_only {
            config.network.public_subnet_count = self.public_subnets;
            config.network.private_subnet_count = self.private_subnets;
            config.compute.instances_per_public_subnet = self.public_instances_per_subnet;
            config.compute.private_instance_count = self.private_instances;
            config.compute.instance_type = self.instance_type.clone();
            config.load_balancer = if self.no_load_balancer {
                None
            } else {
                Some(LoadBalancerConfig { port: self.lb_port })
            };
        }
        config.retry.max_attempts = self.retry_attempts;
        config.retry.initial_delay = Duration::from_secs(self.retry_initial_secs);
        config.retry.delay_step = Duration::from_secs(self.retry_step_secs);
        config
    }
}

/// Timestamp plus a short random suffix, unique enough for tag discovery.
fn generate_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!(
        "{}-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        suffix.to_lowercase()
    )
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print the error and its cause chain to stderr.
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31merror:\x1b[0m {e}");
    for cause in e.chain().skip(1) {
        let _ = writeln!(stderr, "  \x1b[33mcaused by:\x1b[0m {cause}");
    }

    let backtrace = e.backtrace();
    if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
        let _ = writeln!(stderr, "\n{backtrace}");
    } else {
        let _ = writeln!(stderr, "\x1b[2m(set RUST_BACKTRACE=1 for a backtrace)\x1b[0m");
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = args.session_config();
    info!(
        session = %config.session_id,
        region = %config.region,
        "starting session"
    );

    let ctx = AwsContext::with_profile(&config.region, args.aws_profile.as_deref()).await;
    let gateway = AwsGateway::new(&config, &ctx);

    let report = if args.yes {
        session::run(&config, &gateway, &AutoConfirm).await?
    } else {
        session::run(&config, &gateway, &StdinConfirm).await?
    };

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "teardown report written");
    }

    summarize(&report);

    if !report.is_clean() {
        anyhow::bail!(
            "{} resource(s) could not be deleted; reclaim them manually",
            report.failed().count()
        );
    }
    Ok(())
}

fn summarize(report: &TeardownReport) {
    info!(
        deleted = report.deleted_count(),
        total = report.outcomes.len(),
        "teardown finished"
    );
    for failure in report.failed() {
        tracing::warn!(
            node = %failure.logical_name,
            kind = %failure.kind,
            "not deleted"
        );
    }
}
