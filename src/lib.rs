//! vpclab - dependency-ordered AWS VPC topology provisioning and teardown
//!
//! This crate builds a small virtual network topology (VPC, internet gateway,
//! subnets, route tables, security groups, load balancer, instances) in AWS,
//! waits for an operator signal, then tears the topology down completely.
//! Resources form a dependency DAG; creation walks it in topological order
//! and teardown walks the exact reverse, absorbing transient "still in use"
//! deletion failures with bounded retry.

pub mod aws;
pub mod config;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod orchestrator;
pub mod session;
pub mod topology;
pub mod wait;
