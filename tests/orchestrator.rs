//! End-to-end orchestration tests against a scripted in-memory gateway.
//!
//! Covers the ordering contract (creation is topological, teardown is the
//! exact reverse), fail-fast provisioning with best-effort cleanup, and the
//! bounded retry policy around in-use delete failures.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use vpclab::config::{RetryConfig, SessionConfig};
use vpclab::gateway::{
    DeleteError, DeleteErrorKind, DescribeAnswer, DescribeQuery, ProviderGateway, ResolvedDeps,
};
use vpclab::graph::{DependencyGraph, ResourceKind, ResourceNode};
use vpclab::orchestrator::{build, destroy, Outcome, RetryPolicy};
use vpclab::session::{self, AutoConfirm};
use vpclab::topology;

/// What the stub records about each gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Create(String),
    Delete(String),
    AwaitReady(String),
    AwaitDeleted(String),
}

#[derive(Default)]
struct Script {
    /// Nodes whose create call fails.
    failing_creates: Vec<String>,
    /// Live ids whose readiness wait fails after create handed out the id.
    failing_ready: Vec<String>,
    /// Per-live-id queues of delete failures, consumed front to back;
    /// an exhausted queue means success.
    delete_failures: HashMap<String, Vec<DeleteErrorKind>>,
}

/// In-memory provider: hands out `id-<logical name>` identifiers and
/// replays the scripted failures.
#[derive(Default)]
struct StubGateway {
    script: Script,
    calls: Mutex<Vec<Call>>,
    delete_queues: Mutex<HashMap<String, Vec<DeleteErrorKind>>>,
}

impl StubGateway {
    fn new(script: Script) -> Self {
        let delete_queues = Mutex::new(script.delete_failures.clone());
        Self {
            script,
            calls: Mutex::new(Vec::new()),
            delete_queues,
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn delete_attempts(&self, live_id: &str) -> usize {
        self.deleted().iter().filter(|id| *id == live_id).count()
    }
}

fn live_id_for(name: &str) -> String {
    format!("id-{name}")
}

impl ProviderGateway for StubGateway {
    async fn create(&self, node: &ResourceNode, _deps: &ResolvedDeps) -> Result<String> {
        self.record(Call::Create(node.logical_name.clone()));
        if self.script.failing_creates.contains(&node.logical_name) {
            anyhow::bail!("provider rejected {}", node.logical_name);
        }
        Ok(live_id_for(&node.logical_name))
    }

    async fn delete(&self, _kind: ResourceKind, live_id: &str) -> Result<(), DeleteError> {
        self.record(Call::Delete(live_id.to_string()));
        let mut queues = self.delete_queues.lock().unwrap();
        let Some(queue) = queues.get_mut(live_id) else {
            return Ok(());
        };
        if queue.is_empty() {
            return Ok(());
        }
        match queue.remove(0) {
            DeleteErrorKind::InUse => Err(DeleteError::in_use(format!("{live_id} still in use"))),
            DeleteErrorKind::NotFound => Err(DeleteError::not_found(format!("{live_id} gone"))),
            DeleteErrorKind::Other => Err(DeleteError::other(format!("{live_id} broke"))),
        }
    }

    async fn await_ready(&self, _kind: ResourceKind, live_id: &str) -> Result<()> {
        self.record(Call::AwaitReady(live_id.to_string()));
        if self.script.failing_ready.iter().any(|id| id == live_id) {
            anyhow::bail!("{live_id} never became ready");
        }
        Ok(())
    }

    async fn await_deleted(&self, _kind: ResourceKind, live_id: &str) -> Result<()> {
        self.record(Call::AwaitDeleted(live_id.to_string()));
        Ok(())
    }

    async fn describe(&self, query: DescribeQuery) -> Result<DescribeAnswer> {
        Ok(match query {
            DescribeQuery::AvailabilityZones { count } => DescribeAnswer::Zones(
                (0..count).map(|i| format!("us-east-2{}", (b'a' + i as u8) as char)).collect(),
            ),
            DescribeQuery::ImageByFilters { .. } => {
                DescribeAnswer::ImageId("ami-12345678".to_string())
            }
        })
    }
}

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(10),
        delay_step: Duration::from_millis(10),
    }
}

fn full_config() -> SessionConfig {
    let mut config = SessionConfig::full("test-session", "us-east-2");
    config.retry = fast_retry(3);
    config
}

fn graph_for(config: &SessionConfig) -> DependencyGraph {
    DependencyGraph::new(topology::plan(config).unwrap()).unwrap()
}

#[tokio::test]
async fn network_only_session_creates_and_deletes_one_resource() {
    let config = SessionConfig::network_only("test-session", "us-east-2");
    let gateway = StubGateway::default();

    let report = session::run(&config, &gateway, &AutoConfirm).await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.deleted_count(), 1);
    assert_eq!(gateway.created(), ["vpc"]);
    assert_eq!(gateway.deleted(), [live_id_for("vpc")]);
}

#[tokio::test]
async fn teardown_order_is_exact_reverse_of_creation_order() {
    let config = full_config();
    let gateway = StubGateway::default();

    let report = session::run(&config, &gateway, &AutoConfirm).await.unwrap();
    assert!(report.is_clean());

    let created = gateway.created();
    assert_eq!(created.len(), 17);
    assert_eq!(created[0], "vpc");

    let mut expected: Vec<String> = created.iter().rev().map(|n| live_id_for(n)).collect();
    assert_eq!(gateway.deleted(), expected.as_slice());

    // Every delete of the VPC comes last.
    assert_eq!(expected.pop().as_deref(), Some("id-vpc"));
}

#[tokio::test]
async fn dependencies_are_created_before_their_dependents() {
    let config = full_config();
    let gateway = StubGateway::default();
    session::run(&config, &gateway, &AutoConfirm).await.unwrap();

    let created = gateway.created();
    let position = |name: &str| created.iter().position(|n| n == name).unwrap();

    assert!(position("vpc") < position("igw"));
    assert!(position("igw") < position("public-rt"));
    assert!(position("public-subnet-1") < position("alb"));
    assert!(position("public-subnet-2") < position("alb"));
    assert!(position("alb-sg") < position("alb"));
    assert!(position("alb") < position("http-listener"));
    assert!(position("tg") < position("http-listener"));
}

#[tokio::test]
async fn load_balancer_readiness_is_awaited() {
    let config = full_config();
    let gateway = StubGateway::default();
    session::run(&config, &gateway, &AutoConfirm).await.unwrap();

    let calls = gateway.calls();
    assert!(calls.contains(&Call::AwaitReady(live_id_for("alb"))));
    assert!(calls.contains(&Call::AwaitDeleted(live_id_for("alb"))));
    assert!(calls.contains(&Call::AwaitDeleted(live_id_for("public-instance-1"))));
}

#[tokio::test]
async fn failed_create_halts_the_build_and_cleans_up_the_live_subset() {
    let config = full_config();
    let gateway = StubGateway::new(Script {
        failing_creates: vec!["public-subnet-2".to_string()],
        ..Script::default()
    });

    let result = session::run(&config, &gateway, &AutoConfirm).await;
    assert!(result.is_err());

    let created = gateway.created();
    // The walk stopped at the failed node; nothing after it was attempted.
    assert_eq!(created.last().map(String::as_str), Some("public-subnet-2"));
    assert!(!created.iter().any(|n| n == "alb"));
    assert!(!created.iter().any(|n| n == "public-instance-1"));

    // Everything that went live was deleted, in reverse, VPC last.
    let expected: Vec<String> = created[..created.len() - 1]
        .iter()
        .rev()
        .map(|n| live_id_for(n))
        .collect();
    assert_eq!(gateway.deleted(), expected.as_slice());
}

#[tokio::test]
async fn unready_load_balancer_is_still_deleted_during_cleanup() {
    let config = full_config();
    let gateway = StubGateway::new(Script {
        failing_ready: vec![live_id_for("alb")],
        ..Script::default()
    });

    let result = session::run(&config, &gateway, &AutoConfirm).await;
    assert!(result.is_err());

    // The provider handed out an id before the readiness wait failed, so
    // cleanup must delete the balancer rather than leak it.
    let deleted = gateway.deleted();
    assert!(deleted.contains(&live_id_for("alb")));

    // Everything created before the balancer is reclaimed too, VPC last.
    assert!(deleted.contains(&live_id_for("public-subnet-1")));
    assert_eq!(deleted.last().map(String::as_str), Some("id-vpc"));
}

#[tokio::test(start_paused = true)]
async fn in_use_deletes_are_retried_until_they_succeed() {
    let config = full_config();
    let mut graph = graph_for(&config);
    let sg_id = live_id_for("public-sg");

    let gateway = StubGateway::new(Script {
        delete_failures: HashMap::from([(
            sg_id.clone(),
            vec![DeleteErrorKind::InUse, DeleteErrorKind::InUse],
        )]),
        ..Script::default()
    });

    build(&mut graph, &gateway).await.unwrap();
    let report = destroy(&mut graph, &gateway, &RetryPolicy::from(&config.retry)).await;

    assert!(report.is_clean());
    assert_eq!(gateway.delete_attempts(&sg_id), 3);
}

#[tokio::test(start_paused = true)]
async fn in_use_retry_is_bounded_and_teardown_continues() {
    let config = full_config();
    let mut graph = graph_for(&config);
    let sg_id = live_id_for("public-sg");

    // More failures than the policy allows attempts.
    let gateway = StubGateway::new(Script {
        delete_failures: HashMap::from([(sg_id.clone(), vec![DeleteErrorKind::InUse; 10])]),
        ..Script::default()
    });

    build(&mut graph, &gateway).await.unwrap();
    let report = destroy(&mut graph, &gateway, &RetryPolicy::from(&config.retry)).await;

    assert!(!report.is_clean());
    assert_eq!(gateway.delete_attempts(&sg_id), 3);

    let failed: Vec<&str> = report.failed().map(|o| o.logical_name.as_str()).collect();
    assert_eq!(failed, ["public-sg"]);

    // The walk carried on past the failure down to the VPC.
    assert_eq!(gateway.deleted().last().map(String::as_str), Some("id-vpc"));
}

#[tokio::test]
async fn not_found_deletes_count_as_deleted() {
    let config = SessionConfig::network_only("test-session", "us-east-2");
    let mut graph = graph_for(&config);
    let gateway = StubGateway::new(Script {
        delete_failures: HashMap::from([(
            live_id_for("vpc"),
            vec![DeleteErrorKind::NotFound],
        )]),
        ..Script::default()
    });

    build(&mut graph, &gateway).await.unwrap();
    let report = destroy(&mut graph, &gateway, &RetryPolicy::from(&fast_retry(3))).await;

    assert!(report.is_clean());
    assert_eq!(report.deleted_count(), 1);
    assert_eq!(gateway.delete_attempts(&live_id_for("vpc")), 1);
}

#[tokio::test]
async fn unclassified_delete_failures_are_not_retried() {
    let config = SessionConfig::network_only("test-session", "us-east-2");
    let mut graph = graph_for(&config);
    let gateway = StubGateway::new(Script {
        delete_failures: HashMap::from([(
            live_id_for("vpc"),
            vec![DeleteErrorKind::Other; 5],
        )]),
        ..Script::default()
    });

    build(&mut graph, &gateway).await.unwrap();
    let report = destroy(&mut graph, &gateway, &RetryPolicy::from(&fast_retry(5))).await;

    assert!(!report.is_clean());
    assert_eq!(gateway.delete_attempts(&live_id_for("vpc")), 1);
    assert!(matches!(
        &report.outcomes[0].outcome,
        Outcome::Failed { cause } if cause.contains("broke")
    ));
}

#[tokio::test]
async fn cyclic_configuration_fails_before_any_gateway_call() {
    let a = ResourceNode::new(
        "a",
        vpclab::graph::ResourceSpec::Network {
            cidr_block: "172.32.0.0/16".into(),
        },
        ["b".to_string()],
    );
    let b = ResourceNode::new(
        "b",
        vpclab::graph::ResourceSpec::Network {
            cidr_block: "172.33.0.0/16".into(),
        },
        ["a".to_string()],
    );

    let gateway = StubGateway::default();
    let result = DependencyGraph::new(vec![a, b]);

    assert!(matches!(
        result,
        Err(vpclab::error::GraphError::CyclicDependency(_))
    ));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn destroy_skips_nodes_that_never_went_live() {
    let config = SessionConfig::network_only("test-session", "us-east-2");
    let mut graph = graph_for(&config);
    let gateway = StubGateway::default();

    // No build: nothing has a live id.
    let report = destroy(&mut graph, &gateway, &RetryPolicy::from(&fast_retry(3))).await;

    assert!(report.is_clean());
    assert_eq!(report.deleted_count(), 0);
    assert!(gateway.deleted().is_empty());
    assert!(matches!(report.outcomes[0].outcome, Outcome::Skipped));
}

#[tokio::test]
async fn resolution_fills_zones_and_images_before_any_create() {
    let config = full_config();
    let gateway = StubGateway::default();
    let mut graph = graph_for(&config);

    build(&mut graph, &gateway).await.unwrap();

    for node in graph.nodes() {
        match &node.spec {
            vpclab::graph::ResourceSpec::Subnet {
                zone_slot: Some(slot),
                zone,
                ..
            } => {
                let expected = format!("us-east-2{}", (b'a' + *slot as u8) as char);
                assert_eq!(zone.as_deref(), Some(expected.as_str()));
            }
            vpclab::graph::ResourceSpec::Instance { image_id, .. } => {
                assert_eq!(image_id.as_deref(), Some("ami-12345678"));
            }
            _ => {}
        }
    }
}
