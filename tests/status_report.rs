mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cee_orchestrator::config::AppConfig;
use cee_orchestrator::health::{Probe, ProbeResult, ProbeStatus};
use cee_orchestrator::report::{PerformanceReporter, OPERATING_NORMALLY, REVIEW_ALERTS};
use cee_orchestrator::topology::{discover_topology, NodeType};
use cee_orchestrator::{
    AdapterError, ComprehensiveStatusReporter, HealthCheckRunner, HealthState, HealthThresholds, Subsystem,
};

use common::{summary_builder, MockGateway, MockProvider, MockSwitch};

struct Services {
    provider: Arc<MockProvider>,
    gateway: Arc<MockGateway>,
    switch: Arc<MockSwitch>,
    config: AppConfig,
}

impl Services {
    fn new(gateway: MockGateway) -> Self {
        Self {
            provider: Arc::new(MockProvider::new()),
            gateway: Arc::new(gateway),
            switch: Arc::new(MockSwitch::standard()),
            config: AppConfig::default(),
        }
    }

    fn reporter(&self) -> ComprehensiveStatusReporter {
        let (builder, _clock) =
            summary_builder(self.provider.clone(), self.gateway.clone(), self.switch.clone(), &self.config);
        ComprehensiveStatusReporter::new(builder, self.config.health.thresholds.clone())
    }

    fn runner(&self) -> HealthCheckRunner {
        let (builder, _clock) =
            summary_builder(self.provider.clone(), self.gateway.clone(), self.switch.clone(), &self.config);
        HealthCheckRunner::standard(
            self.provider.clone(),
            self.gateway.clone(),
            self.switch.clone(),
            builder,
            &self.config,
        )
    }
}

#[tokio::test]
async fn test_healthy_system_operates_normally() {
    let status = Services::new(MockGateway::healthy()).reporter().get_status().await;

    assert_eq!(status.overall, HealthState::Healthy);
    assert_eq!(status.components.len(), 3);
    assert!(status.alerts.is_empty());
    assert_eq!(status.recommendations, vec![OPERATING_NORMALLY]);
}

#[tokio::test]
async fn test_low_capacity_raises_alert_and_recommendation() {
    let status = Services::new(MockGateway::with_capacity(1000, 120)).reporter().get_status().await;

    assert_eq!(status.overall, HealthState::Warning);
    assert_eq!(status.alerts, vec!["[storage] low free capacity: 12.0%"]);
    assert_eq!(
        status.recommendations,
        vec![REVIEW_ALERTS.to_string(), "Consider adding storage capacity (12.0% free)".to_string()]
    );
    assert_eq!(
        status.component(Subsystem::Storage).unwrap().verdict.state,
        HealthState::Warning
    );
}

#[tokio::test]
async fn test_worst_subsystem_sets_overall_state() {
    let mut services = Services::new(MockGateway::healthy());
    services.switch = Arc::new(MockSwitch::with_bridges(&[("br-tun", &["br-tun"])]));

    let status = services.reporter().get_status().await;

    assert_eq!(status.overall, HealthState::Critical);
    assert_eq!(status.component(Subsystem::Network).unwrap().verdict.state, HealthState::Critical);
    assert_eq!(status.component(Subsystem::Storage).unwrap().verdict.state, HealthState::Healthy);
    assert!(status.alerts.contains(&"[network] missing required bridge: br-int".to_string()));
}

#[tokio::test]
async fn test_status_serializes_for_output() {
    let status = Services::new(MockGateway::healthy()).reporter().get_status().await;
    let json = serde_json::to_value(&status).unwrap();

    assert_eq!(json["overall"], "healthy");
    assert_eq!(json["components"][0]["subsystem"], "storage");
}

#[tokio::test]
async fn test_performance_report_advises_on_small_clusters() {
    let services = Services::new(MockGateway::with_capacity(1000, 150).with_sds(2, 2));
    let (builder, _clock) = summary_builder(
        services.provider.clone(),
        services.gateway.clone(),
        services.switch.clone(),
        &services.config,
    );
    let reporter = PerformanceReporter::new(builder, services.gateway.clone(), Duration::from_secs(5));

    let report = reporter.storage_report().await;

    assert_eq!(report.metrics.unwrap().total_iops, 5000);
    assert!(report.errors.is_empty());
    assert_eq!(report.recommendations.len(), 2);
    assert_eq!(report.recommendations[0], "Consider adding disks: only 15.0% capacity free");
}

#[tokio::test]
async fn test_performance_report_survives_missing_statistics() {
    let services = Services::new(MockGateway::healthy());
    services.gateway.fail_on("system_statistics");
    let (builder, _clock) = summary_builder(
        services.provider.clone(),
        services.gateway.clone(),
        services.switch.clone(),
        &services.config,
    );
    let reporter = PerformanceReporter::new(builder, services.gateway.clone(), Duration::from_secs(5));

    let report = reporter.storage_report().await;

    assert!(report.metrics.is_none());
    assert_eq!(report.errors.len(), 1);
    assert!(report.recommendations.is_empty());
}

#[tokio::test]
async fn test_performance_report_without_node_list_gives_no_node_advice() {
    let services = Services::new(MockGateway::healthy());
    services.gateway.fail_on("sds_nodes");
    let (builder, _clock) = summary_builder(
        services.provider.clone(),
        services.gateway.clone(),
        services.switch.clone(),
        &services.config,
    );
    let reporter = PerformanceReporter::new(builder, services.gateway.clone(), Duration::from_secs(5));

    let report = reporter.storage_report().await;

    assert_eq!(report.summary.sds.total, 0);
    assert!(report.recommendations.is_empty());
}

#[tokio::test]
async fn test_standard_battery_passes_on_a_healthy_system() {
    let report = Services::new(MockGateway::healthy()).runner().run_health_checks().await;

    let names: Vec<_> = report.checks.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["control_plane_api", "storage_gateway_connectivity", "switch_bridges", "network_reachability", "storage_health"]
    );
    assert_eq!((report.passed, report.warnings, report.failed), (5, 0, 0));
}

#[tokio::test]
async fn test_one_failing_backend_fails_one_probe() {
    let services = Services::new(MockGateway::healthy());
    services.gateway.fail_on("request");

    let report = services.runner().run_health_checks().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.passed, 4);
    let gateway = report.check("storage_gateway_connectivity").unwrap();
    assert_eq!(gateway.status, ProbeStatus::Fail);
    assert!(gateway.message.contains("connection refused"));
}

#[tokio::test]
async fn test_parallel_battery_keeps_order_and_results() {
    let mut services = Services::new(MockGateway::with_capacity(1000, 80));
    services.config.health.parallel_probes = true;

    let report = services.runner().run_health_checks().await;

    assert_eq!(report.checks[4].name, "storage_health");
    assert_eq!(report.checks[4].status, ProbeStatus::Fail);
    assert!(report.checks[4].message.contains("critically low free capacity: 8.0%"));
    assert_eq!(report.failed, 1);
}

struct Exploding;

#[async_trait]
impl Probe for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    async fn check(&self) -> Result<ProbeResult, AdapterError> {
        panic!("probe blew up");
    }
}

struct Stuck;

#[async_trait]
impl Probe for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn check(&self) -> Result<ProbeResult, AdapterError> {
        std::future::pending::<()>().await;
        Ok(ProbeResult::pass("unreachable"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_broken_probes_do_not_stop_the_battery() {
    let services = Services::new(MockGateway::healthy());
    let runner = services
        .runner()
        .with_probe(Arc::new(Exploding))
        .with_probe(Arc::new(Stuck));

    let report = runner.run_health_checks().await;

    assert_eq!(report.checks.len(), 7);
    assert_eq!(report.passed, 5);
    assert_eq!(report.failed, 2);
    assert_eq!(report.check("exploding").unwrap().status, ProbeStatus::Fail);
    assert!(report.check("stuck").unwrap().message.contains("timed out"));
}

#[tokio::test]
async fn test_topology_of_a_network_node() {
    let switch = MockSwitch::standard();
    let topology = discover_topology(&switch).await;

    assert!(topology.errors.is_empty());
    assert_eq!(topology.node_type, NodeType::NetworkNode);
    assert_eq!(topology.bridges.len(), 3);
    assert_eq!(topology.tunnels.len(), 1);
    assert_eq!(topology.tunnels[0].remote_ip.as_deref(), Some("10.0.0.2"));
    assert_eq!(topology.tunnels[0].key.as_deref(), Some("100"));
}

#[test]
fn test_default_thresholds_are_valid() {
    assert!(HealthThresholds::default().validate().is_ok());
}
