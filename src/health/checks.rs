// Probe battery against each subsystem
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapters::{call_with_timeout, ComputeNetworkStorageProvider, ObjectStorageGateway, SwitchController};
use crate::config::AppConfig;
use crate::error::AdapterError;
use crate::health::{classify, HealthState, HealthThresholds};
use crate::summary::{Subsystem, SummaryBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub message: String,
}

impl ProbeResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self { status: ProbeStatus::Pass, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { status: ProbeStatus::Warning, message: message.into() }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { status: ProbeStatus::Fail, message: message.into() }
    }
}

/// Result of one probe in a battery run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedProbeResult {
    pub name: String,
    pub status: ProbeStatus,
    pub message: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckReport {
    pub timestamp: DateTime<Utc>,
    /// In battery order.
    pub checks: Vec<NamedProbeResult>,
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
}

impl HealthCheckReport {
    fn tally(checks: Vec<NamedProbeResult>) -> Self {
        let count = |status| checks.iter().filter(|c| c.status == status).count();
        Self {
            timestamp: Utc::now(),
            passed: count(ProbeStatus::Pass),
            warnings: count(ProbeStatus::Warning),
            failed: count(ProbeStatus::Fail),
            checks,
        }
    }

    pub fn check(&self, name: &str) -> Option<&NamedProbeResult> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// One independent health check.
#[async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    /// An `Err` is reported as a failed check.
    async fn check(&self) -> Result<ProbeResult, AdapterError>;
}

pub struct ControlPlaneApiProbe {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
}

impl ControlPlaneApiProbe {
    pub fn new(provider: Arc<dyn ComputeNetworkStorageProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Probe for ControlPlaneApiProbe {
    fn name(&self) -> &str {
        "control_plane_api"
    }

    async fn check(&self) -> Result<ProbeResult, AdapterError> {
        let projects = self.provider.list_projects().await?;
        Ok(ProbeResult::pass(format!(
            "control plane API accessible, {} projects found",
            projects.len()
        )))
    }
}

pub struct StorageGatewayProbe {
    gateway: Arc<dyn ObjectStorageGateway>,
}

impl StorageGatewayProbe {
    pub fn new(gateway: Arc<dyn ObjectStorageGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Probe for StorageGatewayProbe {
    fn name(&self) -> &str {
        "storage_gateway_connectivity"
    }

    async fn check(&self) -> Result<ProbeResult, AdapterError> {
        self.gateway.system_info().await?;
        Ok(ProbeResult::pass("storage gateway accessible"))
    }
}

pub struct SwitchBridgesProbe {
    switch: Arc<dyn SwitchController>,
    required: Vec<String>,
}

impl SwitchBridgesProbe {
    pub fn new(switch: Arc<dyn SwitchController>, required: Vec<String>) -> Self {
        Self { switch, required }
    }
}

#[async_trait]
impl Probe for SwitchBridgesProbe {
    fn name(&self) -> &str {
        "switch_bridges"
    }

    async fn check(&self) -> Result<ProbeResult, AdapterError> {
        let bridges = self.switch.list_bridges().await?;
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|r| !bridges.contains(r))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(ProbeResult::pass(format!("bridges operational: {}", bridges.join(", "))))
        } else {
            Ok(ProbeResult::warning(format!("missing bridges: {}", missing.join(", "))))
        }
    }
}

/// TCP connect to each configured `host:port`.
pub struct NetworkReachabilityProbe {
    targets: Vec<String>,
    connect_timeout: Duration,
}

impl NetworkReachabilityProbe {
    pub fn new(targets: Vec<String>, connect_timeout: Duration) -> Self {
        Self { targets, connect_timeout }
    }
}

#[async_trait]
impl Probe for NetworkReachabilityProbe {
    fn name(&self) -> &str {
        "network_reachability"
    }

    async fn check(&self) -> Result<ProbeResult, AdapterError> {
        if self.targets.is_empty() {
            return Ok(ProbeResult::pass("no reachability targets configured"));
        }

        let mut unreachable = Vec::new();
        for target in &self.targets {
            let attempt = call_with_timeout(self.connect_timeout, async {
                TcpStream::connect(target.as_str()).await.map_err(AdapterError::from)
            })
            .await;
            if let Err(e) = attempt {
                warn!("Target {} unreachable: {}", target, e);
                unreachable.push(target.as_str());
            }
        }

        let reachable = self.targets.len() - unreachable.len();
        Ok(if unreachable.is_empty() {
            ProbeResult::pass(format!("{}/{} targets reachable", reachable, self.targets.len()))
        } else if reachable > 0 {
            ProbeResult::warning(format!("unreachable targets: {}", unreachable.join(", ")))
        } else {
            ProbeResult::fail(format!("no targets reachable: {}", unreachable.join(", ")))
        })
    }
}

/// Classifies the cached storage summary.
pub struct StorageHealthProbe {
    summaries: Arc<SummaryBuilder>,
    thresholds: HealthThresholds,
}

impl StorageHealthProbe {
    pub fn new(summaries: Arc<SummaryBuilder>, thresholds: HealthThresholds) -> Self {
        Self { summaries, thresholds }
    }
}

#[async_trait]
impl Probe for StorageHealthProbe {
    fn name(&self) -> &str {
        "storage_health"
    }

    async fn check(&self) -> Result<ProbeResult, AdapterError> {
        let summary = self.summaries.get_summary(Subsystem::Storage).await;
        let verdict = classify(&summary, &self.thresholds);

        Ok(match verdict.state {
            HealthState::Healthy => ProbeResult::pass("storage subsystem healthy"),
            HealthState::Warning => ProbeResult::warning(format!("storage warnings: {}", verdict.warnings.join("; "))),
            HealthState::Critical | HealthState::Error => {
                ProbeResult::fail(format!("storage issues: {}", verdict.issues.join("; ")))
            }
        })
    }
}

/// Runs a fixed, ordered battery of probes.
///
/// Each probe runs in its own task under a deadline, so an error, a timeout or
/// a panic becomes a `fail` entry and the remaining probes still run.
pub struct HealthCheckRunner {
    probes: Vec<Arc<dyn Probe>>,
    probe_timeout: Duration,
    parallel: bool,
}

impl HealthCheckRunner {
    pub fn new(probe_timeout: Duration, parallel: bool) -> Self {
        Self {
            probes: Vec::new(),
            probe_timeout,
            parallel,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// The standard five-probe battery.
    pub fn standard(
        provider: Arc<dyn ComputeNetworkStorageProvider>,
        gateway: Arc<dyn ObjectStorageGateway>,
        switch: Arc<dyn SwitchController>,
        summaries: Arc<SummaryBuilder>,
        config: &AppConfig,
    ) -> Self {
        let health = &config.health;
        Self::new(health.probe_timeout(), health.parallel_probes)
            .with_probe(Arc::new(ControlPlaneApiProbe::new(provider)))
            .with_probe(Arc::new(StorageGatewayProbe::new(gateway)))
            .with_probe(Arc::new(SwitchBridgesProbe::new(switch, health.thresholds.required_bridges.clone())))
            .with_probe(Arc::new(NetworkReachabilityProbe::new(
                health.reachability_targets.clone(),
                health.probe_timeout(),
            )))
            .with_probe(Arc::new(StorageHealthProbe::new(summaries, health.thresholds.clone())))
    }

    pub fn probe_names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    fn spawn_probe(&self, probe: Arc<dyn Probe>) -> JoinHandle<(ProbeResult, Duration)> {
        let limit = self.probe_timeout;
        tokio::spawn(async move {
            let started = Instant::now();
            let result = match call_with_timeout(limit, probe.check()).await {
                Ok(result) => result,
                Err(e) => ProbeResult::fail(format!("check failed: {}", e)),
            };
            (result, started.elapsed())
        })
    }

    async fn settle(name: &str, handle: JoinHandle<(ProbeResult, Duration)>) -> NamedProbeResult {
        let (result, elapsed) = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Probe {} aborted: {}", name, e);
                (ProbeResult::fail(format!("check aborted: {}", e)), Duration::ZERO)
            }
        };

        NamedProbeResult {
            name: name.to_string(),
            status: result.status,
            message: result.message,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// Run every probe and tally the outcomes.
    pub async fn run_health_checks(&self) -> HealthCheckReport {
        let mut checks = Vec::with_capacity(self.probes.len());

        if self.parallel {
            let handles: Vec<_> = self
                .probes
                .iter()
                .map(|probe| (probe.name().to_string(), self.spawn_probe(probe.clone())))
                .collect();
            for (name, handle) in handles {
                checks.push(Self::settle(&name, handle).await);
            }
        } else {
            for probe in &self.probes {
                let handle = self.spawn_probe(probe.clone());
                checks.push(Self::settle(probe.name(), handle).await);
            }
        }

        let report = HealthCheckReport::tally(checks);
        info!(
            passed = report.passed,
            warnings = report.warnings,
            failed = report.failed,
            "Health check battery completed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        name: &'static str,
        outcome: fn() -> Result<ProbeResult, AdapterError>,
    }

    #[async_trait]
    impl Probe for FixedProbe {
        fn name(&self) -> &str {
            self.name
        }

        async fn check(&self) -> Result<ProbeResult, AdapterError> {
            (self.outcome)()
        }
    }

    fn probe(name: &'static str, outcome: fn() -> Result<ProbeResult, AdapterError>) -> Arc<dyn Probe> {
        Arc::new(FixedProbe { name, outcome })
    }

    #[tokio::test]
    async fn errors_become_failed_entries() {
        let runner = HealthCheckRunner::new(Duration::from_secs(5), false)
            .with_probe(probe("ok", || Ok(ProbeResult::pass("fine"))))
            .with_probe(probe("broken", || Err(AdapterError::Transport("connection refused".into()))))
            .with_probe(probe("degraded", || Ok(ProbeResult::warning("meh"))));

        let report = runner.run_health_checks().await;
        assert_eq!((report.passed, report.warnings, report.failed), (1, 1, 1));
        let broken = report.check("broken").unwrap();
        assert_eq!(broken.status, ProbeStatus::Fail);
        assert!(broken.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let runner = HealthCheckRunner::new(Duration::from_secs(5), true)
            .with_probe(probe("boom", || panic!("probe exploded")))
            .with_probe(probe("after", || Ok(ProbeResult::pass("still ran"))));

        let report = runner.run_health_checks().await;
        assert_eq!(runner.probe_names(), vec!["boom", "after"]);
        assert_eq!(report.checks[0].status, ProbeStatus::Fail);
        assert_eq!(report.checks[1].status, ProbeStatus::Pass);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn empty_target_list_passes() {
        let probe = NetworkReachabilityProbe::new(Vec::new(), Duration::from_secs(1));
        assert_eq!(probe.check().await.unwrap().status, ProbeStatus::Pass);
    }

    #[tokio::test]
    async fn unreachable_targets_fail() {
        // no port, so address resolution fails immediately
        let probe = NetworkReachabilityProbe::new(vec!["not-a-socket-address".to_string()], Duration::from_millis(200));
        let result = probe.check().await.unwrap();
        assert_eq!(result.status, ProbeStatus::Fail);
    }
}
