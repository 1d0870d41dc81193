// Threshold-based health classification
use serde::{Serialize, Deserialize};
use tracing::{debug, error};

use crate::error::ClassificationError;
use crate::summary::{
    ControlPlaneSummary, DataCategory, NetworkSummary, NodeCounts, StorageSummary, Summary,
};

pub mod checks;

pub use checks::{
    HealthCheckReport, HealthCheckRunner, NamedProbeResult, Probe, ProbeResult, ProbeStatus,
};

/// Health state of one subsystem or of the whole system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Warning,
    Critical,
    /// The classifier could not evaluate its input.
    Error,
}

impl HealthState {
    /// Ordering used for worst-of aggregation.
    pub fn severity(&self) -> u8 {
        match self {
            HealthState::Healthy => 0,
            HealthState::Warning => 1,
            HealthState::Critical => 2,
            HealthState::Error => 3,
        }
    }

    pub fn worst(self, other: HealthState) -> HealthState {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn worst_of(states: impl IntoIterator<Item = HealthState>) -> HealthState {
        states.into_iter().fold(HealthState::Healthy, HealthState::worst)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "healthy"),
            HealthState::Warning => write!(f, "warning"),
            HealthState::Critical => write!(f, "critical"),
            HealthState::Error => write!(f, "error"),
        }
    }
}

/// Verdict with the findings that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub state: HealthState,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl HealthVerdict {
    /// Any issue is critical, otherwise any warning is a warning.
    pub fn from_findings(issues: Vec<String>, warnings: Vec<String>) -> Self {
        let state = if !issues.is_empty() {
            HealthState::Critical
        } else if !warnings.is_empty() {
            HealthState::Warning
        } else {
            HealthState::Healthy
        };
        Self { state, issues, warnings }
    }

    pub fn evaluation_failed(err: &ClassificationError) -> Self {
        Self {
            state: HealthState::Error,
            issues: vec![format!("health evaluation failed: {}", err)],
            warnings: Vec::new(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }
}

/// Classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Free capacity below this percentage is an issue.
    pub critical_free_percent: f64,
    /// Free capacity below this percentage is a warning.
    pub warning_free_percent: f64,
    pub switch_cpu_warning_percent: f64,
    /// Below this the status report recommends adding capacity.
    pub capacity_recommendation_percent: f64,
    pub required_bridges: Vec<String>,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            critical_free_percent: 10.0,
            warning_free_percent: 20.0,
            switch_cpu_warning_percent: 80.0,
            capacity_recommendation_percent: 15.0,
            required_bridges: vec!["br-int".to_string()],
        }
    }
}

impl HealthThresholds {
    pub fn validate(&self) -> Result<(), ClassificationError> {
        let percentages = [
            ("critical_free_percent", self.critical_free_percent),
            ("warning_free_percent", self.warning_free_percent),
            ("switch_cpu_warning_percent", self.switch_cpu_warning_percent),
            ("capacity_recommendation_percent", self.capacity_recommendation_percent),
        ];
        for (name, value) in percentages {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ClassificationError::InvalidThresholds(format!(
                    "{} must be within 0..=100, got {}",
                    name, value
                )));
            }
        }

        if self.critical_free_percent > self.warning_free_percent {
            return Err(ClassificationError::InvalidThresholds(format!(
                "critical_free_percent ({}) exceeds warning_free_percent ({})",
                self.critical_free_percent, self.warning_free_percent
            )));
        }

        Ok(())
    }
}

#[derive(Default)]
struct Findings {
    issues: Vec<String>,
    warnings: Vec<String>,
}

impl Findings {
    fn missing(&mut self, missing: &[DataCategory]) {
        for category in missing {
            self.warnings.push(format!("{} data unavailable", category));
        }
    }

    /// Zero instances is an issue, a partial outage only a warning.
    fn role(&mut self, role: &str, counts: NodeCounts, required: bool) -> Result<(), ClassificationError> {
        if counts.online > counts.total {
            return Err(ClassificationError::InconsistentCounts {
                role: role.to_string(),
                online: counts.online,
                total: counts.total,
            });
        }

        if counts.total == 0 {
            if required {
                self.issues.push(format!("no {} available", role));
            }
        } else if counts.online < counts.total {
            self.warnings.push(format!("not all {} online: {}/{}", role, counts.online, counts.total));
        }
        Ok(())
    }

    fn into_verdict(self) -> HealthVerdict {
        HealthVerdict::from_findings(self.issues, self.warnings)
    }
}

fn classify_storage(summary: &StorageSummary, thresholds: &HealthThresholds) -> Result<HealthVerdict, ClassificationError> {
    let mut findings = Findings::default();

    if !summary.missing.contains(&DataCategory::SdcNodes) {
        findings.role("SDC nodes", summary.sdc, true)?;
    }
    if !summary.missing.contains(&DataCategory::SdsNodes) {
        findings.role("SDS nodes", summary.sds, true)?;
    }

    if !summary.missing.contains(&DataCategory::StoragePools) {
        if let Some(free) = summary.capacity.free_percentage() {
            if free < thresholds.critical_free_percent {
                findings.issues.push(format!("critically low free capacity: {:.1}%", free));
            } else if free < thresholds.warning_free_percent {
                findings.warnings.push(format!("low free capacity: {:.1}%", free));
            }
        }
    }

    findings.missing(&summary.missing);
    Ok(findings.into_verdict())
}

fn classify_network(summary: &NetworkSummary, thresholds: &HealthThresholds) -> Result<HealthVerdict, ClassificationError> {
    let mut findings = Findings::default();

    if !summary.missing.contains(&DataCategory::Bridges) {
        for bridge in &thresholds.required_bridges {
            if !summary.has_bridge(bridge) {
                findings.issues.push(format!("missing required bridge: {}", bridge));
            }
        }
    }

    if let Some(sample) = summary.daemon {
        if !sample.cpu_percent.is_finite() || sample.cpu_percent < 0.0 {
            return Err(ClassificationError::InvalidMetric {
                name: "switch daemon cpu_percent".to_string(),
                value: sample.cpu_percent,
            });
        }
        if sample.cpu_percent > thresholds.switch_cpu_warning_percent {
            findings.warnings.push(format!("high switch daemon CPU usage: {:.1}%", sample.cpu_percent));
        }
    }

    findings.missing(&summary.missing);
    Ok(findings.into_verdict())
}

fn classify_control_plane(summary: &ControlPlaneSummary) -> Result<HealthVerdict, ClassificationError> {
    let mut findings = Findings::default();

    if !summary.missing.contains(&DataCategory::ComputeServices) {
        findings.role("compute services", summary.compute_services, true)?;
    }
    if !summary.missing.contains(&DataCategory::NetworkAgents) {
        findings.role("network agents", summary.network_agents, true)?;
        findings.role("switch agents", summary.switch_agents, false)?;
    }

    findings.missing(&summary.missing);
    Ok(findings.into_verdict())
}

/// Classify a summary, reporting evaluation failures as `Err`.
pub fn try_classify(summary: &Summary, thresholds: &HealthThresholds) -> Result<HealthVerdict, ClassificationError> {
    thresholds.validate()?;
    match summary {
        Summary::Storage(s) => classify_storage(s, thresholds),
        Summary::Network(s) => classify_network(s, thresholds),
        Summary::ControlPlane(s) => classify_control_plane(s),
    }
}

/// Classify a summary. Depends only on its arguments.
pub fn classify(summary: &Summary, thresholds: &HealthThresholds) -> HealthVerdict {
    match try_classify(summary, thresholds) {
        Ok(verdict) => {
            debug!(subsystem = %summary.subsystem(), state = %verdict.state, "Classified summary");
            verdict
        }
        Err(e) => {
            error!(subsystem = %summary.subsystem(), error = %e, "Health classification failed");
            HealthVerdict::evaluation_failed(&e)
        }
    }
}
