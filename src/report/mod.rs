//! Whole-system status: every subsystem summary, classified and merged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::health::{classify, HealthState, HealthThresholds, HealthVerdict};
use crate::summary::{Subsystem, Summary, SummaryBuilder};

pub mod performance;

pub use performance::{PerformanceReporter, StoragePerformanceReport};

pub const OPERATING_NORMALLY: &str = "System is operating normally";
pub const REVIEW_ALERTS: &str = "Review alerts and consider maintenance actions";

/// One classified subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub subsystem: Subsystem,
    pub verdict: HealthVerdict,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub timestamp: DateTime<Utc>,
    pub overall: HealthState,
    pub components: Vec<ComponentStatus>,
    /// Issues, then warnings, of every subsystem, prefixed with its name.
    pub alerts: Vec<String>,
    pub recommendations: Vec<String>,
}

impl SystemStatus {
    pub fn component(&self, subsystem: Subsystem) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.subsystem == subsystem)
    }
}

pub struct ComprehensiveStatusReporter {
    summaries: Arc<SummaryBuilder>,
    thresholds: HealthThresholds,
}

impl ComprehensiveStatusReporter {
    pub fn new(summaries: Arc<SummaryBuilder>, thresholds: HealthThresholds) -> Self {
        Self { summaries, thresholds }
    }

    /// Read-only; as fresh as the summary cache allows.
    pub async fn get_status(&self) -> SystemStatus {
        let mut components = Vec::with_capacity(Subsystem::ALL.len());
        for subsystem in Subsystem::ALL {
            let summary = self.summaries.get_summary(subsystem).await;
            let verdict = classify(&summary, &self.thresholds);
            components.push(ComponentStatus { subsystem, verdict, summary });
        }

        let status = compose_status(components, &self.thresholds);
        info!(overall = %status.overall, alerts = status.alerts.len(), "Collected system status");
        status
    }
}

/// Merge classified components into one status.
pub fn compose_status(components: Vec<ComponentStatus>, thresholds: &HealthThresholds) -> SystemStatus {
    let overall = HealthState::worst_of(components.iter().map(|c| c.verdict.state));

    let mut alerts = Vec::new();
    for component in &components {
        let verdict = &component.verdict;
        for finding in verdict.issues.iter().chain(verdict.warnings.iter()) {
            alerts.push(format!("[{}] {}", component.subsystem, finding));
        }
    }

    let mut recommendations = vec![if alerts.is_empty() {
        OPERATING_NORMALLY.to_string()
    } else {
        REVIEW_ALERTS.to_string()
    }];

    let storage_free = components
        .iter()
        .filter_map(|c| c.summary.as_storage())
        .find_map(|s| s.capacity.free_percentage());
    if let Some(free) = storage_free {
        if free < thresholds.capacity_recommendation_percent {
            recommendations.push(format!("Consider adding storage capacity ({:.1}% free)", free));
        }
    }

    SystemStatus {
        timestamp: Utc::now(),
        overall,
        components,
        alerts,
        recommendations,
    }
}
