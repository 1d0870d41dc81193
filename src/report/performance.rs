// Storage performance report
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::warn;

use crate::adapters::{call_with_timeout, ObjectStorageGateway, SystemStatistics};
use crate::summary::{DataCategory, StorageSummary, SummaryBuilder};

/// Free capacity below this percentage triggers the add-disks advice.
pub const ADD_DISKS_FREE_PERCENT: f64 = 20.0;
/// Fewest SDS nodes that survive the loss of one.
pub const MIN_SDS_NODES: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub summary: StorageSummary,
    /// Absent when the gateway could not provide statistics.
    pub metrics: Option<SystemStatistics>,
    pub recommendations: Vec<String>,
    pub errors: Vec<String>,
}

pub struct PerformanceReporter {
    summaries: Arc<SummaryBuilder>,
    gateway: Arc<dyn ObjectStorageGateway>,
    timeout: Duration,
}

impl PerformanceReporter {
    pub fn new(summaries: Arc<SummaryBuilder>, gateway: Arc<dyn ObjectStorageGateway>, timeout: Duration) -> Self {
        Self { summaries, gateway, timeout }
    }

    pub async fn storage_report(&self) -> StoragePerformanceReport {
        let summary = self.summaries.storage_summary().await;

        let mut errors = Vec::new();
        let metrics = match call_with_timeout(self.timeout, self.gateway.system_statistics()).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Storage statistics unavailable");
                errors.push(format!("statistics unavailable: {}", e));
                None
            }
        };

        StoragePerformanceReport {
            generated_at: Utc::now(),
            recommendations: recommendations(&summary),
            summary,
            metrics,
            errors,
        }
    }
}

pub fn recommendations(summary: &StorageSummary) -> Vec<String> {
    let mut advice = Vec::new();
    if let Some(free) = summary.capacity.free_percentage() {
        if free < ADD_DISKS_FREE_PERCENT {
            advice.push(format!("Consider adding disks: only {:.1}% capacity free", free));
        }
    }
    // an unreadable node list says nothing about the cluster size
    if !summary.missing.contains(&DataCategory::SdsNodes) && summary.sds.total < MIN_SDS_NODES {
        advice.push(format!(
            "At least {} SDS nodes are recommended for fault tolerance (found {})",
            MIN_SDS_NODES, summary.sds.total
        ));
    }
    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::{CapacitySummary, NodeCounts, VolumeStats};

    fn summary(total_gb: u64, free_gb: u64, sds: u32) -> StorageSummary {
        StorageSummary {
            collected_at: Utc::now(),
            protection_domains: 1,
            pools: Vec::new(),
            capacity: CapacitySummary::from_totals(total_gb, free_gb),
            volumes: VolumeStats::default(),
            sdc: NodeCounts::new(2, 2),
            sds: NodeCounts::new(sds, sds),
            missing: Vec::new(),
        }
    }

    #[test]
    fn healthy_cluster_needs_nothing() {
        assert!(recommendations(&summary(1000, 500, 3)).is_empty());
    }

    #[test]
    fn small_and_full_cluster_gets_both_hints() {
        let advice = recommendations(&summary(1000, 150, 2));
        assert_eq!(advice.len(), 2);
        assert!(advice[0].contains("15.0%"));
        assert!(advice[1].contains("found 2"));
    }

    #[test]
    fn unknown_node_count_gives_no_fault_tolerance_hint() {
        let mut unread = summary(1000, 500, 0);
        unread.missing.push(DataCategory::SdsNodes);
        assert!(recommendations(&unread).is_empty());
    }
}
