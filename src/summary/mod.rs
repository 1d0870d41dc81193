//! Normalized per-subsystem summaries and the cached builder that produces them.
//!
//! Each data category is fetched independently. A category whose adapter call
//! fails is logged, zeroed, and listed in the summary's `missing` field so the
//! classifier can raise a warning instead of the whole summary failing.
//!
//! Summaries are cached for the configured TTL. Nothing invalidates them early:
//! a resource created through the orchestrator may not show up here until the
//! current entry expires.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use crate::adapters::{
    call_with_timeout, ComputeNetworkStorageProvider, ComputeService, NetworkAgent,
    ObjectStorageGateway, ProcessSample, ProtectionDomain, StorageNode, StoragePool,
    StorageVolume, SwitchController, BridgeInfo,
};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::AdapterError;
use crate::topology::BridgeRole;

pub mod cache;

pub use cache::TtlCache;

/// The three wrapped subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Storage,
    Network,
    ControlPlane,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [Subsystem::Storage, Subsystem::Network, Subsystem::ControlPlane];
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subsystem::Storage => write!(f, "storage"),
            Subsystem::Network => write!(f, "network"),
            Subsystem::ControlPlane => write!(f, "control_plane"),
        }
    }
}

/// Independently fetched input of a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    ProtectionDomains,
    StoragePools,
    Volumes,
    SdcNodes,
    SdsNodes,
    Bridges,
    BridgePorts,
    ComputeServices,
    NetworkAgents,
    Servers,
    Networks,
}

impl std::fmt::Display for DataCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataCategory::ProtectionDomains => "protection domains",
            DataCategory::StoragePools => "storage pools",
            DataCategory::Volumes => "volumes",
            DataCategory::SdcNodes => "SDC nodes",
            DataCategory::SdsNodes => "SDS nodes",
            DataCategory::Bridges => "bridges",
            DataCategory::BridgePorts => "bridge ports",
            DataCategory::ComputeServices => "compute services",
            DataCategory::NetworkAgents => "network agents",
            DataCategory::Servers => "servers",
            DataCategory::Networks => "networks",
        };
        write!(f, "{}", name)
    }
}

/// Capacity totals in GB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySummary {
    pub total_gb: u64,
    pub free_gb: u64,
    pub used_gb: u64,
}

impl CapacitySummary {
    /// `used` is clamped at zero when a racy read reports more free than total.
    pub fn from_totals(total_gb: u64, free_gb: u64) -> Self {
        Self {
            total_gb,
            free_gb,
            used_gb: total_gb.saturating_sub(free_gb),
        }
    }

    /// `None` when no capacity is configured.
    pub fn free_percentage(&self) -> Option<f64> {
        if self.total_gb == 0 {
            None
        } else {
            Some(self.free_gb as f64 / self.total_gb as f64 * 100.0)
        }
    }
}

/// Online vs. total instances of one role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    pub total: u32,
    pub online: u32,
}

impl NodeCounts {
    pub fn new(total: u32, online: u32) -> Self {
        Self { total, online }
    }

    pub fn count<T>(items: &[T], is_online: impl Fn(&T) -> bool) -> Self {
        let online = items.iter().filter(|item| is_online(item)).count();
        Self {
            total: items.len() as u32,
            online: online as u32,
        }
    }

    pub fn ratio(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.online as f64 / self.total as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub name: String,
    pub media_type: String,
    pub capacity_gb: u64,
    pub free_capacity_gb: u64,
    pub num_volumes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: u64,
    pub size_gb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub total_count: u64,
    pub total_size_gb: u64,
    pub mapped_count: u64,
    pub by_type: BTreeMap<String, TypeStats>,
}

impl VolumeStats {
    pub fn from_volumes(volumes: &[StorageVolume]) -> Self {
        let mut stats = VolumeStats::default();
        for volume in volumes {
            stats.total_count += 1;
            stats.total_size_gb += volume.size_gb;
            if !volume.mapped_sdcs.is_empty() {
                stats.mapped_count += 1;
            }
            let by_type = stats.by_type.entry(volume.volume_type.clone()).or_default();
            by_type.count += 1;
            by_type.size_gb += volume.size_gb;
        }
        stats
    }
}

fn or_missing<T>(data: Option<Vec<T>>, category: DataCategory, missing: &mut Vec<DataCategory>) -> Vec<T> {
    data.unwrap_or_else(|| {
        missing.push(category);
        Vec::new()
    })
}

/// Raw storage data; `None` marks a category that could not be fetched.
#[derive(Debug, Clone, Default)]
pub struct StorageInputs {
    pub protection_domains: Option<Vec<ProtectionDomain>>,
    pub pools: Option<Vec<StoragePool>>,
    pub volumes: Option<Vec<StorageVolume>>,
    pub sdc_nodes: Option<Vec<StorageNode>>,
    pub sds_nodes: Option<Vec<StorageNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSummary {
    pub collected_at: DateTime<Utc>,
    pub protection_domains: u64,
    pub pools: Vec<PoolSummary>,
    pub capacity: CapacitySummary,
    pub volumes: VolumeStats,
    pub sdc: NodeCounts,
    pub sds: NodeCounts,
    pub missing: Vec<DataCategory>,
}

impl StorageSummary {
    /// Fold raw gateway data into counters.
    pub fn fold(inputs: StorageInputs, sdc_online_state: &str, sds_online_state: &str) -> Self {
        let mut missing = Vec::new();
        let domains = or_missing(inputs.protection_domains, DataCategory::ProtectionDomains, &mut missing);
        let pools = or_missing(inputs.pools, DataCategory::StoragePools, &mut missing);
        let volumes = or_missing(inputs.volumes, DataCategory::Volumes, &mut missing);
        let sdc_nodes = or_missing(inputs.sdc_nodes, DataCategory::SdcNodes, &mut missing);
        let sds_nodes = or_missing(inputs.sds_nodes, DataCategory::SdsNodes, &mut missing);

        let total_gb = pools.iter().map(|p| p.capacity_gb).sum();
        let free_gb = pools.iter().map(|p| p.free_capacity_gb).sum();

        Self {
            collected_at: Utc::now(),
            protection_domains: domains.len() as u64,
            pools: pools
                .iter()
                .map(|p| PoolSummary {
                    name: p.name.clone(),
                    media_type: p.media_type.clone(),
                    capacity_gb: p.capacity_gb,
                    free_capacity_gb: p.free_capacity_gb,
                    num_volumes: p.num_volumes,
                })
                .collect(),
            capacity: CapacitySummary::from_totals(total_gb, free_gb),
            volumes: VolumeStats::from_volumes(&volumes),
            sdc: NodeCounts::count(&sdc_nodes, |n| n.state == sdc_online_state),
            sds: NodeCounts::count(&sds_nodes, |n| n.state == sds_online_state),
            missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSummary {
    pub name: String,
    pub role: BridgeRole,
    pub port_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub collected_at: DateTime<Utc>,
    pub bridges: Vec<BridgeSummary>,
    /// Best-effort sample of the forwarding daemon; absent when sampling failed.
    pub daemon: Option<ProcessSample>,
    pub missing: Vec<DataCategory>,
}

impl NetworkSummary {
    pub fn fold(
        bridge_names: Option<Vec<String>>,
        details: Option<Vec<BridgeInfo>>,
        daemon: Option<ProcessSample>,
    ) -> Self {
        let mut missing = Vec::new();
        let names = or_missing(bridge_names, DataCategory::Bridges, &mut missing);
        let details = or_missing(details, DataCategory::BridgePorts, &mut missing);

        let bridges = names
            .into_iter()
            .map(|name| BridgeSummary {
                role: BridgeRole::from_bridge_name(&name),
                port_count: details
                    .iter()
                    .find(|d| d.name == name)
                    .map(|d| d.ports.len() as u64)
                    .unwrap_or(0),
                name,
            })
            .collect();

        Self {
            collected_at: Utc::now(),
            bridges,
            daemon,
            missing,
        }
    }

    pub fn has_bridge(&self, name: &str) -> bool {
        self.bridges.iter().any(|b| b.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneSummary {
    pub collected_at: DateTime<Utc>,
    /// Online means enabled and reporting up.
    pub compute_services: NodeCounts,
    /// Online means administratively up and alive.
    pub network_agents: NodeCounts,
    pub switch_agents: NodeCounts,
    pub instances: u64,
    pub networks: u64,
    pub missing: Vec<DataCategory>,
}

impl ControlPlaneSummary {
    pub fn fold(
        services: Option<Vec<ComputeService>>,
        agents: Option<Vec<NetworkAgent>>,
        instances: Option<u64>,
        networks: Option<u64>,
    ) -> Self {
        let mut missing = Vec::new();
        let services = or_missing(services, DataCategory::ComputeServices, &mut missing);
        let agents = or_missing(agents, DataCategory::NetworkAgents, &mut missing);
        let instances = instances.unwrap_or_else(|| {
            missing.push(DataCategory::Servers);
            0
        });
        let networks = networks.unwrap_or_else(|| {
            missing.push(DataCategory::Networks);
            0
        });

        let switch_agents: Vec<NetworkAgent> = agents.iter().filter(|a| a.is_switch_agent()).cloned().collect();

        Self {
            collected_at: Utc::now(),
            compute_services: NodeCounts::count(&services, |s| s.enabled && s.up),
            network_agents: NodeCounts::count(&agents, |a| a.admin_state_up && a.alive),
            switch_agents: NodeCounts::count(&switch_agents, |a| a.admin_state_up && a.alive),
            instances,
            networks,
            missing,
        }
    }
}

/// Summary of one subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subsystem", rename_all = "snake_case")]
pub enum Summary {
    Storage(StorageSummary),
    Network(NetworkSummary),
    ControlPlane(ControlPlaneSummary),
}

impl Summary {
    pub fn subsystem(&self) -> Subsystem {
        match self {
            Summary::Storage(_) => Subsystem::Storage,
            Summary::Network(_) => Subsystem::Network,
            Summary::ControlPlane(_) => Subsystem::ControlPlane,
        }
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        match self {
            Summary::Storage(s) => s.collected_at,
            Summary::Network(s) => s.collected_at,
            Summary::ControlPlane(s) => s.collected_at,
        }
    }

    pub fn missing(&self) -> &[DataCategory] {
        match self {
            Summary::Storage(s) => &s.missing,
            Summary::Network(s) => &s.missing,
            Summary::ControlPlane(s) => &s.missing,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageSummary> {
        match self {
            Summary::Storage(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_network(&self) -> Option<&NetworkSummary> {
        match self {
            Summary::Network(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_control_plane(&self) -> Option<&ControlPlaneSummary> {
        match self {
            Summary::ControlPlane(s) => Some(s),
            _ => None,
        }
    }
}

/// Builds subsystem summaries from the adapters, behind a TTL cache.
pub struct SummaryBuilder {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
    gateway: Arc<dyn ObjectStorageGateway>,
    switch: Arc<dyn SwitchController>,
    sdc_online_state: String,
    sds_online_state: String,
    call_timeout: Duration,
    cache: TtlCache<Subsystem, Summary>,
}

impl SummaryBuilder {
    pub fn new(
        provider: Arc<dyn ComputeNetworkStorageProvider>,
        gateway: Arc<dyn ObjectStorageGateway>,
        switch: Arc<dyn SwitchController>,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            gateway,
            switch,
            sdc_online_state: config.storage_gateway.sdc_online_state.clone(),
            sds_online_state: config.storage_gateway.sds_online_state.clone(),
            call_timeout: config.storage_gateway.request_timeout(),
            cache: TtlCache::new(config.health.summary_ttl(), clock),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.cache.ttl()
    }

    /// Cached summary, recollected once the TTL has elapsed.
    pub async fn get_summary(&self, subsystem: Subsystem) -> Summary {
        self.cache
            .get_or_refresh(subsystem, || self.collect(subsystem))
            .await
    }

    /// Cached storage summary, unwrapped.
    pub async fn storage_summary(&self) -> StorageSummary {
        match self.get_summary(Subsystem::Storage).await {
            Summary::Storage(summary) => summary,
            _ => self.collect_storage().await,
        }
    }

    /// Drop the cached entry and collect afresh.
    pub async fn refresh(&self, subsystem: Subsystem) -> Summary {
        self.cache.invalidate(&subsystem).await;
        self.get_summary(subsystem).await
    }

    /// Age of the cached summary, if any.
    pub async fn cache_age(&self, subsystem: Subsystem) -> Option<Duration> {
        self.cache.age(&subsystem).await
    }

    /// Collect without consulting the cache.
    pub async fn collect(&self, subsystem: Subsystem) -> Summary {
        debug!(subsystem = %subsystem, "Collecting summary");
        match subsystem {
            Subsystem::Storage => Summary::Storage(self.collect_storage().await),
            Subsystem::Network => Summary::Network(self.collect_network().await),
            Subsystem::ControlPlane => Summary::ControlPlane(self.collect_control_plane().await),
        }
    }

    async fn fetch<T, F>(&self, category: DataCategory, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, AdapterError>>,
    {
        match call_with_timeout(self.call_timeout, call).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(category = %category, error = %e, "Summary data unavailable");
                None
            }
        }
    }

    async fn collect_storage(&self) -> StorageSummary {
        let inputs = StorageInputs {
            protection_domains: self.fetch(DataCategory::ProtectionDomains, self.gateway.protection_domains()).await,
            pools: self.fetch(DataCategory::StoragePools, self.gateway.storage_pools(None)).await,
            volumes: self.fetch(DataCategory::Volumes, self.gateway.volumes(None)).await,
            sdc_nodes: self.fetch(DataCategory::SdcNodes, self.gateway.sdc_nodes()).await,
            sds_nodes: self.fetch(DataCategory::SdsNodes, self.gateway.sds_nodes()).await,
        };
        StorageSummary::fold(inputs, &self.sdc_online_state, &self.sds_online_state)
    }

    async fn collect_network(&self) -> NetworkSummary {
        let names = self.fetch(DataCategory::Bridges, self.switch.list_bridges()).await;
        let details = self.fetch(DataCategory::BridgePorts, self.switch.bridge_details()).await;
        let daemon = tokio::time::timeout(self.call_timeout, self.switch.sample_process())
            .await
            .ok()
            .flatten();
        NetworkSummary::fold(names, details, daemon)
    }

    async fn collect_control_plane(&self) -> ControlPlaneSummary {
        let services = self.fetch(DataCategory::ComputeServices, self.provider.list_services()).await;
        let agents = self.fetch(DataCategory::NetworkAgents, self.provider.list_agents()).await;
        let servers = self.fetch(DataCategory::Servers, self.provider.list_servers()).await;
        let networks = self.fetch(DataCategory::Networks, self.provider.list_networks()).await;
        ControlPlaneSummary::fold(
            services,
            agents,
            servers.map(|s| s.len() as u64),
            networks.map(|n| n.len() as u64),
        )
    }
}
