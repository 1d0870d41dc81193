// Storage cluster volume management
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::adapters::{call_with_timeout, ObjectStorageGateway, Provisioning, StorageNode, StoragePool, StorageVolume};
use crate::config::StorageGatewayConfig;
use crate::error::AdapterError;
use crate::logging::audit::{AuditEvent, AuditEventType, AuditLogger, AuditResult};

/// Creates and maps volumes directly on the storage cluster.
pub struct StorageVolumeManager {
    gateway: Arc<dyn ObjectStorageGateway>,
    default_pool: String,
    timeout: Duration,
    audit: AuditLogger,
}

impl StorageVolumeManager {
    pub fn new(gateway: Arc<dyn ObjectStorageGateway>, config: &StorageGatewayConfig, audit: AuditLogger) -> Self {
        Self {
            gateway,
            default_pool: config.default_pool.clone(),
            timeout: config.request_timeout(),
            audit,
        }
    }

    /// The configured default pool, or the first pool the cluster reports.
    pub async fn default_pool(&self) -> Result<StoragePool, AdapterError> {
        let pools = call_with_timeout(self.timeout, self.gateway.storage_pools(None)).await?;
        select_pool(pools, &self.default_pool)
            .ok_or_else(|| AdapterError::NotFound("no storage pools configured".to_string()))
    }

    /// Create a volume in the default pool and return it as listed by the gateway.
    pub async fn create_volume(&self, name: &str, size_gb: u64, provisioning: Provisioning) -> Result<StorageVolume, AdapterError> {
        let result = self.try_create_volume(name, size_gb, provisioning).await;
        self.audit_result("create_volume", name, &result);
        result
    }

    async fn try_create_volume(&self, name: &str, size_gb: u64, provisioning: Provisioning) -> Result<StorageVolume, AdapterError> {
        let pool = self.default_pool().await?;
        let id = call_with_timeout(
            self.timeout,
            self.gateway.create_volume(name, size_gb, &pool.id, provisioning),
        )
        .await?;
        info!(volume = %name, volume_id = %id, pool = %pool.name, size_gb, "Created storage volume");

        let volumes = call_with_timeout(self.timeout, self.gateway.volumes(Some(&pool.id))).await?;
        volumes
            .into_iter()
            .find(|v| v.id == id)
            .ok_or_else(|| AdapterError::NotFound(format!("volume {} after creation", id)))
    }

    /// Map a volume to the client node whose name contains `hostname`.
    pub async fn attach_to_compute_node(&self, volume_id: &str, hostname: &str) -> Result<StorageNode, AdapterError> {
        let result = self.try_attach(volume_id, hostname).await;
        self.audit_result("attach_volume", volume_id, &result);
        result
    }

    async fn try_attach(&self, volume_id: &str, hostname: &str) -> Result<StorageNode, AdapterError> {
        let sdcs = call_with_timeout(self.timeout, self.gateway.sdc_nodes()).await?;
        let target = sdcs.into_iter().find(|sdc| sdc.name.contains(hostname)).ok_or_else(|| {
            error!(hostname = %hostname, "No storage client found for compute node");
            AdapterError::NotFound(format!("SDC node for host {}", hostname))
        })?;

        call_with_timeout(self.timeout, self.gateway.map_volume(volume_id, &target.id, false)).await?;
        info!(volume_id = %volume_id, sdc = %target.name, "Volume mapped to compute node");
        Ok(target)
    }

    fn audit_result<T>(&self, action: &str, resource: &str, result: &Result<T, AdapterError>) {
        let event = match result {
            Ok(_) => AuditEvent::new(AuditEventType::VolumeManagement, action, AuditResult::Success),
            Err(e) => AuditEvent::new(AuditEventType::VolumeManagement, action, AuditResult::Failure).detail(e.to_string()),
        };
        self.audit.log_event(&event.resource(resource));
    }
}

fn select_pool(pools: Vec<StoragePool>, preferred: &str) -> Option<StoragePool> {
    let preferred_index = pools.iter().position(|p| p.name == preferred).unwrap_or(0);
    pools.into_iter().nth(preferred_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(name: &str) -> StoragePool {
        StoragePool {
            id: format!("{}-id", name),
            name: name.to_string(),
            protection_domain_id: "pd1".to_string(),
            media_type: "SSD".to_string(),
            capacity_gb: 1000,
            free_capacity_gb: 500,
            num_volumes: 0,
            spare_percentage: 10,
        }
    }

    #[test]
    fn default_pool_is_preferred_then_first() {
        assert_eq!(select_pool(vec![pool("fast"), pool("pool1")], "pool1").unwrap().name, "pool1");
        assert_eq!(select_pool(vec![pool("fast"), pool("bulk")], "pool1").unwrap().name, "fast");
        assert!(select_pool(Vec::new(), "pool1").is_none());
    }
}
