// Software-defined storage REST gateway client
use async_trait::async_trait;
use reqwest::Method;
use serde::{Serialize, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::StorageGatewayConfig;
use crate::error::AdapterError;

const KB_PER_GB: u64 = 1024 * 1024;

/// Storage cluster node role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeRole {
    /// Data client, consumes volumes.
    Sdc,
    /// Data server, contributes disks.
    Sds,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Sdc => write!(f, "SDC"),
            NodeRole::Sds => write!(f, "SDS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionDomain {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePool {
    pub id: String,
    pub name: String,
    pub protection_domain_id: String,
    pub media_type: String,
    pub capacity_gb: u64,
    pub free_capacity_gb: u64,
    pub num_volumes: u64,
    pub spare_percentage: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVolume {
    pub id: String,
    pub name: String,
    pub size_gb: u64,
    pub storage_pool_id: String,
    pub volume_type: String,
    pub creation_time: Option<u64>,
    pub mapped_sdcs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    pub id: String,
    pub name: String,
    pub ip_addresses: Vec<String>,
    pub role: NodeRole,
    pub state: String,
    pub version: String,
}

/// Cluster-wide bandwidth counters, already converted from KiB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatistics {
    pub total_read_bw_mbps: u64,
    pub total_write_bw_mbps: u64,
    pub total_iops: u64,
    pub primary_read_bw_mbps: u64,
    pub primary_write_bw_mbps: u64,
}

/// Volume allocation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provisioning {
    Thin,
    Thick,
}

impl Provisioning {
    pub fn as_gateway_str(&self) -> &'static str {
        match self {
            Provisioning::Thin => "ThinProvisioned",
            Provisioning::Thick => "ThickProvisioned",
        }
    }
}

impl std::str::FromStr for Provisioning {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thin" => Ok(Provisioning::Thin),
            "thick" => Ok(Provisioning::Thick),
            other => Err(format!("unknown provisioning type: {}", other)),
        }
    }
}

pub(crate) fn kb_to_gb(kb: u64) -> u64 {
    kb / KB_PER_GB
}

/// Entries of a `{"data": [...]}` envelope; bare arrays are accepted too.
fn data_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn u64_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn required_id(value: &Value) -> Result<String, AdapterError> {
    value
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AdapterError::InvalidResponse(format!("entry without id: {}", value)))
}

fn parse_node(value: &Value, role: NodeRole) -> Result<StorageNode, AdapterError> {
    let id = required_id(value)?;
    let (ip_addresses, state, version) = match role {
        NodeRole::Sdc => (
            vec![str_field(value, "sdcIp")],
            value.get("mdmConnectionState").and_then(Value::as_str).unwrap_or("unknown").to_string(),
            str_field(value, "versionInfo"),
        ),
        NodeRole::Sds => (
            value
                .get("ipList")
                .and_then(Value::as_array)
                .map(|ips| ips.iter().map(|ip| str_field(ip, "ip")).collect())
                .unwrap_or_default(),
            value.get("sdsState").and_then(Value::as_str).unwrap_or("unknown").to_string(),
            String::new(),
        ),
    };

    Ok(StorageNode {
        id,
        name: str_field(value, "name"),
        ip_addresses,
        role,
        state,
        version,
    })
}

fn parse_statistics(value: &Value) -> SystemStatistics {
    let entry = data_items(value).into_iter().next().unwrap_or(value);
    let weight_mb = |key: &str| entry.get(key).map(|bwc| u64_field(bwc, "totalWeightInKb") / 1024).unwrap_or(0);
    let occurred = |key: &str| entry.get(key).map(|bwc| u64_field(bwc, "numOccured")).unwrap_or(0);

    SystemStatistics {
        total_read_bw_mbps: weight_mb("totalReadBwc"),
        total_write_bw_mbps: weight_mb("totalWriteBwc"),
        total_iops: occurred("totalReadBwc") + occurred("totalWriteBwc"),
        primary_read_bw_mbps: weight_mb("primaryReadBwc"),
        primary_write_bw_mbps: weight_mb("primaryWriteBwc"),
    }
}

/// Storage gateway operations.
///
/// Implementors supply `authenticate` and `request`; the typed operations are
/// provided on top of the gateway's `/instances/...` resource layout.
#[async_trait]
pub trait ObjectStorageGateway: Send + Sync {
    /// Open a session and return the session token.
    async fn authenticate(&self, username: &str, password: &str) -> Result<String, AdapterError>;

    /// Issue one request against the gateway base path.
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, AdapterError>;

    async fn system_info(&self) -> Result<Value, AdapterError> {
        self.request(Method::GET, "/instances/System", None).await
    }

    async fn system_statistics(&self) -> Result<SystemStatistics, AdapterError> {
        let info = self.system_info().await?;
        let system_id = data_items(&info)
            .first()
            .map(|system| required_id(system))
            .transpose()?
            .ok_or_else(|| AdapterError::NotFound("storage system".to_string()))?;

        let stats = self
            .request(Method::GET, &format!("/instances/System::{}/relationships/Statistics", system_id), None)
            .await?;
        Ok(parse_statistics(&stats))
    }

    async fn protection_domains(&self) -> Result<Vec<ProtectionDomain>, AdapterError> {
        let response = self.request(Method::GET, "/instances/ProtectionDomain", None).await?;
        data_items(&response)
            .into_iter()
            .map(|domain| {
                Ok(ProtectionDomain {
                    id: required_id(domain)?,
                    name: str_field(domain, "name"),
                })
            })
            .collect()
    }

    async fn storage_pools(&self, protection_domain_id: Option<&str>) -> Result<Vec<StoragePool>, AdapterError> {
        let path = match protection_domain_id {
            Some(domain) => format!("/instances/ProtectionDomain::{}/relationships/StoragePool", domain),
            None => "/instances/StoragePool".to_string(),
        };
        let response = self.request(Method::GET, &path, None).await?;

        let mut pools = Vec::new();
        for raw in data_items(&response) {
            let id = match required_id(raw) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping storage pool entry: {}", e);
                    continue;
                }
            };

            // Missing statistics leave the pool at zero capacity rather than dropping it
            let stats = self
                .request(Method::GET, &format!("/instances/StoragePool::{}/relationships/Statistics", id), None)
                .await
                .ok();
            let (capacity_gb, free_capacity_gb) = match stats.as_ref().and_then(|s| data_items(s).first().copied()) {
                Some(entry) => {
                    let free_kb = u64_field(entry, "capacityAvailableForVolumeAllocationInKb");
                    let total_kb = match entry.get("maxCapacityInKb").and_then(Value::as_u64) {
                        Some(max) => max,
                        None => u64_field(entry, "capacityInUseInKb") + free_kb,
                    };
                    (kb_to_gb(total_kb), kb_to_gb(free_kb))
                }
                None => (0, 0),
            };

            pools.push(StoragePool {
                id,
                name: str_field(raw, "name"),
                protection_domain_id: str_field(raw, "protectionDomainId"),
                media_type: raw.get("mediaType").and_then(Value::as_str).unwrap_or("SSD").to_string(),
                capacity_gb,
                free_capacity_gb,
                num_volumes: u64_field(raw, "numOfVolumes"),
                spare_percentage: raw.get("sparePercentage").and_then(Value::as_u64).unwrap_or(10),
            });
        }
        Ok(pools)
    }

    async fn volumes(&self, storage_pool_id: Option<&str>) -> Result<Vec<StorageVolume>, AdapterError> {
        let path = match storage_pool_id {
            Some(pool) => format!("/instances/StoragePool::{}/relationships/Volume", pool),
            None => "/instances/Volume".to_string(),
        };
        let response = self.request(Method::GET, &path, None).await?;

        let mut volumes = Vec::new();
        for raw in data_items(&response) {
            let id = match required_id(raw) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping volume entry: {}", e);
                    continue;
                }
            };

            let mapped_sdcs = match self
                .request(Method::GET, &format!("/instances/Volume::{}/relationships/SdcMappedToVolume", id), None)
                .await
            {
                Ok(mappings) => data_items(&mappings).into_iter().map(|m| str_field(m, "sdcId")).collect(),
                Err(e) => {
                    debug!("No mapping information for volume {}: {}", id, e);
                    Vec::new()
                }
            };

            volumes.push(StorageVolume {
                id,
                name: str_field(raw, "name"),
                size_gb: kb_to_gb(u64_field(raw, "sizeInKb")),
                storage_pool_id: str_field(raw, "storagePoolId"),
                volume_type: raw.get("volumeType").and_then(Value::as_str).unwrap_or("ThinProvisioned").to_string(),
                creation_time: raw.get("creationTime").and_then(Value::as_u64),
                mapped_sdcs,
            });
        }
        Ok(volumes)
    }

    async fn sdc_nodes(&self) -> Result<Vec<StorageNode>, AdapterError> {
        let response = self.request(Method::GET, "/instances/Sdc", None).await?;
        data_items(&response).into_iter().map(|node| parse_node(node, NodeRole::Sdc)).collect()
    }

    async fn sds_nodes(&self) -> Result<Vec<StorageNode>, AdapterError> {
        let response = self.request(Method::GET, "/instances/Sds", None).await?;
        data_items(&response).into_iter().map(|node| parse_node(node, NodeRole::Sds)).collect()
    }

    /// Create a volume and return its id.
    async fn create_volume(
        &self,
        name: &str,
        size_gb: u64,
        storage_pool_id: &str,
        provisioning: Provisioning,
    ) -> Result<String, AdapterError> {
        let body = json!({
            "name": name,
            "sizeInGb": size_gb,
            "storagePoolId": storage_pool_id,
            "volumeType": provisioning.as_gateway_str(),
        });
        let response = self.request(Method::POST, "/instances/Volume", Some(body)).await?;
        required_id(&response)
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<(), AdapterError> {
        let body = json!({ "removeMode": "ONLY_ME" });
        self.request(Method::POST, &format!("/instances/Volume::{}/action/removeVolume", volume_id), Some(body))
            .await
            .map(|_| ())
    }

    async fn map_volume(&self, volume_id: &str, sdc_id: &str, allow_multiple: bool) -> Result<(), AdapterError> {
        let body = json!({
            "sdcId": sdc_id,
            "allowMultipleMapping": if allow_multiple { "true" } else { "false" },
        });
        self.request(Method::POST, &format!("/instances/Volume::{}/action/addMappedSdc", volume_id), Some(body))
            .await
            .map(|_| ())
    }

    async fn unmap_volume(&self, volume_id: &str, sdc_id: &str) -> Result<(), AdapterError> {
        let body = json!({ "sdcId": sdc_id });
        self.request(Method::POST, &format!("/instances/Volume::{}/action/removeMappedSdc", volume_id), Some(body))
            .await
            .map(|_| ())
    }
}

/// HTTPS client for the storage gateway using Basic authentication.
pub struct RestStorageGateway {
    client: reqwest::Client,
    config: StorageGatewayConfig,
}

impl RestStorageGateway {
    pub fn new(config: StorageGatewayConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url(), path.trim_start_matches('/'))
    }

    async fn send_once(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, AdapterError> {
        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => AdapterError::Authentication(text),
                404 => AdapterError::NotFound(url.to_string()),
                code => AdapterError::Http { status: code, body: text },
            });
        }

        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) => Ok(json!({ "status": "success", "data": text })),
        }
    }
}

#[async_trait]
impl ObjectStorageGateway for RestStorageGateway {
    async fn authenticate(&self, username: &str, password: &str) -> Result<String, AdapterError> {
        let response = self
            .client
            .get(self.url("/login"))
            .basic_auth(username, Some(password))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AdapterError::Authentication(format!(
                "gateway login returned {}",
                response.status().as_u16()
            )));
        }

        let token = response.text().await?.trim().trim_matches('"').to_string();
        info!("Authenticated against storage gateway {}", self.config.host);
        Ok(token)
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, AdapterError> {
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            match self.send_once(method.clone(), &url, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay() * attempt;
                    warn!("Gateway request {} {} failed ({}), retry {} in {:?}", method, path, e, attempt, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!("Gateway request {} {} failed: {}", method, path, e);
                    return Err(e);
                }
            }
        }
    }
}
