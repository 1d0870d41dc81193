// Orchestrator configuration
use std::time::Duration;
use serde::{Serialize, Deserialize};

use crate::adapters::NetworkType;
use crate::health::HealthThresholds;
use crate::logging::LoggingConfig;

pub mod manager;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub control_plane: ControlPlaneConfig,
    pub storage_gateway: StorageGatewayConfig,
    pub switch: SwitchConfig,
    pub health: HealthConfig,
    pub provisioning: ProvisioningConfig,
    pub fabric: FabricConfig,
    pub logging: LoggingConfig,
}

/// Identity / compute / network control plane endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub auth_url: String,
    pub username: String,
    pub password: Option<String>,
    pub project_name: String,
    pub user_domain_name: String,
    pub project_domain_name: String,
    pub region_name: String,
    pub verify_ssl: bool,
    pub request_timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://controller:5000/v3".to_string(),
            username: "admin".to_string(),
            password: None,
            project_name: "admin".to_string(),
            user_domain_name: "Default".to_string(),
            project_domain_name: "Default".to_string(),
            region_name: "RegionOne".to_string(),
            verify_ssl: false,
            request_timeout_secs: 30,
        }
    }
}

impl ControlPlaneConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Software-defined storage REST gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageGatewayConfig {
    pub host: String,
    pub port: u16,
    pub base_path: String,
    pub username: String,
    pub password: String,
    pub verify_ssl: bool,
    pub request_timeout_secs: u64,
    /// Extra attempts for transient failures; 0 keeps single-shot semantics.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub protection_domain: String,
    pub default_pool: String,
    pub sdc_online_state: String,
    pub sds_online_state: String,
}

impl Default for StorageGatewayConfig {
    fn default() -> Self {
        Self {
            host: "192.168.2.13".to_string(),
            port: 4443,
            base_path: "/api".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            verify_ssl: false,
            request_timeout_secs: 30,
            max_retries: 0,
            retry_delay_ms: 500,
            protection_domain: "protection_domain1".to_string(),
            default_pool: "pool1".to_string(),
            sdc_online_state: "Connected".to_string(),
            sds_online_state: "Normal".to_string(),
        }
    }
}

impl StorageGatewayConfig {
    pub fn base_url(&self) -> String {
        format!(
            "https://{}:{}/{}",
            self.host,
            self.port,
            self.base_path.trim_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Virtual switch command layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub vsctl_binary: String,
    pub ps_binary: String,
    pub daemon_process: String,
    pub command_timeout_secs: u64,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            vsctl_binary: "ovs-vsctl".to_string(),
            ps_binary: "ps".to_string(),
            daemon_process: "ovs-vswitchd".to_string(),
            command_timeout_secs: 15,
        }
    }
}

impl SwitchConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Summary cache, classification thresholds and probe battery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub summary_ttl_secs: u64,
    pub thresholds: HealthThresholds,
    pub probe_timeout_secs: u64,
    pub parallel_probes: bool,
    /// `host:port` endpoints the reachability probe connects to.
    pub reachability_targets: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            summary_ttl_secs: 300,
            thresholds: HealthThresholds::default(),
            probe_timeout_secs: 30,
            parallel_probes: false,
            reachability_targets: Vec::new(),
        }
    }
}

impl HealthConfig {
    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Network created for every new tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantNetworkTemplate {
    /// Appended to the tenant name, e.g. `acme-internal`.
    pub suffix: String,
    pub cidr: String,
    pub network_type: NetworkType,
}

/// Tenant and stack provisioning defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub tenant_networks: Vec<TenantNetworkTemplate>,
    pub create_router: bool,
    pub member_role: String,
    pub web_allowed_cidr: String,
    pub ssh_allowed_cidr: String,
    pub storage_quota_gb: u64,
    pub storage_backend: String,
    pub step_timeout_secs: u64,
    pub ready_timeout_secs: u64,
    pub default_image: String,
    pub default_flavor: String,
    pub default_volume_type: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            tenant_networks: vec![
                TenantNetworkTemplate {
                    suffix: "internal".to_string(),
                    cidr: "10.0.1.0/24".to_string(),
                    network_type: NetworkType::Vxlan,
                },
                TenantNetworkTemplate {
                    suffix: "dmz".to_string(),
                    cidr: "10.0.2.0/24".to_string(),
                    network_type: NetworkType::Vxlan,
                },
            ],
            create_router: true,
            member_role: "member".to_string(),
            web_allowed_cidr: "0.0.0.0/0".to_string(),
            ssh_allowed_cidr: "10.0.0.0/8".to_string(),
            storage_quota_gb: 100,
            storage_backend: "vxsds".to_string(),
            step_timeout_secs: 120,
            ready_timeout_secs: 600,
            default_image: "ubuntu-20.04".to_string(),
            default_flavor: "m1.medium".to_string(),
            default_volume_type: "vxsds_thin_SSD".to_string(),
        }
    }
}

impl ProvisioningConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}

/// Physical network attached to a provider bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalNetwork {
    pub name: String,
    pub interface: String,
}

/// Switch fabric layout applied by the bridge bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub integration_bridge: String,
    pub tunnel_bridge: String,
    pub physical_networks: Vec<PhysicalNetwork>,
    pub vlan_range: String,
    pub tunnel_interface: String,
    pub tunnel_ip: String,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            integration_bridge: "br-int".to_string(),
            tunnel_bridge: "br-tun".to_string(),
            physical_networks: vec![
                PhysicalNetwork { name: "physnet1".to_string(), interface: "eno1".to_string() },
                PhysicalNetwork { name: "physnet2".to_string(), interface: "eno2".to_string() },
            ],
            vlan_range: "100:4000".to_string(),
            tunnel_interface: "eno3".to_string(),
            tunnel_ip: "192.168.40.20".to_string(),
        }
    }
}
