// Compute / identity / network / block-storage control plane interface
use async_trait::async_trait;
use serde::{Serialize, Deserialize};

use crate::error::AdapterError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
}

/// Segmentation type of a tenant or provider network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Vlan,
    Vxlan,
    Flat,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkType::Vlan => write!(f, "vlan"),
            NetworkType::Vxlan => write!(f, "vxlan"),
            NetworkType::Flat => write!(f, "flat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub project_id: Option<String>,
    pub network_type: NetworkType,
    pub physical_network: Option<String>,
    pub segmentation_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub network_type: NetworkType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub network_id: String,
    pub name: String,
    pub cidr: String,
    pub enable_dhcp: bool,
    pub gateway_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    pub direction: RuleDirection,
    pub protocol: String,
    pub port_range_min: u16,
    pub port_range_max: u16,
    pub remote_ip_prefix: String,
}

impl SecurityGroupRule {
    /// Single-port TCP ingress rule
    pub fn tcp_ingress(port: u16, remote_ip_prefix: &str) -> Self {
        Self {
            direction: RuleDirection::Ingress,
            protocol: "tcp".to_string(),
            port_range_min: port,
            port_range_max: port,
            remote_ip_prefix: remote_ip_prefix.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequest {
    pub name: String,
    pub size_gb: u64,
    pub volume_type: String,
    /// Image to populate a boot volume from.
    pub image: Option<String>,
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub size_gb: u64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRequest {
    pub name: String,
    pub flavor: String,
    pub network: String,
    pub boot_volume_id: String,
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosRequest {
    pub max_kbps: Option<u64>,
    pub max_burst_kbps: Option<u64>,
    pub min_kbps: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QosPolicy {
    pub id: String,
    pub name: String,
}

/// Resource whose status can be awaited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceRef {
    Volume(String),
    Server(String),
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceRef::Volume(id) => write!(f, "volume {}", id),
            ResourceRef::Server(id) => write!(f, "server {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeService {
    pub binary: String,
    pub host: String,
    pub enabled: bool,
    pub up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAgent {
    pub id: String,
    pub agent_type: String,
    pub host: String,
    pub admin_state_up: bool,
    pub alive: bool,
}

impl NetworkAgent {
    pub fn is_switch_agent(&self) -> bool {
        self.agent_type == "Open vSwitch agent"
    }
}

/// Control plane operations the orchestrator and summary builder rely on.
#[async_trait]
pub trait ComputeNetworkStorageProvider: Send + Sync {
    async fn create_project(&self, name: &str, description: &str) -> Result<Project, AdapterError>;
    async fn create_user(&self, name: &str, password: &str, project_id: &str) -> Result<User, AdapterError>;
    async fn find_role(&self, name: &str) -> Result<Option<Role>, AdapterError>;
    async fn assign_role(&self, project_id: &str, user_id: &str, role_id: &str) -> Result<(), AdapterError>;

    async fn create_network(&self, spec: &NetworkSpec) -> Result<Network, AdapterError>;
    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<Subnet, AdapterError>;
    async fn create_router(&self, name: &str, project_id: &str) -> Result<Router, AdapterError>;
    async fn attach_router_to_subnet(&self, router_id: &str, subnet_id: &str) -> Result<(), AdapterError>;
    async fn create_security_group(&self, name: &str, description: &str, project_id: &str) -> Result<SecurityGroup, AdapterError>;
    async fn add_security_group_rule(&self, group_id: &str, rule: &SecurityGroupRule) -> Result<(), AdapterError>;

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume, AdapterError>;
    async fn create_server(&self, request: &ServerRequest) -> Result<Server, AdapterError>;
    /// Block until the resource reports `target`; returns the final status.
    async fn wait_for_status(&self, resource: &ResourceRef, target: &str) -> Result<String, AdapterError>;

    async fn list_ports(&self, device_id: &str) -> Result<Vec<Port>, AdapterError>;
    async fn create_qos_policy(&self, name: &str, request: &QosRequest) -> Result<QosPolicy, AdapterError>;
    async fn update_port_qos(&self, port_id: &str, policy_id: &str) -> Result<Port, AdapterError>;

    async fn list_projects(&self) -> Result<Vec<Project>, AdapterError>;
    async fn list_services(&self) -> Result<Vec<ComputeService>, AdapterError>;
    async fn list_agents(&self) -> Result<Vec<NetworkAgent>, AdapterError>;
    async fn list_servers(&self) -> Result<Vec<Server>, AdapterError>;
    async fn list_networks(&self) -> Result<Vec<Network>, AdapterError>;
}

/// Provider used when no control plane client is wired in.
///
/// Every call fails with [`AdapterError::NotConfigured`], so summaries report
/// the control plane categories as missing and probes fail cleanly.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredControlPlane;

impl UnconfiguredControlPlane {
    fn fail<T>(&self, operation: &str) -> Result<T, AdapterError> {
        Err(AdapterError::NotConfigured(format!("control plane ({})", operation)))
    }
}

#[async_trait]
impl ComputeNetworkStorageProvider for UnconfiguredControlPlane {
    async fn create_project(&self, _name: &str, _description: &str) -> Result<Project, AdapterError> {
        self.fail("create_project")
    }

    async fn create_user(&self, _name: &str, _password: &str, _project_id: &str) -> Result<User, AdapterError> {
        self.fail("create_user")
    }

    async fn find_role(&self, _name: &str) -> Result<Option<Role>, AdapterError> {
        self.fail("find_role")
    }

    async fn assign_role(&self, _project_id: &str, _user_id: &str, _role_id: &str) -> Result<(), AdapterError> {
        self.fail("assign_role")
    }

    async fn create_network(&self, _spec: &NetworkSpec) -> Result<Network, AdapterError> {
        self.fail("create_network")
    }

    async fn create_subnet(&self, _spec: &SubnetSpec) -> Result<Subnet, AdapterError> {
        self.fail("create_subnet")
    }

    async fn create_router(&self, _name: &str, _project_id: &str) -> Result<Router, AdapterError> {
        self.fail("create_router")
    }

    async fn attach_router_to_subnet(&self, _router_id: &str, _subnet_id: &str) -> Result<(), AdapterError> {
        self.fail("attach_router_to_subnet")
    }

    async fn create_security_group(&self, _name: &str, _description: &str, _project_id: &str) -> Result<SecurityGroup, AdapterError> {
        self.fail("create_security_group")
    }

    async fn add_security_group_rule(&self, _group_id: &str, _rule: &SecurityGroupRule) -> Result<(), AdapterError> {
        self.fail("add_security_group_rule")
    }

    async fn create_volume(&self, _request: &VolumeRequest) -> Result<Volume, AdapterError> {
        self.fail("create_volume")
    }

    async fn create_server(&self, _request: &ServerRequest) -> Result<Server, AdapterError> {
        self.fail("create_server")
    }

    async fn wait_for_status(&self, _resource: &ResourceRef, _target: &str) -> Result<String, AdapterError> {
        self.fail("wait_for_status")
    }

    async fn list_ports(&self, _device_id: &str) -> Result<Vec<Port>, AdapterError> {
        self.fail("list_ports")
    }

    async fn create_qos_policy(&self, _name: &str, _request: &QosRequest) -> Result<QosPolicy, AdapterError> {
        self.fail("create_qos_policy")
    }

    async fn update_port_qos(&self, _port_id: &str, _policy_id: &str) -> Result<Port, AdapterError> {
        self.fail("update_port_qos")
    }

    async fn list_projects(&self) -> Result<Vec<Project>, AdapterError> {
        self.fail("list_projects")
    }

    async fn list_services(&self) -> Result<Vec<ComputeService>, AdapterError> {
        self.fail("list_services")
    }

    async fn list_agents(&self) -> Result<Vec<NetworkAgent>, AdapterError> {
        self.fail("list_agents")
    }

    async fn list_servers(&self) -> Result<Vec<Server>, AdapterError> {
        self.fail("list_servers")
    }

    async fn list_networks(&self) -> Result<Vec<Network>, AdapterError> {
        self.fail("list_networks")
    }
}
