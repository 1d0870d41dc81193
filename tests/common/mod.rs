// In-memory adapters shared by the integration tests
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use cee_orchestrator::adapters::{
    CommandOutput, ComputeNetworkStorageProvider, ComputeService, Network, NetworkAgent, NetworkSpec,
    NodeRole, ObjectStorageGateway, Port, ProtectionDomain, Project, Provisioning, QosPolicy,
    QosRequest, ResourceRef, Role, Router, SecurityGroup, SecurityGroupRule, Server, ServerRequest,
    StorageNode, StoragePool, StorageVolume, Subnet, SubnetSpec, SwitchController, SystemStatistics,
    User, Volume, VolumeRequest,
};
use cee_orchestrator::clock::{Clock, ManualClock};
use cee_orchestrator::config::AppConfig;
use cee_orchestrator::summary::SummaryBuilder;
use cee_orchestrator::AdapterError;

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct CallLog {
    counts: Mutex<HashMap<String, usize>>,
}

impl CallLog {
    fn hit(&self, operation: &str) {
        *self.counts.lock().unwrap().entry(operation.to_string()).or_default() += 1;
    }

    pub fn count(&self, operation: &str) -> usize {
        self.counts.lock().unwrap().get(operation).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }
}

fn rejected(operation: &str) -> AdapterError {
    AdapterError::Http {
        status: 500,
        body: format!("{} rejected", operation),
    }
}

/// Control plane that creates everything in memory.
///
/// Any operation named in `fail_on` returns an HTTP 500 instead.
pub struct MockProvider {
    pub calls: CallLog,
    failing: Mutex<HashSet<String>>,
    failing_call: Mutex<HashMap<String, usize>>,
    next_id: AtomicU32,
    pub role_exists: bool,
    pub ports_per_server: usize,
    /// Held forever by `wait_for_status`, to exercise deadlines.
    pub hang_on_wait: bool,
    pub services: Vec<ComputeService>,
    pub agents: Vec<NetworkAgent>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            calls: CallLog::default(),
            failing: Mutex::new(HashSet::new()),
            failing_call: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            role_exists: true,
            ports_per_server: 1,
            hang_on_wait: false,
            services: vec![
                service("nova-compute", "compute-1", true),
                service("nova-compute", "compute-2", true),
            ],
            agents: vec![agent("Open vSwitch agent", "compute-1", true), agent("DHCP agent", "controller", true)],
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(operations: &[&str]) -> Self {
        let provider = Self::default();
        for op in operations {
            provider.fail_on(op);
        }
        provider
    }

    pub fn fail_on(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    /// Fail only the `nth` call (1-based) of `operation`.
    pub fn fail_call(&self, operation: &str, nth: usize) {
        self.failing_call.lock().unwrap().insert(operation.to_string(), nth);
    }

    fn enter(&self, operation: &str) -> Result<(), AdapterError> {
        self.calls.hit(operation);
        let nth_fails = self.failing_call.lock().unwrap().get(operation) == Some(&self.calls.count(operation));
        if nth_fails || self.failing.lock().unwrap().contains(operation) {
            Err(rejected(operation))
        } else {
            Ok(())
        }
    }

    fn id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

pub fn service(binary: &str, host: &str, up: bool) -> ComputeService {
    ComputeService {
        binary: binary.to_string(),
        host: host.to_string(),
        enabled: true,
        up,
    }
}

pub fn agent(agent_type: &str, host: &str, alive: bool) -> NetworkAgent {
    NetworkAgent {
        id: format!("{}-{}", host, agent_type.len()),
        agent_type: agent_type.to_string(),
        host: host.to_string(),
        admin_state_up: true,
        alive,
    }
}

#[async_trait]
impl ComputeNetworkStorageProvider for MockProvider {
    async fn create_project(&self, name: &str, _description: &str) -> Result<Project, AdapterError> {
        self.enter("create_project")?;
        Ok(Project { id: self.id("project"), name: name.to_string() })
    }

    async fn create_user(&self, name: &str, _password: &str, _project_id: &str) -> Result<User, AdapterError> {
        self.enter("create_user")?;
        Ok(User { id: self.id("user"), name: name.to_string() })
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>, AdapterError> {
        self.enter("find_role")?;
        Ok(self.role_exists.then(|| Role { id: "role-member".to_string(), name: name.to_string() }))
    }

    async fn assign_role(&self, _project_id: &str, _user_id: &str, _role_id: &str) -> Result<(), AdapterError> {
        self.enter("assign_role")
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<Network, AdapterError> {
        self.enter("create_network")?;
        Ok(Network {
            id: self.id("net"),
            name: spec.name.clone(),
            network_type: spec.network_type,
        })
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<Subnet, AdapterError> {
        self.enter("create_subnet")?;
        Ok(Subnet {
            id: self.id("subnet"),
            name: spec.name.clone(),
            network_id: spec.network_id.clone(),
            cidr: spec.cidr.clone(),
        })
    }

    async fn create_router(&self, name: &str, _project_id: &str) -> Result<Router, AdapterError> {
        self.enter("create_router")?;
        Ok(Router { id: self.id("router"), name: name.to_string() })
    }

    async fn attach_router_to_subnet(&self, _router_id: &str, _subnet_id: &str) -> Result<(), AdapterError> {
        self.enter("attach_router_to_subnet")
    }

    async fn create_security_group(&self, name: &str, _description: &str, _project_id: &str) -> Result<SecurityGroup, AdapterError> {
        self.enter("create_security_group")?;
        Ok(SecurityGroup { id: self.id("sg"), name: name.to_string() })
    }

    async fn add_security_group_rule(&self, _group_id: &str, _rule: &SecurityGroupRule) -> Result<(), AdapterError> {
        self.enter("add_security_group_rule")
    }

    async fn create_volume(&self, request: &VolumeRequest) -> Result<Volume, AdapterError> {
        self.enter("create_volume")?;
        Ok(Volume {
            id: self.id("vol"),
            name: request.name.clone(),
            size_gb: request.size_gb,
            status: "creating".to_string(),
        })
    }

    async fn create_server(&self, request: &ServerRequest) -> Result<Server, AdapterError> {
        self.enter("create_server")?;
        Ok(Server {
            id: self.id("server"),
            name: request.name.clone(),
            status: "BUILD".to_string(),
        })
    }

    async fn wait_for_status(&self, _resource: &ResourceRef, target: &str) -> Result<String, AdapterError> {
        self.enter("wait_for_status")?;
        if self.hang_on_wait {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        Ok(target.to_string())
    }

    async fn list_ports(&self, device_id: &str) -> Result<Vec<Port>, AdapterError> {
        self.enter("list_ports")?;
        Ok((0..self.ports_per_server)
            .map(|i| Port {
                id: format!("{}-port{}", device_id, i),
                device_id: device_id.to_string(),
            })
            .collect())
    }

    async fn create_qos_policy(&self, name: &str, _request: &QosRequest) -> Result<QosPolicy, AdapterError> {
        self.enter("create_qos_policy")?;
        Ok(QosPolicy { id: self.id("qos"), name: name.to_string() })
    }

    async fn update_port_qos(&self, port_id: &str, _policy_id: &str) -> Result<Port, AdapterError> {
        self.enter("update_port_qos")?;
        Ok(Port { id: port_id.to_string(), device_id: String::new() })
    }

    async fn list_projects(&self) -> Result<Vec<Project>, AdapterError> {
        self.enter("list_projects")?;
        Ok(vec![Project { id: "p1".to_string(), name: "admin".to_string() }])
    }

    async fn list_services(&self) -> Result<Vec<ComputeService>, AdapterError> {
        self.enter("list_services")?;
        Ok(self.services.clone())
    }

    async fn list_agents(&self) -> Result<Vec<NetworkAgent>, AdapterError> {
        self.enter("list_agents")?;
        Ok(self.agents.clone())
    }

    async fn list_servers(&self) -> Result<Vec<Server>, AdapterError> {
        self.enter("list_servers")?;
        Ok(Vec::new())
    }

    async fn list_networks(&self) -> Result<Vec<Network>, AdapterError> {
        self.enter("list_networks")?;
        Ok(Vec::new())
    }
}

pub fn pool(name: &str, capacity_gb: u64, free_capacity_gb: u64) -> StoragePool {
    StoragePool {
        id: format!("{}-id", name),
        name: name.to_string(),
        protection_domain_id: "pd1".to_string(),
        media_type: "SSD".to_string(),
        capacity_gb,
        free_capacity_gb,
        num_volumes: 0,
        spare_percentage: 10,
    }
}

pub fn storage_node(name: &str, role: NodeRole, state: &str) -> StorageNode {
    StorageNode {
        id: format!("{}-id", name),
        name: name.to_string(),
        ip_addresses: vec!["192.168.10.1".to_string()],
        role,
        state: state.to_string(),
        version: "3.6".to_string(),
    }
}

/// Storage gateway backed by fixed pools and nodes.
///
/// The typed operations are served from memory; raw `request`s only know
/// the system resource.
pub struct MockGateway {
    pub calls: CallLog,
    failing: Mutex<HashSet<String>>,
    pub pools: Vec<StoragePool>,
    pub sdc: Vec<StorageNode>,
    pub sds: Vec<StorageNode>,
    pub volumes: Mutex<Vec<StorageVolume>>,
    pub mapped: Mutex<Vec<(String, String)>>,
    next_id: AtomicU32,
}

impl MockGateway {
    pub fn with_capacity(total_gb: u64, free_gb: u64) -> Self {
        Self {
            calls: CallLog::default(),
            failing: Mutex::new(HashSet::new()),
            pools: vec![pool("pool1", total_gb, free_gb)],
            sdc: vec![
                storage_node("sdc-compute-1", NodeRole::Sdc, "Connected"),
                storage_node("sdc-compute-2", NodeRole::Sdc, "Connected"),
            ],
            sds: (1..=3)
                .map(|i| storage_node(&format!("sds-{}", i), NodeRole::Sds, "Normal"))
                .collect(),
            volumes: Mutex::new(Vec::new()),
            mapped: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn healthy() -> Self {
        Self::with_capacity(1000, 500)
    }

    /// `online` of `total` SDS nodes in the normal state.
    pub fn with_sds(mut self, total: usize, online: usize) -> Self {
        self.sds = (0..total)
            .map(|i| {
                let state = if i < online { "Normal" } else { "Disconnected" };
                storage_node(&format!("sds-{}", i + 1), NodeRole::Sds, state)
            })
            .collect();
        self
    }

    pub fn fail_on(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    fn enter(&self, operation: &str) -> Result<(), AdapterError> {
        self.calls.hit(operation);
        if self.failing.lock().unwrap().contains(operation) {
            Err(AdapterError::Transport(format!("{}: connection refused", operation)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStorageGateway for MockGateway {
    async fn authenticate(&self, _username: &str, _password: &str) -> Result<String, AdapterError> {
        self.enter("authenticate")?;
        Ok("token".to_string())
    }

    async fn request(&self, _method: Method, path: &str, _body: Option<Value>) -> Result<Value, AdapterError> {
        self.enter("request")?;
        match path {
            "/instances/System" => Ok(json!({"data": [{"id": "sys1", "name": "cluster"}]})),
            _ => Err(AdapterError::NotFound(path.to_string())),
        }
    }

    async fn system_statistics(&self) -> Result<SystemStatistics, AdapterError> {
        self.enter("system_statistics")?;
        Ok(SystemStatistics {
            total_read_bw_mbps: 120,
            total_write_bw_mbps: 80,
            total_iops: 5000,
            primary_read_bw_mbps: 60,
            primary_write_bw_mbps: 40,
        })
    }

    async fn protection_domains(&self) -> Result<Vec<ProtectionDomain>, AdapterError> {
        self.enter("protection_domains")?;
        Ok(vec![ProtectionDomain { id: "pd1".to_string(), name: "pd1".to_string() }])
    }

    async fn storage_pools(&self, _protection_domain_id: Option<&str>) -> Result<Vec<StoragePool>, AdapterError> {
        self.enter("storage_pools")?;
        Ok(self.pools.clone())
    }

    async fn volumes(&self, storage_pool_id: Option<&str>) -> Result<Vec<StorageVolume>, AdapterError> {
        self.enter("volumes")?;
        let volumes = self.volumes.lock().unwrap();
        Ok(volumes
            .iter()
            .filter(|v| storage_pool_id.map_or(true, |pool| v.storage_pool_id == pool))
            .cloned()
            .collect())
    }

    async fn sdc_nodes(&self) -> Result<Vec<StorageNode>, AdapterError> {
        self.enter("sdc_nodes")?;
        Ok(self.sdc.clone())
    }

    async fn sds_nodes(&self) -> Result<Vec<StorageNode>, AdapterError> {
        self.enter("sds_nodes")?;
        Ok(self.sds.clone())
    }

    async fn create_volume(
        &self,
        name: &str,
        size_gb: u64,
        storage_pool_id: &str,
        provisioning: Provisioning,
    ) -> Result<String, AdapterError> {
        self.enter("create_volume")?;
        let id = format!("vol-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.volumes.lock().unwrap().push(StorageVolume {
            id: id.clone(),
            name: name.to_string(),
            size_gb,
            storage_pool_id: storage_pool_id.to_string(),
            volume_type: provisioning.as_gateway_str().to_string(),
            creation_time: None,
            mapped_sdcs: Vec::new(),
        });
        Ok(id)
    }

    async fn map_volume(&self, volume_id: &str, sdc_id: &str, _allow_multiple: bool) -> Result<(), AdapterError> {
        self.enter("map_volume")?;
        self.mapped.lock().unwrap().push((volume_id.to_string(), sdc_id.to_string()));
        Ok(())
    }
}

/// Switch whose database answers `list-br`, `show` and `ps aux`.
///
/// Commands mentioning any `fail_on` needle exit non-zero.
pub struct MockSwitch {
    pub bridges: Vec<(String, Vec<String>)>,
    pub daemon_cpu: f64,
    pub fail_on: Vec<String>,
    pub commands: Mutex<Vec<String>>,
}

impl MockSwitch {
    pub fn with_bridges(bridges: &[(&str, &[&str])]) -> Self {
        Self {
            bridges: bridges
                .iter()
                .map(|(name, ports)| (name.to_string(), ports.iter().map(|p| p.to_string()).collect()))
                .collect(),
            daemon_cpu: 12.5,
            fail_on: Vec::new(),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Network node layout: integration, tunnel and one provider bridge.
    pub fn standard() -> Self {
        Self::with_bridges(&[
            ("br-int", &["br-int", "patch-tun", "tap01"]),
            ("br-tun", &["br-tun", "patch-int", "vxlan-0a000002"]),
            ("br-ex", &["br-ex", "eno1"]),
        ])
    }

    pub fn failing(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn show_output(&self) -> String {
        let mut out = String::from("8c1b2f36-0c0d-4c9a-9d0e-1d2c3b4a5f60\n");
        for (bridge, ports) in &self.bridges {
            out.push_str(&format!("    Bridge {}\n", bridge));
            for port in ports {
                out.push_str(&format!("        Port {}\n            Interface {}\n", port, port));
            }
        }
        out.push_str("    ovs_version: \"2.17.0\"\n");
        out
    }
}

#[async_trait]
impl SwitchController for MockSwitch {
    async fn run_command(&self, argv: &[String]) -> Result<CommandOutput, AdapterError> {
        let line = argv.join(" ");
        self.commands.lock().unwrap().push(line.clone());

        if self.fail_on.iter().any(|needle| line.contains(needle.as_str())) {
            return Ok(CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: "ovs-vsctl: database connection failed".to_string(),
            });
        }

        let stdout = match argv.get(1).map(String::as_str) {
            Some("list-br") => self.bridges.iter().map(|(b, _)| format!("{}\n", b)).collect(),
            Some("show") => self.show_output(),
            Some("--format=json") => r#"{
                "headings": ["_uuid", "name", "type", "options"],
                "data": [
                    [["uuid", "a"], "vxlan-0a000002", "vxlan", ["map", [["key", "100"], ["remote_ip", "10.0.0.2"]]]],
                    [["uuid", "b"], "br-int", "internal", ["map", []]]
                ]
            }"#
            .to_string(),
            Some("aux") => format!(
                "USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND\n\
                 root 812 {:.1} 1.2 300000 50000 ? S<Ls Jan01 10:00 ovs-vswitchd unix:/var/run/db.sock\n",
                self.daemon_cpu
            ),
            _ => String::new(),
        };
        Ok(CommandOutput {
            success: true,
            stdout,
            stderr: String::new(),
        })
    }
}

/// Summary builder over the given mocks with a hand-driven clock.
pub fn summary_builder(
    provider: Arc<MockProvider>,
    gateway: Arc<MockGateway>,
    switch: Arc<MockSwitch>,
    config: &AppConfig,
) -> (Arc<SummaryBuilder>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let builder = SummaryBuilder::new(provider, gateway, switch, config, clock.clone() as Arc<dyn Clock>);
    (Arc::new(builder), clock)
}
