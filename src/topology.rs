// Switch fabric topology discovery
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::adapters::SwitchController;

/// Function of a bridge in the fabric, derived from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeRole {
    Integration,
    Provider,
    Tunnel,
    Unknown,
}

impl BridgeRole {
    pub fn from_bridge_name(name: &str) -> Self {
        match name {
            "br-int" => BridgeRole::Integration,
            "br-tun" => BridgeRole::Tunnel,
            n if n.starts_with("br-provider") || n.starts_with("br-ex") => BridgeRole::Provider,
            _ => BridgeRole::Unknown,
        }
    }
}

impl std::fmt::Display for BridgeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeRole::Integration => write!(f, "integration"),
            BridgeRole::Provider => write!(f, "provider"),
            BridgeRole::Tunnel => write!(f, "tunnel"),
            BridgeRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// Node role inferred from which bridges exist locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    NetworkNode,
    ComputeNode,
    ControllerNode,
    Unknown,
}

impl NodeType {
    pub fn infer<'a>(roles: impl IntoIterator<Item = &'a BridgeRole>) -> Self {
        let (mut integration, mut tunnel, mut provider) = (false, false, false);
        for role in roles {
            match role {
                BridgeRole::Integration => integration = true,
                BridgeRole::Tunnel => tunnel = true,
                BridgeRole::Provider => provider = true,
                BridgeRole::Unknown => {}
            }
        }

        match (integration, tunnel, provider) {
            (true, true, true) => NodeType::NetworkNode,
            (true, true, false) => NodeType::ComputeNode,
            (true, false, _) => NodeType::ControllerNode,
            _ => NodeType::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyBridge {
    pub name: String,
    pub role: BridgeRole,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelEndpoint {
    pub name: String,
    pub remote_ip: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub discovered_at: DateTime<Utc>,
    pub bridges: Vec<TopologyBridge>,
    pub tunnels: Vec<TunnelEndpoint>,
    pub node_type: NodeType,
    /// Discovery steps that could not complete.
    pub errors: Vec<String>,
}

/// Walk bridges, ports and VXLAN interfaces of the local switch.
///
/// Each lookup is independent; a failing one is recorded in `errors` and the
/// rest of the topology is still returned.
pub async fn discover_topology(switch: &dyn SwitchController) -> NetworkTopology {
    let mut errors = Vec::new();

    let names = match switch.list_bridges().await {
        Ok(names) => names,
        Err(e) => {
            warn!("Bridge listing failed: {}", e);
            errors.push(format!("bridges: {}", e));
            Vec::new()
        }
    };

    let details = match switch.bridge_details().await {
        Ok(details) => details,
        Err(e) => {
            warn!("Bridge port layout unavailable: {}", e);
            errors.push(format!("ports: {}", e));
            Vec::new()
        }
    };

    let bridges: Vec<TopologyBridge> = names
        .into_iter()
        .map(|name| {
            let ports = details
                .iter()
                .find(|b| b.name == name)
                .map(|b| b.ports.clone())
                .unwrap_or_default();
            TopologyBridge {
                role: BridgeRole::from_bridge_name(&name),
                name,
                ports,
            }
        })
        .collect();

    let tunnels = match switch.list_interfaces().await {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|i| i.interface_type == "vxlan")
            .map(|i| TunnelEndpoint {
                name: i.name,
                remote_ip: i.remote_ip,
                key: i.key,
            })
            .collect(),
        Err(e) => {
            warn!("Interface table unavailable: {}", e);
            errors.push(format!("tunnels: {}", e));
            Vec::new()
        }
    };

    let node_type = NodeType::infer(bridges.iter().map(|b| &b.role));
    info!(
        bridges = bridges.len(),
        tunnels = tunnels.len(),
        node_type = ?node_type,
        "Topology discovered"
    );

    NetworkTopology {
        discovered_at: Utc::now(),
        bridges,
        tunnels,
        node_type,
        errors,
    }
}
