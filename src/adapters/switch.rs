// Virtual switch command layer
use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::SwitchConfig;
use crate::error::AdapterError;

/// Captured result of one switch command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Bridge layout as reported by `ovs-vsctl show`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub name: String,
    pub ports: Vec<String>,
}

/// Interface row from the switch database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub interface_type: String,
    pub remote_ip: Option<String>,
    pub key: Option<String>,
}

/// CPU / memory share of the forwarding daemon, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

/// Settable port / interface properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortProperty {
    VlanTag(u16),
    /// VLAN range such as `100:4000`.
    Trunks(String),
    IngressPolicing { rate_kbps: u64, burst_kbps: u64 },
}

impl PortProperty {
    fn table(&self) -> &'static str {
        match self {
            PortProperty::VlanTag(_) | PortProperty::Trunks(_) => "port",
            PortProperty::IngressPolicing { .. } => "interface",
        }
    }

    fn assignments(&self) -> Vec<String> {
        match self {
            PortProperty::VlanTag(tag) => vec![format!("tag={}", tag)],
            PortProperty::Trunks(range) => vec![format!("trunk={}", range)],
            PortProperty::IngressPolicing { rate_kbps, burst_kbps } => vec![
                format!("ingress_policing_rate={}", rate_kbps),
                format!("ingress_policing_burst={}", burst_kbps),
            ],
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Bridges and their ports from `ovs-vsctl show` output.
pub fn parse_show_output(output: &str) -> Vec<BridgeInfo> {
    let mut bridges: Vec<BridgeInfo> = Vec::new();

    for line in output.lines().map(str::trim) {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("Bridge"), Some(name)) => bridges.push(BridgeInfo {
                name: name.trim_matches('"').to_string(),
                ports: Vec::new(),
            }),
            (Some("Port"), Some(name)) => {
                if let Some(bridge) = bridges.last_mut() {
                    bridge.ports.push(name.trim_matches('"').to_string());
                }
            }
            _ => {}
        }
    }

    bridges
}

/// Integer counters from a `{key=value, ...}` statistics column.
pub fn parse_statistics(output: &str) -> BTreeMap<String, u64> {
    let trimmed = output.trim();
    let inner = match trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(inner) => inner,
        None => return BTreeMap::new(),
    };

    inner
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            value.trim().parse::<u64>().ok().map(|v| (key.trim().to_string(), v))
        })
        .collect()
}

/// CPU and memory columns of the first `ps aux` row naming `process`.
pub fn parse_process_sample(output: &str, process: &str) -> Option<ProcessSample> {
    output
        .lines()
        .filter(|line| line.contains(process))
        .find_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 11 {
                return None;
            }
            Some(ProcessSample {
                cpu_percent: columns[2].parse().ok()?,
                mem_percent: columns[3].parse().ok()?,
            })
        })
}

/// Plain string, or the string inside a `["uuid", ...]`-style tagged value.
fn ovsdb_atom(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(pair) if pair.len() == 2 && pair[0] != "map" && pair[0] != "set" => {
            pair[1].as_str().map(str::to_string)
        }
        _ => None,
    }
}

fn ovsdb_map(value: &Value) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(Value::Array(entries)) = value.as_array().filter(|v| v.first() == Some(&Value::from("map"))).and_then(|v| v.get(1)) {
        for entry in entries {
            if let Some([k, v]) = entry.as_array().map(Vec::as_slice) {
                if let (Some(k), Some(v)) = (ovsdb_atom(k), ovsdb_atom(v)) {
                    map.insert(k, v);
                }
            }
        }
    }
    map
}

/// Interface rows from `ovs-vsctl --format=json list interface`.
pub fn parse_interface_table(output: &str) -> Result<Vec<InterfaceInfo>, AdapterError> {
    let table: Value = serde_json::from_str(output)?;

    let headings: Vec<&str> = table
        .get("headings")
        .and_then(Value::as_array)
        .map(|h| h.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let column = |name: &str| headings.iter().position(|h| *h == name);
    let name_col = column("name").unwrap_or(1);
    let type_col = column("type").unwrap_or(2);
    let options_col = column("options");

    let rows = table.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
    let interfaces = rows
        .iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            let name = row.get(name_col).and_then(ovsdb_atom)?;
            let interface_type = row.get(type_col).and_then(ovsdb_atom).unwrap_or_default();
            let options = options_col.and_then(|c| row.get(c)).map(ovsdb_map).unwrap_or_default();
            Some(InterfaceInfo {
                name,
                interface_type,
                remote_ip: options.get("remote_ip").cloned(),
                key: options.get("key").cloned(),
            })
        })
        .collect();

    Ok(interfaces)
}

/// Switch control operations.
///
/// Only `run_command` touches the host; the rest build argument vectors and
/// parse what comes back.
#[async_trait]
pub trait SwitchController: Send + Sync {
    async fn run_command(&self, argv: &[String]) -> Result<CommandOutput, AdapterError>;

    fn vsctl(&self) -> &str {
        "ovs-vsctl"
    }

    fn ps(&self) -> &str {
        "ps"
    }

    fn daemon_process(&self) -> &str {
        "ovs-vswitchd"
    }

    /// Run a switch database command, turning a non-zero exit into an error.
    async fn vsctl_checked(&self, args: &[&str]) -> Result<String, AdapterError> {
        let mut command = vec![self.vsctl().to_string()];
        command.extend(args.iter().map(|a| a.to_string()));

        let output = self.run_command(&command).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            error!("Switch command {} failed: {}", command.join(" "), output.stderr.trim());
            Err(AdapterError::Command {
                command: command.join(" "),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    async fn add_bridge(&self, bridge: &str) -> Result<(), AdapterError> {
        self.vsctl_checked(&["add-br", bridge]).await.map(|_| ())
    }

    async fn set_bridge_property(&self, bridge: &str, key: &str, value: &str) -> Result<(), AdapterError> {
        let assignment = format!("{}={}", key, value);
        self.vsctl_checked(&["set", "bridge", bridge, &assignment]).await.map(|_| ())
    }

    async fn add_port(&self, bridge: &str, port: &str) -> Result<(), AdapterError> {
        self.vsctl_checked(&["add-port", bridge, port]).await.map(|_| ())
    }

    async fn set_port_property(&self, port: &str, property: &PortProperty) -> Result<(), AdapterError> {
        let assignments = property.assignments();
        let mut args = vec!["set", property.table(), port];
        args.extend(assignments.iter().map(String::as_str));
        self.vsctl_checked(&args).await.map(|_| ())
    }

    async fn add_vxlan_port(&self, bridge: &str, port: &str, remote_ip: &str, key: u32) -> Result<(), AdapterError> {
        let remote = format!("options:remote_ip={}", remote_ip);
        let key = format!("options:key={}", key);
        self.vsctl_checked(&[
            "add-port", bridge, port, "--", "set", "interface", port, "type=vxlan", &remote, &key,
        ])
        .await
        .map(|_| ())
    }

    async fn list_bridges(&self) -> Result<Vec<String>, AdapterError> {
        let output = self.vsctl_checked(&["list-br"]).await?;
        Ok(output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    async fn bridge_details(&self) -> Result<Vec<BridgeInfo>, AdapterError> {
        let output = self.vsctl_checked(&["show"]).await?;
        Ok(parse_show_output(&output))
    }

    async fn interface_statistics(&self, interface: &str) -> Result<BTreeMap<String, u64>, AdapterError> {
        let output = self.vsctl_checked(&["get", "interface", interface, "statistics"]).await?;
        Ok(parse_statistics(&output))
    }

    async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>, AdapterError> {
        let output = self.vsctl_checked(&["--format=json", "list", "interface"]).await?;
        parse_interface_table(&output)
    }

    /// Best-effort: any failure yields `None`.
    async fn sample_process(&self) -> Option<ProcessSample> {
        let command = argv(&[self.ps(), "aux"]);
        match self.run_command(&command).await {
            Ok(output) if output.success => parse_process_sample(&output.stdout, self.daemon_process()),
            Ok(output) => {
                debug!("Process listing failed: {}", output.stderr.trim());
                None
            }
            Err(e) => {
                debug!("Process listing unavailable: {}", e);
                None
            }
        }
    }
}

/// Runs the switch tools as local subprocesses.
#[derive(Debug, Clone)]
pub struct OvsSwitchController {
    config: SwitchConfig,
}

impl OvsSwitchController {
    pub fn new(config: SwitchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SwitchController for OvsSwitchController {
    async fn run_command(&self, argv: &[String]) -> Result<CommandOutput, AdapterError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AdapterError::InvalidResponse("empty command".to_string()))?;

        debug!("Running {}", argv.join(" "));
        let output = tokio::time::timeout(
            self.config.command_timeout(),
            tokio::process::Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| AdapterError::Timeout(format!("{} did not finish within {:?}", program, self.config.command_timeout())))??;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn vsctl(&self) -> &str {
        &self.config.vsctl_binary
    }

    fn ps(&self) -> &str {
        &self.config.ps_binary
    }

    fn daemon_process(&self) -> &str {
        &self.config.daemon_process
    }
}
