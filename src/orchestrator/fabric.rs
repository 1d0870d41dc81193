// Standard switch fabric bootstrap
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::adapters::{PortProperty, SwitchController};
use crate::config::{FabricConfig, PhysicalNetwork};
use crate::error::AdapterError;
use crate::logging::audit::{AuditEvent, AuditEventType, AuditLogger, AuditResult};
use crate::orchestrator::Outcome;

/// Bridges handled by one bootstrap run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricReport {
    pub configured: Vec<String>,
    pub failed: Vec<String>,
}

/// Lays out the integration, provider and tunnel bridges of a node.
pub struct FabricBootstrap {
    switch: Arc<dyn SwitchController>,
    config: FabricConfig,
    audit: AuditLogger,
}

impl FabricBootstrap {
    pub fn new(switch: Arc<dyn SwitchController>, config: FabricConfig, audit: AuditLogger) -> Self {
        Self { switch, config, audit }
    }

    /// Configure every bridge independently; one failing bridge does not stop the rest.
    pub async fn bootstrap(&self) -> Outcome<FabricReport> {
        let mut report = FabricReport::default();
        let mut errors = Vec::new();

        let integration = self.config.integration_bridge.clone();
        let result = self.setup_integration_bridge(&integration).await;
        self.record(&integration, result, &mut report, &mut errors);

        for physnet in &self.config.physical_networks {
            let bridge = format!("br-{}", physnet.name);
            let result = self.setup_provider_bridge(&bridge, physnet).await;
            self.record(&bridge, result, &mut report, &mut errors);
        }

        let tunnel = self.config.tunnel_bridge.clone();
        let result = self.setup_tunnel_bridge(&tunnel).await;
        self.record(&tunnel, result, &mut report, &mut errors);

        let succeeded = report.configured.len();
        info!(configured = succeeded, failed = report.failed.len(), "Switch fabric bootstrap finished");
        Outcome::from_batch(report, errors, succeeded)
    }

    async fn setup_integration_bridge(&self, bridge: &str) -> Result<(), AdapterError> {
        self.switch.add_bridge(bridge).await?;
        self.switch.set_bridge_property(bridge, "datapath_type", "system").await
    }

    async fn setup_provider_bridge(&self, bridge: &str, physnet: &PhysicalNetwork) -> Result<(), AdapterError> {
        self.setup_integration_bridge(bridge).await?;
        self.switch.add_port(bridge, &physnet.interface).await?;
        self.switch
            .set_port_property(&physnet.interface, &PortProperty::Trunks(self.config.vlan_range.clone()))
            .await?;

        if let Err(e) = self.switch.set_bridge_property(bridge, "stp_enable", "false").await {
            debug!(bridge = %bridge, error = %e, "Could not disable STP");
        }
        Ok(())
    }

    async fn setup_tunnel_bridge(&self, bridge: &str) -> Result<(), AdapterError> {
        self.switch.add_bridge(bridge).await?;
        self.switch
            .set_bridge_property(bridge, "other-config:local_ip", &self.config.tunnel_ip)
            .await
    }

    /// Connect the tunnel bridge to a peer node.
    pub async fn create_vxlan_tunnel(&self, port: &str, remote_ip: &str, vni: u32) -> Result<(), AdapterError> {
        self.switch
            .add_vxlan_port(&self.config.tunnel_bridge, port, remote_ip, vni)
            .await?;
        info!(port = %port, remote_ip = %remote_ip, vni, "Created VXLAN tunnel");
        Ok(())
    }

    /// Ingress policing on a port; burst defaults to the rate.
    pub async fn configure_port_policing(&self, port: &str, max_rate_mbps: u64, burst_mbps: Option<u64>) -> Result<(), AdapterError> {
        let property = policing(max_rate_mbps, burst_mbps)?;
        self.switch.set_port_property(port, &property).await?;
        info!(port = %port, max_rate_mbps, "Port policing configured");
        Ok(())
    }

    fn record(&self, bridge: &str, result: Result<(), AdapterError>, report: &mut FabricReport, errors: &mut Vec<String>) {
        match result {
            Ok(()) => {
                info!(bridge = %bridge, "Bridge configured");
                self.audit.log_event(&AuditEvent::new(AuditEventType::FabricSetup, "configure_bridge", AuditResult::Success).resource(bridge));
                report.configured.push(bridge.to_string());
            }
            Err(e) => {
                warn!(bridge = %bridge, error = %e, "Bridge setup failed");
                self.audit.log_event(
                    &AuditEvent::new(AuditEventType::FabricSetup, "configure_bridge", AuditResult::Failure)
                        .resource(bridge)
                        .detail(e.to_string()),
                );
                errors.push(format!("bridge {} failed: {}", bridge, e));
                report.failed.push(bridge.to_string());
            }
        }
    }
}

/// Mbps to the kbps values the switch expects
pub fn policing(max_rate_mbps: u64, burst_mbps: Option<u64>) -> Result<PortProperty, AdapterError> {
    let to_kbps = |mbps: u64| {
        mbps.checked_mul(1000)
            .ok_or_else(|| AdapterError::InvalidArgument(format!("policing rate {} Mbps is out of range", mbps)))
    };
    Ok(PortProperty::IngressPolicing {
        rate_kbps: to_kbps(max_rate_mbps)?,
        burst_kbps: to_kbps(burst_mbps.unwrap_or(max_rate_mbps))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CommandOutput;
    use crate::orchestrator::OutcomeStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails any command that mentions `fail_on`.
    #[derive(Default)]
    struct ScriptedSwitch {
        fail_on: Option<&'static str>,
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SwitchController for ScriptedSwitch {
        async fn run_command(&self, argv: &[String]) -> Result<CommandOutput, AdapterError> {
            let line = argv.join(" ");
            self.commands.lock().unwrap().push(line.clone());
            let failed = self.fail_on.map_or(false, |needle| line.contains(needle));
            Ok(CommandOutput {
                success: !failed,
                stdout: String::new(),
                stderr: if failed { "ovs-vsctl: no such device".to_string() } else { String::new() },
            })
        }
    }

    fn bootstrap(switch: Arc<ScriptedSwitch>) -> FabricBootstrap {
        FabricBootstrap::new(switch, FabricConfig::default(), AuditLogger::disabled())
    }

    #[tokio::test]
    async fn standard_layout_is_applied() {
        let switch = Arc::new(ScriptedSwitch::default());
        let outcome = bootstrap(switch.clone()).bootstrap().await;

        assert!(outcome.is_success());
        assert_eq!(outcome.data().configured, vec!["br-int", "br-physnet1", "br-physnet2", "br-tun"]);

        let commands = switch.commands.lock().unwrap();
        assert!(commands.contains(&"ovs-vsctl set port eno1 trunk=100:4000".to_string()));
        assert!(commands.contains(&"ovs-vsctl set bridge br-physnet2 stp_enable=false".to_string()));
        assert!(commands.contains(&"ovs-vsctl set bridge br-tun other-config:local_ip=192.168.40.20".to_string()));
    }

    #[tokio::test]
    async fn one_failing_bridge_is_a_partial_failure() {
        let switch = Arc::new(ScriptedSwitch {
            fail_on: Some("eno2"),
            ..Default::default()
        });
        let outcome = bootstrap(switch).bootstrap().await;

        assert_eq!(outcome.status(), OutcomeStatus::PartialFailure);
        assert_eq!(outcome.data().failed, vec!["br-physnet2"]);
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].starts_with("bridge br-physnet2 failed"));
    }

    #[tokio::test]
    async fn stp_failure_is_ignored() {
        let switch = Arc::new(ScriptedSwitch {
            fail_on: Some("stp_enable"),
            ..Default::default()
        });
        assert!(bootstrap(switch).bootstrap().await.is_success());
    }

    #[test]
    fn policing_converts_to_kbps() {
        assert_eq!(policing(100, None).unwrap(), PortProperty::IngressPolicing { rate_kbps: 100_000, burst_kbps: 100_000 });
        assert_eq!(policing(100, Some(10)).unwrap(), PortProperty::IngressPolicing { rate_kbps: 100_000, burst_kbps: 10_000 });
        assert!(matches!(policing(u64::MAX, None), Err(AdapterError::InvalidArgument(_))));
        assert!(matches!(policing(100, Some(u64::MAX / 10)), Err(AdapterError::InvalidArgument(_))));
    }
}
