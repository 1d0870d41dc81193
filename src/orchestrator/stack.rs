// Application stack deployment: volumes, then boot-from-volume instances
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::adapters::{
    call_with_timeout, Port, QosRequest, ResourceRef, Server, ServerRequest, Volume, VolumeRequest,
};
use crate::error::AdapterError;
use crate::logging::audit::{AuditEventType, AuditResult};
use crate::orchestrator::{Outcome, ProvisioningOrchestrator};

fn default_size_gb() -> u64 {
    20
}

fn default_network() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackVolumeSpec {
    pub name: String,
    #[serde(default = "default_size_gb")]
    pub size_gb: u64,
    #[serde(default)]
    pub volume_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_size_gb")]
    pub disk_size_gb: u64,
    #[serde(default)]
    pub volume_type: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    /// Bandwidth policy applied to every port once the instance is active.
    #[serde(default)]
    pub qos: Option<QosRequest>,
}

impl InstanceSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            image: None,
            flavor: None,
            network: default_network(),
            disk_size_gb: default_size_gb(),
            volume_type: None,
            availability_zone: None,
            qos: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSpec {
    pub name: String,
    #[serde(default)]
    pub volumes: Vec<StackVolumeSpec>,
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedInstance {
    pub server: Server,
    pub boot_volume: Volume,
    /// Ports that received the QoS policy.
    pub qos_ports: Vec<Port>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDeployment {
    pub stack_name: String,
    pub volumes: Vec<Volume>,
    pub instances: Vec<DeployedInstance>,
    /// Boot volumes whose instance never came up.
    pub orphaned_volumes: Vec<Volume>,
    /// Servers created but never confirmed active.
    pub orphaned_servers: Vec<Server>,
}

/// Instance creation failure, with whatever was left behind.
struct InstanceFailure {
    error: AdapterError,
    boot_volume: Option<Volume>,
    server: Option<Server>,
}

impl From<AdapterError> for InstanceFailure {
    fn from(error: AdapterError) -> Self {
        Self {
            error,
            boot_volume: None,
            server: None,
        }
    }
}

/// QoS failure partway through a server's ports.
struct QosFailure {
    error: AdapterError,
    updated: Vec<Port>,
}

impl From<AdapterError> for QosFailure {
    fn from(error: AdapterError) -> Self {
        Self { error, updated: Vec::new() }
    }
}

impl ProvisioningOrchestrator {
    /// Create the stack's volumes, then its instances, each on a best-effort basis.
    pub async fn deploy_application_stack(&self, spec: &StackSpec) -> Outcome<StackDeployment> {
        info!(
            stack = %spec.name,
            volumes = spec.volumes.len(),
            instances = spec.instances.len(),
            "Deploying application stack"
        );

        let mut deployment = StackDeployment {
            stack_name: spec.name.clone(),
            ..Default::default()
        };
        let mut errors = Vec::new();
        let mut succeeded = 0;

        for volume in &spec.volumes {
            let item = format!("volume {}", volume.name);
            if self.cancel.is_cancelled() {
                errors.push(format!("{} cancelled before completion", item));
                continue;
            }

            match self.create_stack_volume(&spec.name, volume).await {
                Ok(created) => {
                    self.audit.log_step(AuditEventType::StackDeployment, &spec.name, &item, AuditResult::Success, None);
                    deployment.volumes.push(created);
                    succeeded += 1;
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(stack = %spec.name, volume = %volume.name, error = %message, "Stack volume failed");
                    self.audit.log_step(AuditEventType::StackDeployment, &spec.name, &item, AuditResult::Failure, Some(&message));
                    errors.push(format!("{} failed: {}", item, message));
                }
            }
        }

        for instance in &spec.instances {
            let item = format!("instance {}", instance.name);
            if self.cancel.is_cancelled() {
                errors.push(format!("{} cancelled before completion", item));
                continue;
            }

            match self.deploy_instance(&spec.name, instance).await {
                Ok(mut deployed) => {
                    if let Some(qos) = &instance.qos {
                        match self.apply_port_qos(&deployed.server, qos).await {
                            Ok(ports) => deployed.qos_ports = ports,
                            Err(failure) => {
                                errors.push(format!("qos for {} failed: {}", item, failure.error));
                                deployed.qos_ports = failure.updated;
                            }
                        }
                    }
                    deployment.instances.push(deployed);
                    self.audit.log_step(AuditEventType::StackDeployment, &spec.name, &item, AuditResult::Success, None);
                    succeeded += 1;
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    warn!(stack = %spec.name, instance = %instance.name, error = %message, "Stack instance failed");
                    self.audit.log_step(AuditEventType::StackDeployment, &spec.name, &item, AuditResult::Failure, Some(&message));
                    errors.push(format!("{} failed: {}", item, message));
                    deployment.orphaned_volumes.extend(failure.boot_volume);
                    deployment.orphaned_servers.extend(failure.server);
                }
            }
        }

        let outcome = Outcome::from_batch(deployment, errors, succeeded);
        self.audit_run(AuditEventType::StackDeployment, &spec.name, outcome.status(), outcome.errors().len());
        info!(stack = %spec.name, status = %outcome.status(), "Application stack deployment finished");
        outcome
    }

    async fn create_stack_volume(&self, stack: &str, spec: &StackVolumeSpec) -> Result<Volume, AdapterError> {
        let request = VolumeRequest {
            name: format!("{}-{}-vol", stack, spec.name),
            size_gb: spec.size_gb,
            volume_type: spec
                .volume_type
                .clone()
                .unwrap_or_else(|| self.config.default_volume_type.clone()),
            image: None,
            availability_zone: None,
        };
        call_with_timeout(self.config.step_timeout(), self.provider.create_volume(&request)).await
    }

    async fn deploy_instance(&self, stack: &str, spec: &InstanceSpec) -> Result<DeployedInstance, InstanceFailure> {
        let name = format!("{}-{}", stack, spec.name);
        let step_timeout = self.config.step_timeout();
        let ready_timeout = self.config.ready_timeout();

        let volume_request = VolumeRequest {
            name: format!("{}-root-vol", name),
            size_gb: spec.disk_size_gb,
            volume_type: spec
                .volume_type
                .clone()
                .unwrap_or_else(|| self.config.default_volume_type.clone()),
            image: Some(spec.image.clone().unwrap_or_else(|| self.config.default_image.clone())),
            availability_zone: spec.availability_zone.clone(),
        };
        let boot_volume = call_with_timeout(step_timeout, self.provider.create_volume(&volume_request)).await?;

        let leftover = |error: AdapterError, volume: &Volume| InstanceFailure {
            error,
            boot_volume: Some(volume.clone()),
            server: None,
        };

        let volume_ref = ResourceRef::Volume(boot_volume.id.clone());
        call_with_timeout(ready_timeout, self.provider.wait_for_status(&volume_ref, "available"))
            .await
            .map_err(|e| leftover(e, &boot_volume))?;

        let server_request = ServerRequest {
            name: name.clone(),
            flavor: spec.flavor.clone().unwrap_or_else(|| self.config.default_flavor.clone()),
            network: spec.network.clone(),
            boot_volume_id: boot_volume.id.clone(),
            availability_zone: spec.availability_zone.clone(),
        };
        let server = call_with_timeout(step_timeout, self.provider.create_server(&server_request))
            .await
            .map_err(|e| leftover(e, &boot_volume))?;

        let server_ref = ResourceRef::Server(server.id.clone());
        let status = call_with_timeout(ready_timeout, self.provider.wait_for_status(&server_ref, "ACTIVE"))
            .await
            .map_err(|e| InstanceFailure {
                server: Some(server.clone()),
                ..leftover(e, &boot_volume)
            })?;

        info!(server = %name, server_id = %server.id, "Instance active");
        Ok(DeployedInstance {
            server: Server { status, ..server },
            boot_volume,
            qos_ports: Vec::new(),
        })
    }

    /// Attach a fresh QoS policy to every port of `server`.
    async fn apply_port_qos(&self, server: &Server, qos: &QosRequest) -> Result<Vec<Port>, QosFailure> {
        let timeout = self.config.step_timeout();
        let ports = call_with_timeout(timeout, self.provider.list_ports(&server.id)).await?;

        let mut updated = Vec::with_capacity(ports.len());
        for port in ports {
            let request = QosRequest {
                max_burst_kbps: qos.max_burst_kbps.or(qos.max_kbps),
                ..qos.clone()
            };
            let applied = async {
                let policy = call_with_timeout(
                    timeout,
                    self.provider.create_qos_policy(&format!("{}-{}-qos", server.name, port.id), &request),
                )
                .await?;
                call_with_timeout(timeout, self.provider.update_port_qos(&port.id, &policy.id)).await
            };
            match applied.await {
                Ok(port) => updated.push(port),
                Err(error) => return Err(QosFailure { error, updated }),
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_defaults_match_deserialized_defaults() {
        let parsed: InstanceSpec = serde_yaml::from_str("name: web").unwrap();
        assert_eq!(parsed, InstanceSpec::new("web"));
    }

    #[test]
    fn stack_spec_parses_qos() {
        let yaml = r#"
name: shop
volumes:
  - name: data
    size_gb: 50
instances:
  - name: web
    qos:
      max_kbps: 10000
      min_kbps: 1000
"#;
        let spec: StackSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.volumes[0].size_gb, 50);
        let qos = spec.instances[0].qos.as_ref().unwrap();
        assert_eq!(qos.max_kbps, Some(10_000));
        assert_eq!(qos.max_burst_kbps, None);
    }
}
