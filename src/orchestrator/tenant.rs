// Tenant environment provisioning
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::adapters::{
    ComputeNetworkStorageProvider, Network, NetworkSpec, Project, Router, SecurityGroup,
    SecurityGroupRule, Subnet, SubnetSpec, User,
};
use crate::config::{ProvisioningConfig, TenantNetworkTemplate};
use crate::error::AdapterError;
use crate::logging::audit::AuditEventType;
use crate::orchestrator::{Outcome, PlanStep, ProvisioningOrchestrator, StepAction, StepOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub name: String,
    pub password: String,
}

/// Request for a new tenant; unset fields fall back to provisioning defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantSpec {
    pub name: String,
    pub description: Option<String>,
    pub user: Option<UserSpec>,
    pub networks: Option<Vec<TenantNetworkTemplate>>,
    pub create_router: Option<bool>,
    pub storage_quota_gb: Option<u64>,
}

impl TenantSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, name: &str, password: &str) -> Self {
        self.user = Some(UserSpec {
            name: name.to_string(),
            password: password.to_string(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantNetwork {
    pub suffix: String,
    pub network: Network,
    /// Absent when subnet creation failed after the network was created.
    pub subnet: Option<Subnet>,
}

/// Bookkeeping record of the storage a tenant was promised.
///
/// The storage backend has no per-tenant quota primitive, so this is never
/// enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageQuota {
    pub tenant: String,
    pub allocated_quota_gb: u64,
    pub storage_backend: String,
    pub enforced: bool,
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    Identity,
    Networking,
    Router,
    SecurityGroups,
    StorageQuota,
}

impl ResourceCategory {
    fn from_step(step: &str) -> Option<Self> {
        match step {
            "identity" => Some(ResourceCategory::Identity),
            "networking" => Some(ResourceCategory::Networking),
            "router" => Some(ResourceCategory::Router),
            "security_groups" => Some(ResourceCategory::SecurityGroups),
            "storage_quota" => Some(ResourceCategory::StorageQuota),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceCategory::Identity => write!(f, "identity"),
            ResourceCategory::Networking => write!(f, "networking"),
            ResourceCategory::Router => write!(f, "router"),
            ResourceCategory::SecurityGroups => write!(f, "security_groups"),
            ResourceCategory::StorageQuota => write!(f, "storage_quota"),
        }
    }
}

/// Everything created for a tenant, including leftovers of failed steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantEnvironment {
    pub tenant: String,
    pub project: Option<Project>,
    pub user: Option<User>,
    pub networks: Vec<TenantNetwork>,
    pub router: Option<Router>,
    pub security_groups: Vec<SecurityGroup>,
    pub storage_quota: Option<StorageQuota>,
    /// Categories whose step completed.
    pub created_resources: Vec<ResourceCategory>,
}

impl TenantEnvironment {
    pub fn new(tenant: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            ..Default::default()
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project.as_ref().map(|p| p.id.as_str())
    }

    pub fn primary_subnet(&self) -> Option<&Subnet> {
        self.networks.first().and_then(|n| n.subnet.as_ref())
    }

    /// Categories whose provisioning step succeeded
    pub fn created_categories(&self) -> Vec<ResourceCategory> {
        self.created_resources.clone()
    }

    /// Categories holding resources left behind by a failed step
    pub fn leftover_categories(&self) -> Vec<ResourceCategory> {
        self.categories_with_handles()
            .into_iter()
            .filter(|c| !self.created_resources.contains(c))
            .collect()
    }

    fn categories_with_handles(&self) -> Vec<ResourceCategory> {
        let mut categories = Vec::new();
        if self.project.is_some() {
            categories.push(ResourceCategory::Identity);
        }
        if !self.networks.is_empty() {
            categories.push(ResourceCategory::Networking);
        }
        if self.router.is_some() {
            categories.push(ResourceCategory::Router);
        }
        if !self.security_groups.is_empty() {
            categories.push(ResourceCategory::SecurityGroups);
        }
        if self.storage_quota.is_some() {
            categories.push(ResourceCategory::StorageQuota);
        }
        categories
    }

    fn require_project(&self) -> Result<String, AdapterError> {
        self.project_id()
            .map(str::to_string)
            .ok_or_else(|| AdapterError::NotFound(format!("project for tenant {}", self.tenant)))
    }
}

struct IdentityStep {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
    description: String,
    user: Option<UserSpec>,
    member_role: String,
}

#[async_trait]
impl StepAction<TenantEnvironment> for IdentityStep {
    async fn run(&self, env: &mut TenantEnvironment) -> Result<(), AdapterError> {
        let project = self.provider.create_project(&env.tenant, &self.description).await?;
        info!(tenant = %env.tenant, project_id = %project.id, "Created tenant project");
        let project_id = project.id.clone();
        env.project = Some(project);

        let Some(user_spec) = &self.user else {
            return Ok(());
        };

        let user = self.provider.create_user(&user_spec.name, &user_spec.password, &project_id).await?;
        let user_id = user.id.clone();
        env.user = Some(user);

        match self.provider.find_role(&self.member_role).await? {
            Some(role) => self.provider.assign_role(&project_id, &user_id, &role.id).await?,
            None => warn!(role = %self.member_role, user = %user_spec.name, "Role not found, user left without project role"),
        }
        Ok(())
    }
}

struct NetworkingStep {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
    templates: Vec<TenantNetworkTemplate>,
}

#[async_trait]
impl StepAction<TenantEnvironment> for NetworkingStep {
    async fn run(&self, env: &mut TenantEnvironment) -> Result<(), AdapterError> {
        let project_id = env.require_project()?;

        for template in &self.templates {
            let name = format!("{}-{}", env.tenant, template.suffix);
            let network = self
                .provider
                .create_network(&NetworkSpec {
                    name: name.clone(),
                    project_id: Some(project_id.clone()),
                    network_type: template.network_type,
                    physical_network: None,
                    segmentation_id: None,
                })
                .await?;
            let network_id = network.id.clone();
            env.networks.push(TenantNetwork {
                suffix: template.suffix.clone(),
                network,
                subnet: None,
            });

            let subnet = self
                .provider
                .create_subnet(&SubnetSpec {
                    network_id,
                    name: format!("{}-subnet", name),
                    cidr: template.cidr.clone(),
                    enable_dhcp: true,
                    gateway_ip: None,
                })
                .await?;

            info!(network = %name, cidr = %template.cidr, "Created tenant network");
            if let Some(created) = env.networks.last_mut() {
                created.subnet = Some(subnet);
            }
        }
        Ok(())
    }
}

struct RouterStep {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
}

#[async_trait]
impl StepAction<TenantEnvironment> for RouterStep {
    async fn run(&self, env: &mut TenantEnvironment) -> Result<(), AdapterError> {
        let project_id = env.require_project()?;
        let subnet_id = env
            .primary_subnet()
            .map(|s| s.id.clone())
            .ok_or_else(|| AdapterError::NotFound(format!("primary subnet for tenant {}", env.tenant)))?;

        let router = self.provider.create_router(&format!("{}-router", env.tenant), &project_id).await?;
        let router_id = router.id.clone();
        env.router = Some(router);

        self.provider.attach_router_to_subnet(&router_id, &subnet_id).await
    }
}

struct SecurityGroupsStep {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
    web_cidr: String,
    ssh_cidr: String,
}

#[async_trait]
impl StepAction<TenantEnvironment> for SecurityGroupsStep {
    async fn run(&self, env: &mut TenantEnvironment) -> Result<(), AdapterError> {
        let project_id = env.require_project()?;

        let groups = [
            ("web-sg", "Security group for web servers", vec![
                SecurityGroupRule::tcp_ingress(80, &self.web_cidr),
                SecurityGroupRule::tcp_ingress(443, &self.web_cidr),
            ]),
            ("ssh-sg", "Security group for SSH access", vec![
                SecurityGroupRule::tcp_ingress(22, &self.ssh_cidr),
            ]),
        ];

        for (name, description, rules) in groups {
            let group = self.provider.create_security_group(name, description, &project_id).await?;
            let group_id = group.id.clone();
            env.security_groups.push(group);
            for rule in &rules {
                self.provider.add_security_group_rule(&group_id, rule).await?;
            }
        }
        Ok(())
    }
}

struct StorageQuotaStep {
    quota_gb: u64,
    backend: String,
}

#[async_trait]
impl StepAction<TenantEnvironment> for StorageQuotaStep {
    async fn run(&self, env: &mut TenantEnvironment) -> Result<(), AdapterError> {
        env.storage_quota = Some(StorageQuota {
            tenant: env.tenant.clone(),
            allocated_quota_gb: self.quota_gb,
            storage_backend: self.backend.clone(),
            enforced: false,
            note: "storage quota is recorded only; the backend has no per-tenant limit".to_string(),
        });
        Ok(())
    }
}

pub(crate) fn tenant_plan(
    provider: &Arc<dyn ComputeNetworkStorageProvider>,
    config: &ProvisioningConfig,
    spec: &TenantSpec,
) -> Vec<PlanStep<TenantEnvironment>> {
    let identity = IdentityStep {
        provider: provider.clone(),
        description: spec
            .description
            .clone()
            .unwrap_or_else(|| format!("CEE tenant: {}", spec.name)),
        user: spec.user.clone(),
        member_role: config.member_role.clone(),
    };
    let networking = NetworkingStep {
        provider: provider.clone(),
        templates: spec.networks.clone().unwrap_or_else(|| config.tenant_networks.clone()),
    };

    let mut steps = vec![
        PlanStep::new("identity", identity).foundational(),
        PlanStep::new("networking", networking).depends_on(&["identity"]),
    ];

    if spec.create_router.unwrap_or(config.create_router) {
        steps.push(
            PlanStep::new("router", RouterStep { provider: provider.clone() })
                .depends_on(&["networking"])
                .when(|env: &TenantEnvironment| env.primary_subnet().is_some()),
        );
    }

    steps.push(
        PlanStep::new(
            "security_groups",
            SecurityGroupsStep {
                provider: provider.clone(),
                web_cidr: config.web_allowed_cidr.clone(),
                ssh_cidr: config.ssh_allowed_cidr.clone(),
            },
        )
        .depends_on(&["identity"]),
    );
    steps.push(PlanStep::new(
        "storage_quota",
        StorageQuotaStep {
            quota_gb: spec.storage_quota_gb.unwrap_or(config.storage_quota_gb),
            backend: config.storage_backend.clone(),
        },
    ));

    steps
}

impl ProvisioningOrchestrator {
    /// Create project, networks, router, security groups and quota record for a tenant.
    ///
    /// Nothing is rolled back on failure; the returned environment lists every
    /// resource that was created, whatever the status.
    pub async fn create_tenant_environment(&self, spec: &TenantSpec) -> Outcome<TenantEnvironment> {
        info!(tenant = %spec.name, "Creating tenant environment");

        let steps = tenant_plan(&self.provider, &self.config, spec);
        match self.executor().execute(steps, TenantEnvironment::new(&spec.name)).await {
            Ok(mut report) => {
                self.audit_plan(AuditEventType::TenantProvisioning, &spec.name, &report);
                report.state.created_resources = report
                    .steps
                    .iter()
                    .filter(|step| step.outcome == StepOutcome::Succeeded)
                    .filter_map(|step| ResourceCategory::from_step(&step.name))
                    .collect();
                info!(
                    tenant = %spec.name,
                    status = %report.status,
                    errors = report.errors.len(),
                    "Tenant environment provisioning finished"
                );
                Outcome::new(report.status, report.state, report.errors)
            }
            Err(e) => Outcome::Error {
                data: TenantEnvironment::new(&spec.name),
                errors: vec![e.to_string()],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::UnconfiguredControlPlane;
    use crate::orchestrator::PlanExecutor;

    fn provider() -> Arc<dyn ComputeNetworkStorageProvider> {
        Arc::new(UnconfiguredControlPlane)
    }

    #[test]
    fn plan_is_valid_and_ordered() {
        let steps = tenant_plan(&provider(), &ProvisioningConfig::default(), &TenantSpec::new("acme"));
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["identity", "networking", "router", "security_groups", "storage_quota"]);
        assert!(steps[0].foundational);
        assert!(PlanExecutor::validate(&steps).is_ok());
    }

    #[test]
    fn router_step_can_be_disabled() {
        let spec = TenantSpec {
            create_router: Some(false),
            ..TenantSpec::new("acme")
        };
        let steps = tenant_plan(&provider(), &ProvisioningConfig::default(), &spec);
        assert!(steps.iter().all(|s| s.name != "router"));
    }

    #[tokio::test]
    async fn unreachable_control_plane_is_a_foundation_failure() {
        let orchestrator = ProvisioningOrchestrator::new(
            provider(),
            ProvisioningConfig::default(),
            crate::logging::audit::AuditLogger::disabled(),
        );

        let outcome = orchestrator.create_tenant_environment(&TenantSpec::new("acme")).await;
        let env = outcome.data();

        assert!(matches!(outcome, Outcome::Error { .. }));
        assert_eq!(outcome.errors().len(), 1);
        assert!(outcome.errors()[0].starts_with("identity failed"));
        // the quota record does not depend on the project
        assert_eq!(env.created_categories(), vec![ResourceCategory::StorageQuota]);
        assert!(!env.storage_quota.as_ref().unwrap().enforced);
    }

    #[test]
    fn every_plan_step_maps_to_a_category() {
        let steps = tenant_plan(&provider(), &ProvisioningConfig::default(), &TenantSpec::new("acme"));
        assert!(steps.iter().all(|s| ResourceCategory::from_step(&s.name).is_some()));
    }
}
