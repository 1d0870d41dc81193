// Command line interface for the orchestrator
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::{
    ComputeNetworkStorageProvider, ObjectStorageGateway, OvsSwitchController, Provisioning,
    RestStorageGateway, SwitchController, UnconfiguredControlPlane,
};
use crate::clock::SystemClock;
use crate::config::{manager::ConfigManager, AppConfig};
use crate::health::{HealthCheckReport, HealthCheckRunner, ProbeStatus};
use crate::logging::audit::AuditLogger;
use crate::logging::LoggingManager;
use crate::orchestrator::{
    FabricBootstrap, Outcome, ProvisioningOrchestrator, StackSpec, StorageVolumeManager, TenantSpec,
};
use crate::report::{ComprehensiveStatusReporter, PerformanceReporter, SystemStatus};
use crate::summary::{Subsystem, SummaryBuilder};
use crate::topology::discover_topology;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// CEE orchestrator CLI
#[derive(Parser)]
#[command(name = "cee-orchestrator")]
#[command(about = "Provisioning and health aggregation for the CEE cloud stack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub output_format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Overall status of storage, network and control plane
    Status {
        /// Bypass the summary cache
        #[arg(long)]
        refresh: bool,
    },

    /// Run the health check battery
    Health {
        /// Run probes concurrently
        #[arg(long)]
        parallel: bool,
    },

    /// Storage cluster commands
    Storage(StorageCommand),

    /// Switch fabric commands
    Network(NetworkCommand),

    /// Tenant provisioning
    Tenant(TenantCommand),

    /// Application stack deployment
    Stack(StackCommand),

    /// Configuration management
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
pub struct StorageCommand {
    #[command(subcommand)]
    pub action: StorageAction,
}

#[derive(Subcommand)]
pub enum StorageAction {
    /// Capacity, node and volume summary
    Summary,
    /// Bandwidth, IOPS and capacity recommendations
    Report,
    /// Create a volume in the default pool
    CreateVolume {
        name: String,
        #[arg(long, default_value = "20")]
        size_gb: u64,
        /// thin or thick
        #[arg(long, default_value = "thin")]
        provisioning: String,
    },
    /// Map a volume to a compute node
    Attach {
        volume_id: String,
        /// Hostname matched against storage client names
        host: String,
    },
}

#[derive(Args)]
pub struct NetworkCommand {
    #[command(subcommand)]
    pub action: NetworkAction,
}

#[derive(Subcommand)]
pub enum NetworkAction {
    /// Bridge and daemon summary
    Summary,
    /// Discover bridges, tunnels and the node role
    Topology,
    /// Create the standard bridge layout
    Bootstrap,
    /// Add a VXLAN tunnel to a peer
    Tunnel {
        port: String,
        remote_ip: String,
        #[arg(long)]
        vni: u32,
    },
    /// Limit ingress bandwidth of a port
    Police {
        port: String,
        #[arg(long)]
        rate_mbps: u64,
        #[arg(long)]
        burst_mbps: Option<u64>,
    },
}

#[derive(Args)]
pub struct TenantCommand {
    #[command(subcommand)]
    pub action: TenantAction,
}

#[derive(Subcommand)]
pub enum TenantAction {
    /// Create a tenant environment
    Create {
        name: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, requires = "user")]
        password: Option<String>,
        #[arg(long)]
        no_router: bool,
        #[arg(long)]
        quota_gb: Option<u64>,
    },
}

#[derive(Args)]
pub struct StackCommand {
    #[command(subcommand)]
    pub action: StackAction,
}

#[derive(Subcommand)]
pub enum StackAction {
    /// Deploy a stack described in a YAML or JSON file
    Deploy { file: PathBuf },
}

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate,
    /// Write the default configuration
    Generate {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Adapters and shared components built from the configuration
struct Services {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
    gateway: Arc<dyn ObjectStorageGateway>,
    switch: Arc<dyn SwitchController>,
    summaries: Arc<SummaryBuilder>,
}

impl Services {
    fn build(config: &AppConfig) -> CliResult<Self> {
        let provider: Arc<dyn ComputeNetworkStorageProvider> = Arc::new(UnconfiguredControlPlane);
        let gateway: Arc<dyn ObjectStorageGateway> = Arc::new(RestStorageGateway::new(config.storage_gateway.clone())?);
        let switch: Arc<dyn SwitchController> = Arc::new(OvsSwitchController::new(config.switch.clone()));
        let summaries = Arc::new(SummaryBuilder::new(
            provider.clone(),
            gateway.clone(),
            switch.clone(),
            config,
            Arc::new(SystemClock),
        ));
        Ok(Self { provider, gateway, switch, summaries })
    }
}

pub struct CliApp {
    config_manager: ConfigManager,
    format: OutputFormat,
}

impl CliApp {
    pub fn new(global: &GlobalArgs) -> Self {
        let config_path = global
            .config
            .clone()
            .or_else(|| std::env::var("CEE_CONFIG_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("cee-config.yaml"));
        Self {
            config_manager: ConfigManager::new(config_path),
            format: global.output_format,
        }
    }

    pub async fn run(&mut self, cli: Cli) -> CliResult {
        self.config_manager.load().await?;
        self.config_manager.load_from_env().await;
        let config = self.config_manager.get_config().await;
        self.setup_logging(&config, &cli.global)?;

        match cli.command {
            Commands::Status { refresh } => self.handle_status(&config, refresh).await,
            Commands::Health { parallel } => self.handle_health(&config, parallel).await,
            Commands::Storage(args) => self.handle_storage(&config, args.action).await,
            Commands::Network(args) => self.handle_network(&config, args.action).await,
            Commands::Tenant(args) => self.handle_tenant(&config, args.action).await,
            Commands::Stack(args) => self.handle_stack(&config, args.action).await,
            Commands::Config(args) => self.handle_config(&config, args.action).await,
            Commands::Completions { shell } => {
                clap_complete::generate(shell, &mut Cli::command(), "cee-orchestrator", &mut io::stdout());
                Ok(())
            }
        }
    }

    fn setup_logging(&self, config: &AppConfig, global: &GlobalArgs) -> CliResult {
        let mut logging = config.logging.clone();
        if let Some(level) = &global.log_level {
            logging.level = level.clone();
        }
        if global.no_color {
            logging.enable_colors = false;
        }
        LoggingManager::new(logging).initialize()?;
        Ok(())
    }

    fn audit_logger(config: &AppConfig) -> AuditLogger {
        LoggingManager::new(config.logging.clone()).create_audit_logger()
    }

    async fn handle_status(&self, config: &AppConfig, refresh: bool) -> CliResult {
        let services = Services::build(config)?;
        if refresh {
            for subsystem in Subsystem::ALL {
                services.summaries.refresh(subsystem).await;
            }
        }

        let reporter = ComprehensiveStatusReporter::new(services.summaries.clone(), config.health.thresholds.clone());
        let status = reporter.get_status().await;
        self.emit(&status, render_status)
    }

    async fn handle_health(&self, config: &AppConfig, parallel: bool) -> CliResult {
        let services = Services::build(config)?;
        let mut config = config.clone();
        config.health.parallel_probes |= parallel;

        let runner = HealthCheckRunner::standard(
            services.provider,
            services.gateway,
            services.switch,
            services.summaries,
            &config,
        );
        let report = runner.run_health_checks().await;
        self.emit(&report, render_health)?;

        if report.failed > 0 {
            return Err(format!("{} health checks failed", report.failed).into());
        }
        Ok(())
    }

    async fn handle_storage(&self, config: &AppConfig, action: StorageAction) -> CliResult {
        let services = Services::build(config)?;
        match action {
            StorageAction::Summary => {
                let summary = services.summaries.get_summary(Subsystem::Storage).await;
                self.emit(&summary, |s| to_yaml_text(s))
            }
            StorageAction::Report => {
                let reporter = PerformanceReporter::new(
                    services.summaries.clone(),
                    services.gateway.clone(),
                    config.storage_gateway.request_timeout(),
                );
                let report = reporter.storage_report().await;
                self.emit(&report, |r| to_yaml_text(r))
            }
            StorageAction::CreateVolume { name, size_gb, provisioning } => {
                let provisioning: Provisioning = provisioning.parse()?;
                let manager = StorageVolumeManager::new(services.gateway, &config.storage_gateway, Self::audit_logger(config));
                let volume = manager.create_volume(&name, size_gb, provisioning).await?;
                self.emit(&volume, |v| format!("Created volume {} ({}) in pool {}", v.name, v.id, v.storage_pool_id))
            }
            StorageAction::Attach { volume_id, host } => {
                let manager = StorageVolumeManager::new(services.gateway, &config.storage_gateway, Self::audit_logger(config));
                let sdc = manager.attach_to_compute_node(&volume_id, &host).await?;
                self.emit(&sdc, |n| format!("Mapped volume {} to {} ({})", volume_id, n.name, n.id))
            }
        }
    }

    async fn handle_network(&self, config: &AppConfig, action: NetworkAction) -> CliResult {
        let services = Services::build(config)?;
        let fabric = || FabricBootstrap::new(services.switch.clone(), config.fabric.clone(), Self::audit_logger(config));

        match action {
            NetworkAction::Summary => {
                let summary = services.summaries.get_summary(Subsystem::Network).await;
                self.emit(&summary, |s| to_yaml_text(s))
            }
            NetworkAction::Topology => {
                let topology = discover_topology(services.switch.as_ref()).await;
                self.emit(&topology, |t| to_yaml_text(t))
            }
            NetworkAction::Bootstrap => {
                let outcome = fabric().bootstrap().await;
                self.emit_outcome(&outcome)
            }
            NetworkAction::Tunnel { port, remote_ip, vni } => {
                fabric().create_vxlan_tunnel(&port, &remote_ip, vni).await?;
                println!("Tunnel {} -> {} (VNI {}) created", port, remote_ip, vni);
                Ok(())
            }
            NetworkAction::Police { port, rate_mbps, burst_mbps } => {
                fabric().configure_port_policing(&port, rate_mbps, burst_mbps).await?;
                println!("Port {} limited to {} Mbps", port, rate_mbps);
                Ok(())
            }
        }
    }

    async fn handle_tenant(&self, config: &AppConfig, action: TenantAction) -> CliResult {
        let TenantAction::Create { name, user, password, no_router, quota_gb } = action;

        let mut spec = TenantSpec::new(&name);
        if let Some(user) = user {
            spec = spec.with_user(&user, password.as_deref().unwrap_or_default());
        }
        if no_router {
            spec.create_router = Some(false);
        }
        spec.storage_quota_gb = quota_gb;

        let orchestrator = self.orchestrator(config)?;
        let shutdown = orchestrator.cancellation_token();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current step");
                shutdown.cancel();
            }
        });

        let outcome = orchestrator.create_tenant_environment(&spec).await;
        ctrl_c.abort();
        self.emit_outcome(&outcome)
    }

    async fn handle_stack(&self, config: &AppConfig, action: StackAction) -> CliResult {
        let StackAction::Deploy { file } = action;

        let content = std::fs::read_to_string(&file)?;
        let spec: StackSpec = if file.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        let outcome = self.orchestrator(config)?.deploy_application_stack(&spec).await;
        self.emit_outcome(&outcome)
    }

    async fn handle_config(&self, config: &AppConfig, action: ConfigAction) -> CliResult {
        match action {
            ConfigAction::Show => self.emit(config, |c| to_yaml_text(c)),
            ConfigAction::Validate => {
                self.config_manager
                    .validate()
                    .await
                    .map_err(|errors| format!("Configuration validation failed: {}", errors.join(", ")))?;
                println!("Configuration is valid");
                Ok(())
            }
            ConfigAction::Generate { output } => {
                match output {
                    Some(path) => {
                        ConfigManager::new(path.clone()).save().await?;
                        info!("Default configuration written to {:?}", path);
                    }
                    None => println!("{}", serde_yaml::to_string(&AppConfig::default())?),
                }
                Ok(())
            }
        }
    }

    fn orchestrator(&self, config: &AppConfig) -> CliResult<ProvisioningOrchestrator> {
        let services = Services::build(config)?;
        Ok(ProvisioningOrchestrator::new(
            services.provider,
            config.provisioning.clone(),
            Self::audit_logger(config),
        ))
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> CliResult {
        let rendered = match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)?,
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Text => text(value),
        };
        println!("{}", rendered);
        Ok(())
    }

    /// Print an outcome; anything but success becomes a non-zero exit.
    fn emit_outcome<T: Serialize>(&self, outcome: &Outcome<T>) -> CliResult {
        self.emit(outcome, |o| {
            let mut text = format!("Status: {}\n", o.status());
            for error in o.errors() {
                text.push_str(&format!("  error: {}\n", error));
            }
            text.push_str(&to_yaml_text(o.data()));
            text
        })?;

        if outcome.is_success() {
            Ok(())
        } else {
            Err(format!("operation finished with status {}", outcome.status()).into())
        }
    }
}

fn to_yaml_text<T: Serialize>(value: &T) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|e| format!("<unrenderable: {}>", e))
}

fn render_status(status: &SystemStatus) -> String {
    let mut text = format!("Overall health: {}\n", status.overall);
    for component in &status.components {
        text.push_str(&format!("  {:<14} {}\n", component.subsystem, component.verdict.state));
    }
    if !status.alerts.is_empty() {
        text.push_str("Alerts:\n");
        for alert in &status.alerts {
            text.push_str(&format!("  - {}\n", alert));
        }
    }
    text.push_str("Recommendations:\n");
    for recommendation in &status.recommendations {
        text.push_str(&format!("  - {}\n", recommendation));
    }
    text
}

fn render_health(report: &HealthCheckReport) -> String {
    let mut text = String::from("Health check results:\n");
    for check in &report.checks {
        let marker = match check.status {
            ProbeStatus::Pass => "PASS",
            ProbeStatus::Warning => "WARN",
            ProbeStatus::Fail => "FAIL",
        };
        text.push_str(&format!("  [{}] {:<30} {}\n", marker, check.name, check.message));
    }
    text.push_str(&format!(
        "{} passed, {} warnings, {} failed",
        report.passed, report.warnings, report.failed
    ));
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommands() {
        let cli = Cli::try_parse_from([
            "cee-orchestrator",
            "storage",
            "create-volume",
            "data",
            "--size-gb",
            "50",
            "--output-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.global.output_format, OutputFormat::Json);
        match cli.command {
            Commands::Storage(StorageCommand {
                action: StorageAction::CreateVolume { name, size_gb, provisioning },
            }) => {
                assert_eq!(name, "data");
                assert_eq!(size_gb, 50);
                assert_eq!(provisioning, "thin");
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn password_requires_user() {
        assert!(Cli::try_parse_from(["cee-orchestrator", "tenant", "create", "acme", "--password", "x"]).is_err());
    }
}
