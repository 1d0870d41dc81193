//! Orchestration and health aggregation over a private cloud stack.
//!
//! The crate composes multi-step provisioning across a compute/network
//! control plane, a software-defined storage cluster and a virtual switch
//! fabric, and folds their status into one classified view. The three
//! backends are reached only through the traits in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod summary;
pub mod topology;

pub use error::{AdapterError, ClassificationError, ConfigError, PlanError};
pub use health::{classify, HealthCheckReport, HealthCheckRunner, HealthState, HealthThresholds, HealthVerdict};
pub use orchestrator::{Outcome, OutcomeStatus, ProvisioningOrchestrator};
pub use report::{ComprehensiveStatusReporter, SystemStatus};
pub use summary::{Subsystem, Summary, SummaryBuilder};
