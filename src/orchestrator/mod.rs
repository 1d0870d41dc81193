//! Multi-step, multi-backend provisioning.
//!
//! Provisioning is additive and best-effort: a failed step is recorded and
//! its dependents are skipped, but nothing created earlier is rolled back.

use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tokio_util::sync::CancellationToken;

use crate::adapters::ComputeNetworkStorageProvider;
use crate::config::ProvisioningConfig;
use crate::logging::audit::{AuditEvent, AuditEventType, AuditLogger, AuditResult};

pub mod fabric;
pub mod plan;
pub mod stack;
pub mod storage;
pub mod tenant;

pub use fabric::{FabricBootstrap, FabricReport};
pub use plan::{PlanExecutor, PlanReport, PlanStep, SkipReason, StepAction, StepOutcome, StepRecord};
pub use stack::{DeployedInstance, InstanceSpec, StackDeployment, StackSpec, StackVolumeSpec};
pub use storage::StorageVolumeManager;
pub use tenant::{ResourceCategory, StorageQuota, TenantEnvironment, TenantNetwork, TenantSpec, UserSpec};

/// Overall status of a multi-step operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    PartialFailure,
    Error,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::PartialFailure => write!(f, "partial_failure"),
            OutcomeStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of a multi-step operation.
///
/// Every variant carries whatever was created, so callers can clean up after
/// a partial or failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success { data: T },
    PartialFailure { data: T, errors: Vec<String> },
    Error { data: T, errors: Vec<String> },
}

impl<T> Outcome<T> {
    pub fn new(status: OutcomeStatus, data: T, errors: Vec<String>) -> Self {
        match status {
            OutcomeStatus::Success => Outcome::Success { data },
            OutcomeStatus::PartialFailure => Outcome::PartialFailure { data, errors },
            OutcomeStatus::Error => Outcome::Error { data, errors },
        }
    }

    /// Success without errors, partial failure when some items succeeded.
    pub fn from_batch(data: T, errors: Vec<String>, succeeded: usize) -> Self {
        let status = match (errors.is_empty(), succeeded) {
            (true, _) => OutcomeStatus::Success,
            (false, 0) => OutcomeStatus::Error,
            (false, _) => OutcomeStatus::PartialFailure,
        };
        Self::new(status, data, errors)
    }

    pub fn status(&self) -> OutcomeStatus {
        match self {
            Outcome::Success { .. } => OutcomeStatus::Success,
            Outcome::PartialFailure { .. } => OutcomeStatus::PartialFailure,
            Outcome::Error { .. } => OutcomeStatus::Error,
        }
    }

    pub fn data(&self) -> &T {
        match self {
            Outcome::Success { data } | Outcome::PartialFailure { data, .. } | Outcome::Error { data, .. } => data,
        }
    }

    pub fn into_data(self) -> T {
        match self {
            Outcome::Success { data } | Outcome::PartialFailure { data, .. } | Outcome::Error { data, .. } => data,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            Outcome::Success { .. } => &[],
            Outcome::PartialFailure { errors, .. } | Outcome::Error { errors, .. } => errors,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Drives tenant and application stack provisioning against the control plane.
pub struct ProvisioningOrchestrator {
    provider: Arc<dyn ComputeNetworkStorageProvider>,
    config: ProvisioningConfig,
    audit: AuditLogger,
    cancel: CancellationToken,
}

impl ProvisioningOrchestrator {
    pub fn new(provider: Arc<dyn ComputeNetworkStorageProvider>, config: ProvisioningConfig, audit: AuditLogger) -> Self {
        Self {
            provider,
            config,
            audit,
            cancel: CancellationToken::new(),
        }
    }

    /// Share an external token; cancelling it stops runs before their next step.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    fn executor(&self) -> PlanExecutor {
        PlanExecutor::new(self.config.step_timeout()).with_cancellation(self.cancel.child_token())
    }

    /// One audit event per step plus one for the run as a whole.
    fn audit_plan<S>(&self, event_type: AuditEventType, resource: &str, report: &PlanReport<S>) {
        for record in &report.steps {
            let (result, detail) = match &record.outcome {
                StepOutcome::Succeeded => (AuditResult::Success, None),
                StepOutcome::Failed(message) if record.foundational => (AuditResult::Error, Some(message.clone())),
                StepOutcome::Failed(message) => (AuditResult::Failure, Some(message.clone())),
                StepOutcome::Skipped(reason) => (AuditResult::Skipped, Some(format!("{:?}", reason))),
            };
            self.audit.log_step(event_type, resource, &record.name, result, detail.as_deref());
        }
        self.audit_run(event_type, resource, report.status, report.errors.len());
    }

    fn audit_run(&self, event_type: AuditEventType, resource: &str, status: OutcomeStatus, error_count: usize) {
        let result = match status {
            OutcomeStatus::Success => AuditResult::Success,
            OutcomeStatus::PartialFailure => AuditResult::Failure,
            OutcomeStatus::Error => AuditResult::Error,
        };
        let event = AuditEvent::new(event_type, "run", result)
            .resource(resource)
            .detail(format!("{} ({} errors)", status, error_count));
        self.audit.log_event(&event);
    }
}
