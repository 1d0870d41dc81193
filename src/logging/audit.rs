// Audit trail for provisioning actions
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{info, warn, error};

/// Audit event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    TenantProvisioning,
    StackDeployment,
    FabricSetup,
    VolumeManagement,
}

/// Audit result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Skipped,
    Failure,
    Error,
}

/// Audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_type: AuditEventType,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub resource: Option<String>,
    pub result: AuditResult,
    pub detail: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, action: &str, result: AuditResult) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            action: action.to_string(),
            resource: None,
            result,
            detail: None,
        }
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit logger
#[derive(Debug, Clone)]
pub struct AuditLogger {
    enabled: bool,
}

impl AuditLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    /// Log audit event
    pub fn log_event(&self, event: &AuditEvent) {
        if !self.enabled {
            return;
        }

        let resource = event.resource.as_deref().unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("");

        match event.result {
            AuditResult::Success | AuditResult::Skipped => {
                info!(
                    event_id = %event.event_id,
                    event_type = ?event.event_type,
                    action = %event.action,
                    resource = %resource,
                    result = ?event.result,
                    "Audit event"
                );
            }
            AuditResult::Failure => {
                warn!(
                    event_id = %event.event_id,
                    event_type = ?event.event_type,
                    action = %event.action,
                    resource = %resource,
                    detail = %detail,
                    "Audit event: action failed"
                );
            }
            AuditResult::Error => {
                error!(
                    event_id = %event.event_id,
                    event_type = ?event.event_type,
                    action = %event.action,
                    resource = %resource,
                    detail = %detail,
                    "Audit event: foundation failure"
                );
            }
        }
    }

    /// Log the outcome of one plan step
    pub fn log_step(&self, event_type: AuditEventType, resource: &str, step: &str, result: AuditResult, detail: Option<&str>) {
        let mut event = AuditEvent::new(event_type, step, result).resource(resource);
        if let Some(detail) = detail {
            event = event.detail(detail);
        }
        self.log_event(&event);
    }
}
