// Ordered step executor with dependency tracking
use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Serialize, Deserialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AdapterError, PlanError};
use crate::orchestrator::OutcomeStatus;

/// Body of one plan step; reads and extends the shared run state.
#[async_trait]
pub trait StepAction<S: Send>: Send + Sync {
    async fn run(&self, state: &mut S) -> Result<(), AdapterError>;
}

/// One step of a provisioning plan
pub struct PlanStep<S: Send> {
    pub name: String,
    /// A failure here makes the whole run an error.
    pub foundational: bool,
    /// Steps that must have succeeded first.
    pub depends_on: Vec<String>,
    pub precondition: Option<fn(&S) -> bool>,
    pub action: Box<dyn StepAction<S>>,
}

impl<S: Send> PlanStep<S> {
    pub fn new(name: &str, action: impl StepAction<S> + 'static) -> Self {
        Self {
            name: name.to_string(),
            foundational: false,
            depends_on: Vec::new(),
            precondition: None,
            action: Box::new(action),
        }
    }

    pub fn foundational(mut self) -> Self {
        self.foundational = true;
        self
    }

    pub fn depends_on(mut self, steps: &[&str]) -> Self {
        self.depends_on.extend(steps.iter().map(|s| s.to_string()));
        self
    }

    /// Run only when `check` holds for the state at that point.
    pub fn when(mut self, check: fn(&S) -> bool) -> Self {
        self.precondition = Some(check);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Named dependency did not succeed.
    DependencyFailed(String),
    PreconditionNotMet,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub foundational: bool,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// Everything a plan run produced
#[derive(Debug, Clone)]
pub struct PlanReport<S> {
    pub state: S,
    pub status: OutcomeStatus,
    pub steps: Vec<StepRecord>,
    /// One entry per failed or cancelled step, in execution order.
    pub errors: Vec<String>,
}

impl<S> PlanReport<S> {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn succeeded(&self, name: &str) -> bool {
        matches!(self.step(name).map(|s| &s.outcome), Some(StepOutcome::Succeeded))
    }
}

/// Runs plan steps strictly in declaration order.
#[derive(Debug, Clone)]
pub struct PlanExecutor {
    step_timeout: Duration,
    cancel: CancellationToken,
}

impl PlanExecutor {
    pub fn new(step_timeout: Duration) -> Self {
        Self {
            step_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Names must be unique and dependencies must point backwards.
    pub fn validate<S: Send>(steps: &[PlanStep<S>]) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for step in steps {
            for dependency in &step.depends_on {
                if !seen.contains(dependency.as_str()) {
                    return Err(PlanError::UnknownDependency {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
            if !seen.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateStep(step.name.clone()));
            }
        }
        Ok(())
    }

    pub async fn execute<S: Send>(&self, steps: Vec<PlanStep<S>>, mut state: S) -> Result<PlanReport<S>, PlanError> {
        Self::validate(&steps)?;

        let mut records: Vec<StepRecord> = Vec::with_capacity(steps.len());
        let mut errors = Vec::new();
        let mut foundation_failed = false;

        for step in &steps {
            let started = Instant::now();
            let outcome = self.run_step(step, &records, &mut state).await;

            match &outcome {
                StepOutcome::Succeeded => info!(step = %step.name, "Plan step succeeded"),
                StepOutcome::Failed(message) => {
                    warn!(step = %step.name, error = %message, "Plan step failed");
                    errors.push(format!("{} failed: {}", step.name, message));
                }
                StepOutcome::Skipped(SkipReason::Cancelled) => {
                    warn!(step = %step.name, "Plan step cancelled");
                    errors.push(format!("{} cancelled before completion", step.name));
                }
                StepOutcome::Skipped(reason) => debug!(step = %step.name, reason = ?reason, "Plan step skipped"),
            }

            if step.foundational && outcome != StepOutcome::Succeeded {
                foundation_failed = true;
            }

            records.push(StepRecord {
                name: step.name.clone(),
                foundational: step.foundational,
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let succeeded = records.iter().filter(|r| r.outcome == StepOutcome::Succeeded).count();
        let status = if foundation_failed {
            OutcomeStatus::Error
        } else if errors.is_empty() {
            OutcomeStatus::Success
        } else if succeeded > 0 {
            OutcomeStatus::PartialFailure
        } else {
            OutcomeStatus::Error
        };

        Ok(PlanReport {
            state,
            status,
            steps: records,
            errors,
        })
    }

    async fn run_step<S: Send>(&self, step: &PlanStep<S>, records: &[StepRecord], state: &mut S) -> StepOutcome {
        if let Some(dependency) = step.depends_on.iter().find(|dep| {
            !records
                .iter()
                .any(|r| &r.name == *dep && r.outcome == StepOutcome::Succeeded)
        }) {
            return StepOutcome::Skipped(SkipReason::DependencyFailed(dependency.clone()));
        }

        if let Some(check) = step.precondition {
            if !check(state) {
                return StepOutcome::Skipped(SkipReason::PreconditionNotMet);
            }
        }

        if self.cancel.is_cancelled() {
            return StepOutcome::Skipped(SkipReason::Cancelled);
        }

        tokio::select! {
            _ = self.cancel.cancelled() => StepOutcome::Skipped(SkipReason::Cancelled),
            result = tokio::time::timeout(self.step_timeout, step.action.run(state)) => match result {
                Ok(Ok(())) => StepOutcome::Succeeded,
                Ok(Err(e)) => StepOutcome::Failed(e.to_string()),
                Err(_) => StepOutcome::Failed(format!("timed out after {:?}", self.step_timeout)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Trace {
        ran: Vec<&'static str>,
        flag: bool,
    }

    struct Record {
        name: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl StepAction<Trace> for Record {
        async fn run(&self, state: &mut Trace) -> Result<(), AdapterError> {
            state.ran.push(self.name);
            if self.fail {
                Err(AdapterError::Http { status: 500, body: "internal error".into() })
            } else {
                Ok(())
            }
        }
    }

    struct Hang;

    #[async_trait]
    impl StepAction<Trace> for Hang {
        async fn run(&self, _state: &mut Trace) -> Result<(), AdapterError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn step(name: &'static str, fail: bool) -> PlanStep<Trace> {
        PlanStep::new(name, Record { name, fail })
    }

    #[test]
    fn validation_rejects_forward_and_duplicate_names() {
        let forward = vec![step("a", false).depends_on(&["b"]), step("b", false)];
        assert_eq!(
            PlanExecutor::validate(&forward),
            Err(PlanError::UnknownDependency { step: "a".into(), dependency: "b".into() })
        );

        let duplicate = vec![step("a", false), step("a", false)];
        assert_eq!(PlanExecutor::validate(&duplicate), Err(PlanError::DuplicateStep("a".into())));
    }

    #[tokio::test]
    async fn dependents_of_failed_steps_are_skipped() {
        let steps = vec![
            step("base", false).foundational(),
            step("mid", true).depends_on(&["base"]),
            step("leaf", false).depends_on(&["mid"]),
            step("side", false).depends_on(&["base"]),
        ];

        let report = PlanExecutor::new(Duration::from_secs(5))
            .execute(steps, Trace::default())
            .await
            .unwrap();

        assert_eq!(report.state.ran, vec!["base", "mid", "side"]);
        assert_eq!(report.status, OutcomeStatus::PartialFailure);
        assert_eq!(report.errors, vec!["mid failed: HTTP 500: internal error"]);
        assert_eq!(
            report.step("leaf").unwrap().outcome,
            StepOutcome::Skipped(SkipReason::DependencyFailed("mid".into()))
        );
    }

    #[tokio::test]
    async fn foundation_failure_is_an_error() {
        let steps = vec![
            step("base", true).foundational(),
            step("child", false).depends_on(&["base"]),
            step("independent", false),
        ];

        let report = PlanExecutor::new(Duration::from_secs(5))
            .execute(steps, Trace::default())
            .await
            .unwrap();

        assert_eq!(report.status, OutcomeStatus::Error);
        assert_eq!(report.state.ran, vec!["base", "independent"]);
        assert!(report.succeeded("independent"));
    }

    #[tokio::test]
    async fn preconditions_gate_steps() {
        let steps = vec![step("optional", false).when(|t: &Trace| t.flag), step("always", false)];

        let report = PlanExecutor::new(Duration::from_secs(5))
            .execute(steps, Trace::default())
            .await
            .unwrap();

        assert_eq!(report.status, OutcomeStatus::Success);
        assert_eq!(report.step("optional").unwrap().outcome, StepOutcome::Skipped(SkipReason::PreconditionNotMet));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_steps_time_out() {
        let steps = vec![step("first", false), PlanStep::new("stuck", Hang)];

        let report = PlanExecutor::new(Duration::from_secs(30))
            .execute(steps, Trace::default())
            .await
            .unwrap();

        assert_eq!(report.status, OutcomeStatus::PartialFailure);
        assert!(report.errors[0].starts_with("stuck failed: timed out"));
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_steps() {
        let token = CancellationToken::new();
        token.cancel();
        let steps = vec![step("a", false), step("b", false)];

        let report = PlanExecutor::new(Duration::from_secs(5))
            .with_cancellation(token)
            .execute(steps, Trace::default())
            .await
            .unwrap();

        assert!(report.state.ran.is_empty());
        assert_eq!(report.status, OutcomeStatus::Error);
        assert_eq!(report.errors, vec!["a cancelled before completion", "b cancelled before completion"]);
    }
}
