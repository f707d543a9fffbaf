//! Sequential, contract-gated workflow execution.
//!
//! Each step resolves its input from the running accumulator, validates it,
//! invokes the stage (the only suspension point), validates the output and
//! merges it back. Steps never overlap within a run; independent runs may
//! share one executor.

use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::{
    ExecutionContext, FailurePolicy, RetryConfig, StageStep, StepError, StepErrorCode, StepResult,
    WorkflowDefinition, WorkflowError, WorkflowResult, WorkflowState, WorkflowStatus,
};
use crate::cancellation::CancellationToken;
use crate::config::ExecutorConfig;
use crate::contracts::{Contract, ContractStore};
use crate::events::{EventSink, NoOpEventSink, WorkflowEvent};
use crate::mapping::FieldResolver;
use crate::stages::{Stage, StageError, StageRegistry};
use crate::validation::{Direction, StrictValidator};

/// Reserved key carrying step metadata in the invocation input.
pub const META_KEY: &str = "_meta";

/// Runs workflow definitions against registered stages.
pub struct PipelineExecutor {
    contracts: Arc<ContractStore>,
    stages: Arc<StageRegistry>,
    validator: Arc<StrictValidator>,
    events: Arc<dyn EventSink>,
    config: ExecutorConfig,
    input_resolver: FieldResolver,
    output_resolver: FieldResolver,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("contracts", &self.contracts)
            .field("stages", &self.stages.ids())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// How an invocation attempt went wrong.
enum InvocationFailure {
    Stage(StageError),
    Timeout(Duration),
}

impl InvocationFailure {
    fn retryable(&self) -> bool {
        match self {
            Self::Stage(err) => err.retryable,
            Self::Timeout(_) => true,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Stage(err) => err.message.clone(),
            Self::Timeout(limit) => format!("invocation exceeded {}ms", limit.as_millis()),
        }
    }

    fn into_step_error(self, stage_id: &str) -> StepError {
        match self {
            Self::Stage(err) => StepError::new(
                StepErrorCode::StageInvocationFailed,
                format!("Stage '{stage_id}' failed: {}", err.message),
            )
            .with_details(json!({
                "code": err.code,
                "details": err.details,
                "retryable": err.retryable,
            })),
            Self::Timeout(limit) => StepError::new(
                StepErrorCode::StageTimeout,
                format!("Stage '{stage_id}' timed out after {}ms", limit.as_millis()),
            )
            .with_details(json!({ "timeout_ms": u64::try_from(limit.as_millis()).unwrap_or(u64::MAX) })),
        }
    }
}

/// What a step contributes besides its result.
struct StepOutcome {
    result: StepResult,
    contribution: Option<Map<String, Value>>,
}

/// Per-step inputs that stay fixed across attempts.
struct StepPlan<'a> {
    index: usize,
    step_id: String,
    step: &'a StageStep,
    contract: &'a Contract,
}

impl PipelineExecutor {
    /// Creates an executor with default validator, config and no-op events.
    #[must_use]
    pub fn new(contracts: Arc<ContractStore>, stages: Arc<StageRegistry>) -> Self {
        let config = ExecutorConfig::default();
        Self {
            contracts,
            stages,
            validator: Arc::new(StrictValidator::new()),
            events: Arc::new(NoOpEventSink),
            input_resolver: config.input_resolver(),
            output_resolver: config.output_resolver(),
            config,
        }
    }

    /// Uses a custom validator (extra types or business rules).
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<StrictValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Sends events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "Applying invalid executor configuration");
        }
        self.input_resolver = config.input_resolver();
        self.output_resolver = config.output_resolver();
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The contract store consulted before each run.
    #[must_use]
    pub fn contracts(&self) -> &Arc<ContractStore> {
        &self.contracts
    }

    /// The stage registry.
    #[must_use]
    pub fn stages(&self) -> &Arc<StageRegistry> {
        &self.stages
    }

    /// Executes `definition` seeded with `input`.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        input: Value,
    ) -> Result<WorkflowResult, WorkflowError> {
        self.execute_with_cancellation(definition, input, &CancellationToken::new())
            .await
    }

    /// Executes `definition`, checking `token` before every step.
    pub async fn execute_with_cancellation(
        &self,
        definition: &WorkflowDefinition,
        input: Value,
        token: &CancellationToken,
    ) -> Result<WorkflowResult, WorkflowError> {
        let contracts = self.prepare(definition)?;
        let workflow_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "workflow",
            workflow_id = %workflow_id,
            name = definition.name.as_deref().unwrap_or("unnamed"),
            steps = definition.len()
        );
        self.run(definition, &contracts, input, token, workflow_id)
            .instrument(span)
            .await
    }

    /// Structural checks plus one contract snapshot per step.
    fn prepare(&self, definition: &WorkflowDefinition) -> Result<Vec<Arc<Contract>>, WorkflowError> {
        definition.validate()?;
        definition
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                self.contracts.load(&step.stage_id).map_err(|err| {
                    warn!(step_index = index, stage_id = %step.stage_id, error = %err, "Step contract unavailable");
                    WorkflowError::InvalidStepDefinition {
                        step_index: index,
                        stage_id: Some(step.stage_id.clone()),
                        reason: format!("contract could not be loaded: {err}"),
                        source: Some(err),
                    }
                })
            })
            .collect()
    }

    async fn run(
        &self,
        definition: &WorkflowDefinition,
        contracts: &[Arc<Contract>],
        input: Value,
        token: &CancellationToken,
        workflow_id: String,
    ) -> Result<WorkflowResult, WorkflowError> {
        let mut ctx = ExecutionContext::new(workflow_id.clone(), definition.len());
        ctx.transition(WorkflowState::Running);
        info!("Workflow started");
        self.emit(WorkflowEvent::WorkflowStarted {
            workflow_id: workflow_id.clone(),
            total_steps: definition.len(),
            timestamp: ctx.started_at(),
        })
        .await;

        let mut data = input.clone();
        for (index, (step, contract)) in definition.steps.iter().zip(contracts).enumerate() {
            if token.is_cancelled() {
                let reason = token.reason().unwrap_or_default();
                ctx.transition(WorkflowState::Failed);
                warn!(step_index = index, %reason, "Workflow cancelled");
                let error = WorkflowError::Cancelled {
                    workflow_id: workflow_id.clone(),
                    step_index: index,
                    reason,
                    results: ctx.into_history(),
                };
                self.emit_failed(&workflow_id, &error).await;
                return Err(error);
            }

            let plan = StepPlan {
                index,
                step_id: step.step_id(index),
                step,
                contract,
            };
            ctx.begin_step(index);
            self.emit(WorkflowEvent::StepStarted {
                workflow_id: workflow_id.clone(),
                step_index: index,
                step_id: plan.step_id.clone(),
                stage_id: step.stage_id.clone(),
            })
            .await;

            let span = info_span!("step", step_index = index, stage_id = %step.stage_id);
            let outcome = self.run_step(&mut ctx, &plan, &data).instrument(span).await;
            let result = outcome.result;
            if let Some(contribution) = outcome.contribution {
                merge_into(&mut data, contribution);
            }

            ctx.finish_step(result.clone());
            let failed = !result.is_success();
            if failed {
                warn!(
                    step_index = index,
                    stage_id = %step.stage_id,
                    error = ?result.error.as_ref().map(ToString::to_string),
                    "Step failed"
                );
                self.emit(WorkflowEvent::StepFailed {
                    workflow_id: workflow_id.clone(),
                    result: result.clone(),
                })
                .await;
            } else {
                info!(step_index = index, stage_id = %step.stage_id, duration_ms = result.duration_ms, "Step completed");
                self.emit(WorkflowEvent::StepCompleted {
                    workflow_id: workflow_id.clone(),
                    result: result.clone(),
                })
                .await;
            }
            self.emit(WorkflowEvent::WorkflowProgress {
                workflow_id: workflow_id.clone(),
                completed_steps: ctx.completed_steps(),
                total_steps: ctx.total_steps(),
                progress: ctx.progress(),
            })
            .await;

            if failed && step.on_failure == FailurePolicy::Abort {
                ctx.transition(WorkflowState::Failed);
                let cause = result.error.clone().unwrap_or_else(|| {
                    StepError::new(StepErrorCode::StageInvocationFailed, "step failed")
                });
                let error = WorkflowError::StepExecutionFailed {
                    workflow_id: workflow_id.clone(),
                    stage_id: step.stage_id.clone(),
                    step_index: index,
                    cause,
                    results: ctx.into_history(),
                };
                self.emit_failed(&workflow_id, &error).await;
                return Err(error);
            }
        }

        ctx.transition(WorkflowState::Completed);
        let duration_ms = ctx.elapsed_ms();
        let progress = ctx.progress();
        let started_at = ctx.started_at();
        let steps = ctx.into_history();
        let failed_steps = steps.iter().filter(|r| !r.is_success()).count();
        let status = if failed_steps == 0 {
            WorkflowStatus::Success
        } else {
            WorkflowStatus::Partial
        };

        info!(?status, failed_steps, duration_ms, "Workflow completed");
        self.emit(WorkflowEvent::WorkflowCompleted {
            workflow_id: workflow_id.clone(),
            status,
            progress,
            duration_ms,
        })
        .await;

        Ok(WorkflowResult {
            workflow_id,
            status,
            final_output: WorkflowResult::last_success_output(&steps),
            final_data: data,
            successful_steps: steps.len() - failed_steps,
            failed_steps,
            steps,
            started_at,
            completed_at: Utc::now(),
            duration_ms,
            definition: definition.clone(),
            initial_input: input,
        })
    }

    async fn run_step(&self, ctx: &mut ExecutionContext, plan: &StepPlan<'_>, data: &Value) -> StepOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        let stage_id = plan.step.stage_id.as_str();
        let finish = |attempts: u32, outcome: Result<(Value, Map<String, Value>), StepError>| {
            let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
            match outcome {
                Ok((output, contribution)) => StepOutcome {
                    result: StepResult::success(
                        plan.index, &plan.step_id, stage_id, started_at, duration_ms, attempts, output,
                    ),
                    contribution: Some(contribution),
                },
                Err(error) => StepOutcome {
                    result: StepResult::failure(
                        plan.index, &plan.step_id, stage_id, started_at, duration_ms, attempts, error,
                    ),
                    contribution: None,
                },
            }
        };

        let resolved = match self.resolve_input(plan.step, data) {
            Ok(resolved) => resolved,
            Err(error) => return finish(0, Err(error)),
        };

        if let Err(failure) = self.validator.validate(&resolved, plan.contract, Direction::Input) {
            debug!(violations = failure.violations.len(), "Input rejected");
            return finish(
                0,
                Err(StepError::from_validation(StepErrorCode::InputValidationFailed, &failure)),
            );
        }

        let Some(stage) = self.stages.get(stage_id) else {
            return finish(
                0,
                Err(StepError::new(
                    StepErrorCode::StageNotFound,
                    format!("No stage implementation registered for '{stage_id}'"),
                )),
            );
        };

        let invocation_input = build_invocation_input(resolved, plan, ctx.workflow_id());
        let (invoked, attempts) = self.invoke_with_retry(ctx, plan, stage.as_ref(), &invocation_input).await;
        let output = match invoked {
            Ok(output) => output,
            Err(error) => return finish(attempts, Err(error)),
        };

        if let Err(failure) = self.validator.validate(&output, plan.contract, Direction::Output) {
            debug!(violations = failure.violations.len(), "Output rejected");
            return finish(
                attempts,
                Err(StepError::from_validation(StepErrorCode::OutputValidationFailed, &failure)),
            );
        }

        let contribution = match &plan.step.output_mapping {
            Some(template) => match self.output_resolver.project(template, &output) {
                Ok(Value::Object(mapped)) => mapped,
                Ok(_) => Map::new(),
                Err(err) => {
                    return finish(
                        attempts,
                        Err(StepError::new(StepErrorCode::OutputValidationFailed, err.to_string())),
                    )
                }
            },
            None => {
                let mut bucket = Map::new();
                bucket.insert(self.config.bucket_key(stage_id), output.clone());
                bucket
            }
        };

        finish(attempts, Ok((output, contribution)))
    }

    fn resolve_input(&self, step: &StageStep, data: &Value) -> Result<Value, StepError> {
        match &step.input_mapping {
            None => Ok(data.clone()),
            Some(template) => self.input_resolver.project(template, data).map_err(|err| {
                StepError::new(StepErrorCode::InputValidationFailed, err.to_string())
            }),
        }
    }

    /// Invokes with timeout and retries. Returns the outcome and attempts made.
    async fn invoke_with_retry(
        &self,
        ctx: &mut ExecutionContext,
        plan: &StepPlan<'_>,
        stage: &dyn Stage,
        input: &Value,
    ) -> (Result<Value, StepError>, u32) {
        let retry = plan.step.retry.clone().unwrap_or_else(RetryConfig::none);
        let timeout = plan
            .step
            .timeout_ms
            .map(Duration::from_millis)
            .or_else(|| plan.contract.timeout())
            .or_else(|| self.config.default_step_timeout());

        let mut attempt: u32 = 1;
        loop {
            match self.invoke_once(ctx, plan, stage, input.clone(), timeout).await {
                Ok(output) => return (Ok(output), attempt),
                Err(failure) if failure.retryable() && retry.allows_retry_after(attempt) => {
                    let delay = retry.delay_after(attempt);
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(attempt, delay_ms, error = %failure.message(), "Retrying stage invocation");
                    self.emit(WorkflowEvent::StepRetrying {
                        workflow_id: ctx.workflow_id().to_string(),
                        step_index: plan.index,
                        stage_id: plan.step.stage_id.clone(),
                        attempt,
                        delay_ms,
                        error: failure.message(),
                    })
                    .await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return (Err(failure.into_step_error(&plan.step.stage_id)), attempt),
            }
        }
    }

    /// One invocation, with bounded progress ticks while it is outstanding.
    async fn invoke_once(
        &self,
        ctx: &mut ExecutionContext,
        plan: &StepPlan<'_>,
        stage: &dyn Stage,
        input: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, InvocationFailure> {
        let call = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, invoke_guarded(stage, input)).await {
                    Ok(result) => result.map_err(InvocationFailure::Stage),
                    Err(_) => Err(InvocationFailure::Timeout(limit)),
                },
                None => invoke_guarded(stage, input).await.map_err(InvocationFailure::Stage),
            }
        };
        tokio::pin!(call);

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.tick_interval(),
            self.config.tick_interval(),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u32 = 0;

        loop {
            tokio::select! {
                biased;
                outcome = &mut call => return outcome,
                _ = ticker.tick(), if ticks < self.config.max_progress_ticks => {
                    ticks += 1;
                    if let Some(progress) = ctx.tick(
                        self.config.progress_tick_increment,
                        self.config.max_in_flight_progress,
                    ) {
                        // Sinks are not awaited here; the call must keep being polled.
                        self.events.try_emit(&WorkflowEvent::StepProgress {
                            workflow_id: ctx.workflow_id().to_string(),
                            step_index: plan.index,
                            stage_id: plan.step.stage_id.clone(),
                            step_progress: ctx.step_progress(),
                            progress,
                        });
                    }
                }
            }
        }
    }

    async fn emit(&self, event: WorkflowEvent) {
        self.events.emit(&event).await;
    }

    async fn emit_failed(&self, workflow_id: &str, error: &WorkflowError) {
        warn!(code = error.code(), error = %error, "Workflow failed");
        self.emit(WorkflowEvent::WorkflowFailed {
            workflow_id: workflow_id.to_string(),
            step_index: error.step_index(),
            error: error.to_string(),
        })
        .await;
    }
}

/// Calls the stage, turning a panic into a fatal stage error.
async fn invoke_guarded(stage: &dyn Stage, input: Value) -> Result<Value, StageError> {
    match AssertUnwindSafe(stage.invoke(input)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(stage_id = stage.id(), %reason, "Stage panicked");
            Err(StageError::fatal(format!("stage panicked: {reason}")))
        }
    }
}

/// Resolved input plus absent static config keys plus `_meta`.
fn build_invocation_input(resolved: Value, plan: &StepPlan<'_>, workflow_id: &str) -> Value {
    let mut fields = match resolved {
        Value::Object(fields) => fields,
        other => {
            let mut wrapped = Map::new();
            wrapped.insert("input".to_string(), other);
            wrapped
        }
    };
    for (key, value) in &plan.step.config {
        fields.entry(key.clone()).or_insert_with(|| value.clone());
    }
    fields.insert(
        META_KEY.to_string(),
        json!({
            "step_id": plan.step_id,
            "workflow_id": workflow_id,
            "step_index": plan.index,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    Value::Object(fields)
}

/// Shallow-merges a step's contribution into the accumulator.
fn merge_into(data: &mut Value, contribution: Map<String, Value>) {
    match data {
        Value::Object(fields) => fields.extend(contribution),
        other => *other = Value::Object(contribution),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_invocation_input_keeps_resolved_fields() {
        let step = StageStep::new("tts")
            .with_config("voice", json!("alloy"))
            .with_config("format", json!("mp3"));
        let contract = Contract::new("tts", "1.0.0", "speech");
        let plan = StepPlan {
            index: 2,
            step_id: step.step_id(2),
            step: &step,
            contract: &contract,
        };

        let input = build_invocation_input(json!({"text": "hi", "voice": "nova"}), &plan, "wf-1");
        assert_eq!(input["voice"], json!("nova"));
        assert_eq!(input["format"], json!("mp3"));
        assert_eq!(input[META_KEY]["step_id"], json!("tts#2"));
        assert_eq!(input[META_KEY]["workflow_id"], json!("wf-1"));
        assert_eq!(input[META_KEY]["step_index"], json!(2));
        assert!(input[META_KEY]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_fatal_error() {
        let stage = crate::stages::FnStage::new("boom", |input: Value| async move {
            if input.get("explode").is_some() {
                panic!("stage exploded");
            }
            Ok::<_, StageError>(input)
        });

        let err = invoke_guarded(&stage, json!({"explode": true})).await.unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("stage exploded"));
        assert_eq!(invoke_guarded(&stage, json!({"a": 1})).await.unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_merge_into_overwrites_shallowly() {
        let mut data = json!({"a": 1, "nested": {"x": 1}});
        let mut contribution = Map::new();
        contribution.insert("nested".to_string(), json!({"y": 2}));
        contribution.insert("b".to_string(), json!(2));
        merge_into(&mut data, contribution);
        assert_eq!(data, json!({"a": 1, "b": 2, "nested": {"y": 2}}));

        let mut scalar = json!("seed");
        merge_into(&mut scalar, Map::new());
        assert_eq!(scalar, json!({}));
    }
}
