//! Step and workflow results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

use super::WorkflowDefinition;
use crate::validation::ValidationFailure;

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Output validated and merged.
    Success,
    /// Any failure along the step's path.
    Failed,
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepErrorCode {
    /// Mapped input was rejected by the contract.
    InputValidationFailed,
    /// Stage output was rejected by the contract or could not be mapped.
    OutputValidationFailed,
    /// No implementation registered for the stage id.
    StageNotFound,
    /// The stage returned an error.
    StageInvocationFailed,
    /// The invocation exceeded its deadline.
    StageTimeout,
}

impl fmt::Display for StepErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InputValidationFailed => "InputValidationFailed",
            Self::OutputValidationFailed => "OutputValidationFailed",
            Self::StageNotFound => "StageNotFound",
            Self::StageInvocationFailed => "StageInvocationFailed",
            Self::StageTimeout => "StageTimeout",
        };
        f.write_str(name)
    }
}

/// Error descriptor carried by a failed [`StepResult`].
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct StepError {
    /// Category.
    pub code: StepErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context (violations, stage error details, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl StepError {
    /// Creates an error without details.
    #[must_use]
    pub fn new(code: StepErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Wraps a validation failure, keeping the first violation and the
    /// complete list.
    #[must_use]
    pub fn from_validation(code: StepErrorCode, failure: &ValidationFailure) -> Self {
        Self::new(code, failure.to_string()).with_details(json!({
            "field": failure.field(),
            "expected": failure.first.expected,
            "received": failure.first.received,
            "violations": failure.violations,
        }))
    }
}

/// Result of one step attempt sequence. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the definition.
    pub step_index: usize,
    /// Step id (explicit or derived).
    pub step_id: String,
    /// Stage that ran.
    pub stage_id: String,
    /// Outcome.
    pub status: StepStatus,
    /// When the step started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Invocation attempts made (0 if the stage was never invoked).
    pub attempts: u32,
    /// Stage output, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure descriptor, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepResult {
    /// Builds a successful result.
    #[must_use]
    pub fn success(
        step_index: usize,
        step_id: impl Into<String>,
        stage_id: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        attempts: u32,
        output: Value,
    ) -> Self {
        Self {
            step_index,
            step_id: step_id.into(),
            stage_id: stage_id.into(),
            status: StepStatus::Success,
            started_at,
            duration_ms,
            attempts,
            output: Some(output),
            error: None,
        }
    }

    /// Builds a failed result.
    #[must_use]
    pub fn failure(
        step_index: usize,
        step_id: impl Into<String>,
        stage_id: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        attempts: u32,
        error: StepError,
    ) -> Self {
        Self {
            step_index,
            step_id: step_id.into(),
            stage_id: stage_id.into(),
            status: StepStatus::Failed,
            started_at,
            duration_ms,
            attempts,
            output: None,
            error: Some(error),
        }
    }

    /// True for [`StepStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Failure code, if failed.
    #[must_use]
    pub fn error_code(&self) -> Option<StepErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Overall status of a run that was not aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// No step failed.
    Success,
    /// At least one step failed under the `continue` policy.
    Partial,
}

/// Final aggregate of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// Run id.
    pub workflow_id: String,
    /// Overall status.
    pub status: WorkflowStatus,
    /// Output of the last successful step.
    pub final_output: Option<Value>,
    /// Accumulated data after the last step.
    pub final_data: Value,
    /// Every step result, in order.
    pub steps: Vec<StepResult>,
    /// Count of successful steps.
    pub successful_steps: usize,
    /// Count of failed steps.
    pub failed_steps: usize,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
    /// Total duration.
    pub duration_ms: u64,
    /// Definition that ran.
    pub definition: WorkflowDefinition,
    /// Input the run was seeded with.
    pub initial_input: Value,
}

impl WorkflowResult {
    /// True when no step failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Success
    }

    /// Result of the step at `index`.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.step_index == index)
    }

    /// Output of the last successful step, scanning backward.
    #[must_use]
    pub fn last_success_output(steps: &[StepResult]) -> Option<Value> {
        steps
            .iter()
            .rev()
            .find(|r| r.is_success())
            .and_then(|r| r.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{Direction, ValidationReport, Violation};

    fn ok(index: usize, output: Value) -> StepResult {
        StepResult::success(index, format!("s{index}"), "stage", Utc::now(), 1, 1, output)
    }

    fn failed(index: usize) -> StepResult {
        StepResult::failure(
            index,
            format!("s{index}"),
            "stage",
            Utc::now(),
            1,
            1,
            StepError::new(StepErrorCode::StageInvocationFailed, "boom"),
        )
    }

    #[test]
    fn test_last_success_scans_backward() {
        let steps = vec![ok(0, json!({"a": 1})), ok(1, json!({"b": 2})), failed(2)];
        assert_eq!(WorkflowResult::last_success_output(&steps), Some(json!({"b": 2})));
        assert_eq!(WorkflowResult::last_success_output(&[failed(0)]), None);
    }

    #[test]
    fn test_step_error_from_validation() {
        let failure = ValidationReport::from_violations(vec![Violation::required_missing(
            "b", "number", None,
        )])
        .into_result("ab", Direction::Input)
        .unwrap_err();

        let err = StepError::from_validation(StepErrorCode::InputValidationFailed, &failure);
        let details = err.details.unwrap();
        assert_eq!(details["field"], json!("b"));
        assert_eq!(details["received"], json!("undefined"));
        assert_eq!(details["violations"].as_array().map(Vec::len), Some(1));
        assert!(err.message.contains("Required field 'b' is missing"));
    }

    #[test]
    fn test_step_result_serializes_lowercase_status() {
        let value = serde_json::to_value(failed(0)).unwrap();
        assert_eq!(value["status"], json!("failed"));
        assert_eq!(value["error"]["code"], json!("StageInvocationFailed"));
        assert!(value.get("output").is_none());
    }
}
