//! Workflow-level errors.

use serde_json::json;
use thiserror::Error;

use super::{StepError, StepResult};
use crate::contracts::{codes, ContractError, ContractErrorInfo};

/// Errors that end a run without a [`super::WorkflowResult`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    /// The definition as a whole is unusable.
    #[error("Invalid workflow definition: {reason}")]
    InvalidWorkflowDefinition {
        /// What is wrong.
        reason: String,
    },

    /// One step is unusable; nothing has run.
    #[error("Invalid step definition at index {step_index}: {reason}")]
    InvalidStepDefinition {
        /// Position of the step.
        step_index: usize,
        /// Stage id, when the step has one.
        stage_id: Option<String>,
        /// What is wrong.
        reason: String,
        /// Contract failure behind it, if any.
        #[source]
        source: Option<ContractError>,
    },

    /// A step failed under the `abort` policy.
    #[error("Workflow '{workflow_id}' aborted at step {step_index} ('{stage_id}'): {cause}")]
    StepExecutionFailed {
        /// Run id.
        workflow_id: String,
        /// Failing stage.
        stage_id: String,
        /// Failing step position.
        step_index: usize,
        /// Underlying failure.
        #[source]
        cause: StepError,
        /// Results recorded up to and including the failing step.
        results: Vec<StepResult>,
    },

    /// The cancellation token fired between steps.
    #[error("Workflow '{workflow_id}' cancelled before step {step_index}: {reason}")]
    Cancelled {
        /// Run id.
        workflow_id: String,
        /// First step that did not run.
        step_index: usize,
        /// Cancellation reason.
        reason: String,
        /// Results recorded before cancellation.
        results: Vec<StepResult>,
    },
}

impl WorkflowError {
    /// Stable diagnostic code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidWorkflowDefinition { .. } => codes::WORKFLOW_DEFINITION,
            Self::InvalidStepDefinition { .. } => codes::STEP_DEFINITION,
            Self::StepExecutionFailed { .. } => codes::STEP_FAILED,
            Self::Cancelled { .. } => codes::CANCELLED,
        }
    }

    /// Step results produced before the run ended.
    #[must_use]
    pub fn results(&self) -> &[StepResult] {
        match self {
            Self::StepExecutionFailed { results, .. } | Self::Cancelled { results, .. } => results,
            Self::InvalidWorkflowDefinition { .. } | Self::InvalidStepDefinition { .. } => &[],
        }
    }

    /// Index of the step the error refers to.
    #[must_use]
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::InvalidWorkflowDefinition { .. } => None,
            Self::InvalidStepDefinition { step_index, .. }
            | Self::StepExecutionFailed { step_index, .. }
            | Self::Cancelled { step_index, .. } => Some(*step_index),
        }
    }

    /// Structured diagnostics.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let info = ContractErrorInfo::new(self.code(), self.to_string());
        match self {
            Self::InvalidWorkflowDefinition { .. } => {
                info.with_fix_hint("Provide at least one step, each naming a stage id.")
            }
            Self::InvalidStepDefinition {
                step_index,
                stage_id,
                source,
                ..
            } => {
                let info = info
                    .with_context("step_index", json!(step_index))
                    .with_context("stage_id", json!(stage_id));
                match source {
                    Some(err) => info
                        .with_context("contract_code", json!(err.code()))
                        .with_fix_hint("Make sure a valid contract exists for the stage."),
                    None => info,
                }
            }
            Self::StepExecutionFailed {
                stage_id,
                step_index,
                cause,
                ..
            } => info
                .with_context("stage_id", json!(stage_id))
                .with_context("step_index", json!(step_index))
                .with_context("step_error", json!(cause.code.to_string()))
                .with_fix_hint("Inspect the step error details, or mark the step 'continue'."),
            Self::Cancelled { step_index, .. } => {
                info.with_context("step_index", json!(step_index))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StepErrorCode;

    #[test]
    fn test_codes_and_context() {
        let err = WorkflowError::StepExecutionFailed {
            workflow_id: "wf".to_string(),
            stage_id: "tts".to_string(),
            step_index: 1,
            cause: StepError::new(StepErrorCode::StageTimeout, "deadline 10ms exceeded"),
            results: vec![],
        };
        assert_eq!(err.code(), codes::STEP_FAILED);
        assert_eq!(err.step_index(), Some(1));

        let info = err.error_info();
        assert_eq!(info.context["stage_id"], json!("tts"));
        assert_eq!(info.context["step_error"], json!("StageTimeout"));
        assert!(info.summary.contains("aborted at step 1 ('tts')"));
    }

    #[test]
    fn test_step_definition_keeps_contract_source() {
        let err = WorkflowError::InvalidStepDefinition {
            step_index: 0,
            stage_id: Some("ghost".to_string()),
            reason: "contract could not be loaded".to_string(),
            source: Some(ContractError::ContractNotFound {
                stage_id: "ghost".to_string(),
            }),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.error_info().context["contract_code"], json!(codes::NOT_FOUND));
        assert!(err.results().is_empty());
    }
}
