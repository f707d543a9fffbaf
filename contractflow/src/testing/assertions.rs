//! Assertions for workflow and step results.

use crate::pipeline::{StepErrorCode, StepResult, WorkflowResult, WorkflowStatus};

/// Asserts that the step succeeded.
pub fn assert_step_succeeded(result: &StepResult) {
    assert!(
        result.is_success(),
        "Expected step {} ('{}') to succeed, got {:?}",
        result.step_index,
        result.stage_id,
        result.error
    );
}

/// Asserts that the step failed with `code`.
pub fn assert_step_failed_with(result: &StepResult, code: StepErrorCode) {
    assert_eq!(
        result.error_code(),
        Some(code),
        "Expected step {} ('{}') to fail with {code}, got {:?}",
        result.step_index,
        result.stage_id,
        result.error
    );
}

/// Asserts the overall status and the success/failure counts.
pub fn assert_workflow(result: &WorkflowResult, status: WorkflowStatus, successes: usize, failures: usize) {
    assert_eq!(result.status, status, "Unexpected workflow status");
    assert_eq!(
        (result.successful_steps, result.failed_steps),
        (successes, failures),
        "Unexpected (success, failure) counts"
    );
}
