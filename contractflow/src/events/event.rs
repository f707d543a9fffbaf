//! Typed workflow events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{StepResult, WorkflowStatus};

/// Everything the executor reports to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run began.
    WorkflowStarted {
        /// Run id.
        workflow_id: String,
        /// Steps in the definition.
        total_steps: usize,
        /// When it began.
        timestamp: DateTime<Utc>,
    },
    /// A step began.
    StepStarted {
        /// Run id.
        workflow_id: String,
        /// Step position.
        step_index: usize,
        /// Step id.
        step_id: String,
        /// Stage id.
        stage_id: String,
    },
    /// In-flight progress of an outstanding invocation.
    StepProgress {
        /// Run id.
        workflow_id: String,
        /// Step position.
        step_index: usize,
        /// Stage id.
        stage_id: String,
        /// Step progress (0..100).
        step_progress: f64,
        /// Overall progress (0..=100).
        progress: f64,
    },
    /// An invocation failed and will be retried.
    StepRetrying {
        /// Run id.
        workflow_id: String,
        /// Step position.
        step_index: usize,
        /// Stage id.
        stage_id: String,
        /// Attempt that just failed (1-based).
        attempt: u32,
        /// Delay before the next attempt.
        delay_ms: u64,
        /// Failure message.
        error: String,
    },
    /// A step succeeded.
    StepCompleted {
        /// Run id.
        workflow_id: String,
        /// The result.
        result: StepResult,
    },
    /// A step failed.
    StepFailed {
        /// Run id.
        workflow_id: String,
        /// The result.
        result: StepResult,
    },
    /// Overall progress after a step boundary.
    WorkflowProgress {
        /// Run id.
        workflow_id: String,
        /// Steps processed.
        completed_steps: usize,
        /// Steps in the definition.
        total_steps: usize,
        /// Overall progress (0..=100).
        progress: f64,
    },
    /// The run finished.
    WorkflowCompleted {
        /// Run id.
        workflow_id: String,
        /// Final status.
        status: WorkflowStatus,
        /// Always 100.
        progress: f64,
        /// Run duration.
        duration_ms: u64,
    },
    /// The run was aborted or cancelled.
    WorkflowFailed {
        /// Run id.
        workflow_id: String,
        /// Step that ended the run.
        step_index: Option<usize>,
        /// Error message.
        error: String,
    },
}

impl WorkflowEvent {
    /// Dotted event name, e.g. `step.completed`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::WorkflowStarted { .. } => "workflow.started",
            Self::StepStarted { .. } => "step.started",
            Self::StepProgress { .. } => "step.progress",
            Self::StepRetrying { .. } => "step.retrying",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::WorkflowProgress { .. } => "workflow.progress",
            Self::WorkflowCompleted { .. } => "workflow.completed",
            Self::WorkflowFailed { .. } => "workflow.failed",
        }
    }

    /// Run id carried by every event.
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        match self {
            Self::WorkflowStarted { workflow_id, .. }
            | Self::StepStarted { workflow_id, .. }
            | Self::StepProgress { workflow_id, .. }
            | Self::StepRetrying { workflow_id, .. }
            | Self::StepCompleted { workflow_id, .. }
            | Self::StepFailed { workflow_id, .. }
            | Self::WorkflowProgress { workflow_id, .. }
            | Self::WorkflowCompleted { workflow_id, .. }
            | Self::WorkflowFailed { workflow_id, .. } => workflow_id,
        }
    }

    /// Overall progress, for events that carry it.
    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::StepProgress { progress, .. }
            | Self::WorkflowProgress { progress, .. }
            | Self::WorkflowCompleted { progress, .. } => Some(*progress),
            _ => None,
        }
    }
}
