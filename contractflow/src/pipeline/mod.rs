//! Workflow definitions and the pipeline executor.
//!
//! This module provides:
//! - Workflow definitions (ordered stage steps with mappings and policies)
//! - The sequential executor with progress, retries and timeouts
//! - Per-run execution context
//! - Step and workflow results

mod context;
mod definition;
mod error;
mod executor;
mod result;
mod retry;


pub use context::{ContextSnapshot, ExecutionContext, WorkflowState};
pub use definition::{FailurePolicy, StageStep, WorkflowDefinition};
pub use error::WorkflowError;
pub use executor::{PipelineExecutor, META_KEY};
pub use result::{StepError, StepErrorCode, StepResult, StepStatus, WorkflowResult, WorkflowStatus};
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig};
