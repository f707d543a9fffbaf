//! Crate-wide error type.
//!
//! Each subsystem owns a precise error enum; [`ContractflowError`] wraps them
//! all so applications can propagate with `?` and still recover a stable code.

use thiserror::Error;

use crate::config::ConfigError;
use crate::contracts::{codes, ContractError, ContractErrorInfo};
use crate::mapping::MappingError;
use crate::pipeline::WorkflowError;
use crate::stages::StageError;
use crate::validation::ValidationFailure;

/// Code for mapping template errors raised outside a workflow.
pub const MAPPING_CODE: &str = "MAPPING-001";
/// Code for stage errors raised outside a workflow.
pub const STAGE_CODE: &str = "STAGE-001";
/// Code for configuration errors.
pub const CONFIG_CODE: &str = "CONFIG-001";

/// The main error type for contractflow operations.
#[derive(Debug, Error)]
pub enum ContractflowError {
    /// A contract could not be loaded.
    #[error(transparent)]
    Contract(#[from] ContractError),

    /// Data failed strict validation.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// A mapping template could not be projected.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A workflow was rejected, aborted or cancelled.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// A stage failed when called directly.
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Executor configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ContractflowError {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Contract(err) => err.code(),
            Self::Validation(_) => codes::VALIDATION,
            Self::Mapping(_) => MAPPING_CODE,
            Self::Workflow(err) => err.code(),
            Self::Stage(_) => STAGE_CODE,
            Self::Config(_) => CONFIG_CODE,
        }
    }

    /// Diagnostic summary suitable for logs or API responses.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::Contract(err) => err.error_info(),
            Self::Workflow(err) => err.error_info(),
            Self::Validation(failure) => ContractErrorInfo::new(self.code(), failure.to_string())
                .with_context("stage_id", serde_json::json!(failure.stage_id))
                .with_context("field", serde_json::json!(failure.field()))
                .with_context("violations", serde_json::json!(failure.violations.len())),
            Self::Stage(err) => {
                let info = ContractErrorInfo::new(self.code(), err.message.clone())
                    .with_context("retryable", serde_json::json!(err.retryable));
                match &err.code {
                    Some(code) => info.with_context("stage_code", serde_json::json!(code)),
                    None => info,
                }
            }
            Self::Mapping(_) | Self::Config(_) => ContractErrorInfo::new(self.code(), self.to_string()),
        }
    }

    /// True when retrying the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Stage(err) => err.retryable,
            Self::Contract(ContractError::SourceUnavailable { .. }) => true,
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T, E = ContractflowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{Direction, ValidationReport, Violation};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_codes_follow_the_wrapped_error() {
        let err: ContractflowError = ContractError::ContractNotFound {
            stage_id: "tts".to_string(),
        }
        .into();
        assert_eq!(err.code(), codes::NOT_FOUND);
        assert!(err.to_string().contains("tts"));

        let failure = ValidationReport::from_violations(vec![Violation::required_missing(
            "text", "string", None,
        )])
        .into_result("tts", Direction::Input)
        .unwrap_err();
        let err = ContractflowError::from(failure);
        assert_eq!(err.code(), codes::VALIDATION);
        let info = err.error_info();
        assert_eq!(info.context["field"], serde_json::json!("text"));
    }

    #[test]
    fn test_stage_errors_carry_retryability() {
        let err = ContractflowError::from(StageError::new("busy").with_code("RATE_LIMIT"));
        assert!(err.is_retryable());
        assert_eq!(err.code(), STAGE_CODE);
        assert_eq!(err.error_info().context["stage_code"], serde_json::json!("RATE_LIMIT"));

        let err = ContractflowError::from(StageError::fatal("bad input"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_question_mark_conversion() {
        fn parse() -> Result<crate::config::ExecutorConfig> {
            Ok(crate::config::ExecutorConfig::from_json_str("{not json")?)
        }
        let err = parse().unwrap_err();
        assert_eq!(err.code(), CONFIG_CODE);
    }
}
