//! Contract store errors and shared diagnostic metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Structured metadata attached to surfaced contract and workflow errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContractErrorInfo {
    /// Stable identifier that maps to a runbook entry.
    pub code: String,
    /// Human-readable description of the issue.
    pub summary: String,
    /// Optional remediation guidance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Optional documentation link.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    /// Arbitrary structured data for downstream tooling.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
}

impl ContractErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            doc_url: None,
            context: HashMap::new(),
        }
    }

    /// Adds a fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a documentation URL.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Stable error codes.
pub mod codes {
    /// No descriptor exists for the stage.
    pub const NOT_FOUND: &str = "CONTRACT-001-NOT_FOUND";
    /// Descriptor could not be parsed into a contract.
    pub const MALFORMED: &str = "CONTRACT-002-MALFORMED";
    /// Version does not match the semver pattern.
    pub const VERSION: &str = "CONTRACT-003-VERSION";
    /// A mandatory section is missing.
    pub const STRUCTURE: &str = "CONTRACT-004-STRUCTURE";
    /// The contract source failed to answer.
    pub const SOURCE: &str = "CONTRACT-005-SOURCE";
    /// Data failed strict validation.
    pub const VALIDATION: &str = "VALIDATION-001";
    /// Workflow definition is invalid.
    pub const WORKFLOW_DEFINITION: &str = "WORKFLOW-001-DEFINITION";
    /// A step definition is invalid.
    pub const STEP_DEFINITION: &str = "WORKFLOW-002-STEP";
    /// A step failed under the abort policy.
    pub const STEP_FAILED: &str = "WORKFLOW-003-STEP_FAILED";
    /// The run was cancelled between steps.
    pub const CANCELLED: &str = "WORKFLOW-004-CANCELLED";
}

/// Errors raised while loading or validating a contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    /// No descriptor exists for the stage id.
    #[error("Contract not found for stage '{stage_id}'")]
    ContractNotFound {
        /// The requested stage id.
        stage_id: String,
    },

    /// The descriptor exists but cannot be parsed.
    #[error("Malformed contract for stage '{stage_id}': {reason}")]
    ContractMalformed {
        /// The stage id.
        stage_id: String,
        /// Parser message.
        reason: String,
    },

    /// The version string is not semver.
    #[error("Invalid version '{version}' in contract for stage '{stage_id}'")]
    InvalidVersion {
        /// The stage id.
        stage_id: String,
        /// The offending version.
        version: String,
    },

    /// A mandatory section is missing or empty.
    #[error("Invalid contract structure for stage '{stage_id}': missing {missing}")]
    InvalidContractStructure {
        /// The stage id.
        stage_id: String,
        /// The missing section(s).
        missing: String,
    },

    /// The contract source itself failed.
    #[error("Contract source unavailable for stage '{stage_id}': {reason}")]
    SourceUnavailable {
        /// The stage id.
        stage_id: String,
        /// Underlying message.
        reason: String,
    },
}

impl ContractError {
    /// Returns the stage id the error refers to.
    #[must_use]
    pub fn stage_id(&self) -> &str {
        match self {
            Self::ContractNotFound { stage_id }
            | Self::ContractMalformed { stage_id, .. }
            | Self::InvalidVersion { stage_id, .. }
            | Self::InvalidContractStructure { stage_id, .. }
            | Self::SourceUnavailable { stage_id, .. } => stage_id,
        }
    }

    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ContractNotFound { .. } => codes::NOT_FOUND,
            Self::ContractMalformed { .. } => codes::MALFORMED,
            Self::InvalidVersion { .. } => codes::VERSION,
            Self::InvalidContractStructure { .. } => codes::STRUCTURE,
            Self::SourceUnavailable { .. } => codes::SOURCE,
        }
    }

    /// Builds diagnostic metadata for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        let info = ContractErrorInfo::new(self.code(), self.to_string())
            .with_context("stage_id", serde_json::json!(self.stage_id()));
        match self {
            Self::ContractNotFound { .. } => info.with_fix_hint(
                "Register a contract descriptor for the stage or fix the stage id in the workflow.",
            ),
            Self::InvalidVersion { .. } => {
                info.with_fix_hint("Use a major.minor.patch version such as 1.0.0.")
            }
            Self::InvalidContractStructure { .. } => info.with_fix_hint(
                "Contracts must declare name, version, description, input and output.",
            ),
            Self::ContractMalformed { .. } | Self::SourceUnavailable { .. } => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_builder() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Try this fix")
            .with_doc_url("https://docs.example.com")
            .with_context("stage", serde_json::json!("fetch"));

        assert_eq!(info.fix_hint, Some("Try this fix".to_string()));
        assert_eq!(info.doc_url, Some("https://docs.example.com".to_string()));
        assert_eq!(info.context.get("stage"), Some(&serde_json::json!("fetch")));
    }

    #[test]
    fn test_contract_error_codes() {
        let err = ContractError::InvalidVersion {
            stage_id: "tts".to_string(),
            version: "v1".to_string(),
        };
        assert_eq!(err.code(), codes::VERSION);
        assert_eq!(err.stage_id(), "tts");
        assert!(err.to_string().contains("'v1'"));

        let info = err.error_info();
        assert_eq!(info.code, codes::VERSION);
        assert!(info.fix_hint.is_some());
        assert_eq!(info.context.get("stage_id"), Some(&serde_json::json!("tts")));
    }

    #[test]
    fn test_error_info_serialization() {
        let info = ContractErrorInfo::new("TEST-001", "Test error").with_fix_hint("Fix it");

        let json = serde_json::to_string(&info).unwrap();
        let deserialized: ContractErrorInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(info, deserialized);
    }
}
