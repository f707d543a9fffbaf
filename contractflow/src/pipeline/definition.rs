//! Workflow definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use super::{RetryConfig, WorkflowError};

/// What happens to the run when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and surface a workflow error.
    #[default]
    Abort,
    /// Record the failure and move on with the accumulator unchanged.
    Continue,
}

/// One stage invocation within a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStep {
    /// Optional explicit step id; derived from the stage id otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Stage to invoke.
    pub stage_id: String,
    /// Static configuration merged into the invocation input.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub config: Map<String, Value>,
    /// Target field to source path or literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mapping: Option<Value>,
    /// Accumulator field to result path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mapping: Option<Value>,
    /// Failure policy.
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Retry policy for invocation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    /// Deadline overriding the contract's timeout hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl StageStep {
    /// Creates a step with default settings.
    #[must_use]
    pub fn new(stage_id: impl Into<String>) -> Self {
        Self {
            id: None,
            stage_id: stage_id.into(),
            config: Map::new(),
            input_mapping: None,
            output_mapping: None,
            on_failure: FailurePolicy::Abort,
            retry: None,
            timeout_ms: None,
        }
    }

    /// Sets the step id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds a static config entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Sets the input mapping template.
    #[must_use]
    pub fn with_input_mapping(mut self, template: Value) -> Self {
        self.input_mapping = Some(template);
        self
    }

    /// Sets the output mapping template.
    #[must_use]
    pub fn with_output_mapping(mut self, template: Value) -> Self {
        self.output_mapping = Some(template);
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the step deadline.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Explicit id, or `<stage_id>#<index>`.
    #[must_use]
    pub fn step_id(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}#{index}", self.stage_id))
    }

    fn check(&self, index: usize) -> Result<(), WorkflowError> {
        let invalid = |reason: &str| WorkflowError::InvalidStepDefinition {
            step_index: index,
            stage_id: Some(self.stage_id.clone()).filter(|id| !id.trim().is_empty()),
            reason: reason.to_string(),
            source: None,
        };

        if self.stage_id.trim().is_empty() {
            return Err(invalid("step has no stage id"));
        }
        if self.input_mapping.as_ref().is_some_and(|m| !m.is_object()) {
            return Err(invalid("input mapping must be a JSON object"));
        }
        if self.output_mapping.as_ref().is_some_and(|m| !m.is_object()) {
            return Err(invalid("output mapping must be a JSON object"));
        }
        if self.retry.as_ref().is_some_and(|r| r.max_attempts == 0) {
            return Err(invalid("retry max_attempts must be at least 1"));
        }
        if self.timeout_ms == Some(0) {
            return Err(invalid("timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

/// An ordered list of steps forming one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Optional label used in logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Steps, executed in order.
    pub steps: Vec<StageStep>,
}

impl WorkflowDefinition {
    /// Creates a definition from steps.
    #[must_use]
    pub fn new(steps: Vec<StageStep>) -> Self {
        Self { name: None, steps }
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: StageStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Parses a JSON definition.
    pub fn from_json_str(raw: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(raw).map_err(|e| WorkflowError::InvalidWorkflowDefinition {
            reason: e.to_string(),
        })
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when there are no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Structural checks that need no contracts.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::InvalidWorkflowDefinition {
                reason: "workflow has no steps".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            step.check(index)?;
            if let Some(id) = &step.id {
                if !seen.insert(id.as_str()) {
                    return Err(WorkflowError::InvalidStepDefinition {
                        step_index: index,
                        stage_id: Some(step.stage_id.clone()),
                        reason: format!("duplicate step id '{id}'"),
                        source: None,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_json_definition() {
        let def = WorkflowDefinition::from_json_str(
            r#"{
                "name": "daily",
                "steps": [
                    {"stage_id": "trend", "output_mapping": {"trend": "trend"}},
                    {"stage_id": "script", "on_failure": "continue",
                     "config": {"tone": "casual"},
                     "retry": {"max_attempts": 2, "jitter": "none"},
                     "timeout_ms": 5000}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(def.len(), 2);
        assert_eq!(def.steps[0].on_failure, FailurePolicy::Abort);
        assert_eq!(def.steps[1].on_failure, FailurePolicy::Continue);
        assert_eq!(def.steps[1].config.get("tone"), Some(&json!("casual")));
        assert_eq!(def.steps[1].retry.as_ref().map(|r| r.max_attempts), Some(2));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_empty_definition_rejected() {
        let err = WorkflowDefinition::default().validate().unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidWorkflowDefinition { .. }));
    }

    #[test]
    fn test_step_checks() {
        let def = WorkflowDefinition::new(vec![StageStep::new("a"), StageStep::new("  ")]);
        let err = def.validate().unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidStepDefinition { step_index: 1, stage_id: None, .. }
        ));

        let def = WorkflowDefinition::new(vec![StageStep::new("a").with_input_mapping(json!("x"))]);
        assert!(def.validate().is_err());

        let def = WorkflowDefinition::new(vec![
            StageStep::new("a").with_id("same"),
            StageStep::new("b").with_id("same"),
        ]);
        assert!(matches!(
            def.validate().unwrap_err(),
            WorkflowError::InvalidStepDefinition { step_index: 1, .. }
        ));
    }

    #[test]
    fn test_step_id_derivation() {
        assert_eq!(StageStep::new("tts").step_id(2), "tts#2");
        assert_eq!(StageStep::new("tts").with_id("voice").step_id(2), "voice");
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            WorkflowDefinition::from_json_str("{\"steps\": 3}"),
            Err(WorkflowError::InvalidWorkflowDefinition { .. })
        ));
    }
}
