//! Stage trait and implementations.
//!
//! A stage is an external unit of work resolved by id at invocation time.
//! It consumes validated input and produces output that is validated in
//! turn; how it computes that output is its own business.

mod registry;

pub use registry::StageRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use thiserror::Error;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// The stage id this implementation is registered under.
    fn id(&self) -> &str;

    /// Invokes the stage.
    ///
    /// `input` is the validated, mapped input merged with the step's static
    /// configuration and a reserved `_meta` object.
    async fn invoke(&self, input: Value) -> Result<Value, StageError>;
}

/// Error returned by a stage implementation.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct StageError {
    /// Human-readable message.
    pub message: String,
    /// Optional collaborator-specific code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Whether a step retry policy may re-invoke the stage.
    pub retryable: bool,
}

impl StageError {
    /// Creates a retryable error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
            retryable: true,
        }
    }

    /// Creates an error that is never retried.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(message)
        }
    }

    /// Sets the code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<anyhow::Error> for StageError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// A stage backed by an async closure.
pub struct FnStage<F, Fut> {
    id: String,
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStage<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StageError>> + Send + 'static,
{
    /// Wraps `func` as the stage `id`.
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
            _marker: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnStage<F, Fut> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("id", &self.id).finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F, Fut>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StageError>> + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value) -> Result<Value, StageError> {
        (self.func)(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("upper", |input: Value| async move {
            let text = input["text"].as_str().unwrap_or_default().to_uppercase();
            Ok(json!({ "text": text }))
        });

        assert_eq!(stage.id(), "upper");
        let output = stage.invoke(json!({"text": "abc"})).await.unwrap();
        assert_eq!(output, json!({"text": "ABC"}));
    }

    #[tokio::test]
    async fn test_fn_stage_with_anyhow() {
        let stage = FnStage::new("broken", |_input: Value| async move {
            let parsed: Result<Value, StageError> = serde_json::from_str::<Value>("{")
                .map_err(|e| anyhow::Error::new(e).context("decoding provider reply").into());
            parsed
        });

        let err = stage.invoke(json!({})).await.unwrap_err();
        assert!(err.message.starts_with("decoding provider reply"));
        assert!(err.retryable);
    }

    #[test]
    fn test_stage_error_builders() {
        let err = StageError::fatal("quota exhausted")
            .with_code("QUOTA")
            .with_details(json!({"limit": 10}));
        assert!(!err.retryable);
        assert_eq!(err.code.as_deref(), Some("QUOTA"));
        assert_eq!(err.to_string(), "quota exhausted");
    }
}
