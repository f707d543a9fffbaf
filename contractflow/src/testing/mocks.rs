//! Stage doubles for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::stages::{Stage, StageError};

/// Returns a configurable output and records every input it receives.
#[derive(Debug)]
pub struct MockStage {
    id: String,
    output: Mutex<Value>,
    inputs: Mutex<Vec<Value>>,
}

impl MockStage {
    /// Creates a stage returning `output`.
    #[must_use]
    pub fn new(id: impl Into<String>, output: Value) -> Self {
        Self {
            id: id.into(),
            output: Mutex::new(output),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Changes the output for later calls.
    pub fn set_output(&self, output: Value) {
        *self.output.lock() = output;
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Every input received, in order.
    #[must_use]
    pub fn inputs(&self) -> Vec<Value> {
        self.inputs.lock().clone()
    }

    /// The most recent input.
    #[must_use]
    pub fn last_input(&self) -> Option<Value> {
        self.inputs.lock().last().cloned()
    }
}

#[async_trait]
impl Stage for MockStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, input: Value) -> Result<Value, StageError> {
        self.inputs.lock().push(input);
        Ok(self.output.lock().clone())
    }
}

/// Always fails.
#[derive(Debug)]
pub struct FailingStage {
    id: String,
    error: StageError,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Fails with a retryable error.
    #[must_use]
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: StageError::new(message),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails with an error that is never retried.
    #[must_use]
    pub fn fatal(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: StageError::fatal(message),
            ..Self::new(id, "")
        }
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _input: Value) -> Result<Value, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Sleeps before answering.
#[derive(Debug)]
pub struct SlowStage {
    id: String,
    delay: Duration,
    output: Value,
}

impl SlowStage {
    /// Creates a stage that answers `output` after `delay`.
    #[must_use]
    pub fn new(id: impl Into<String>, delay: Duration, output: Value) -> Self {
        Self {
            id: id.into(),
            delay,
            output,
        }
    }

    /// Same, with the delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(id: impl Into<String>, ms: u64, output: Value) -> Self {
        Self::new(id, Duration::from_millis(ms), output)
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _input: Value) -> Result<Value, StageError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.output.clone())
    }
}

/// Fails a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStage {
    id: String,
    failures: usize,
    output: Value,
    calls: AtomicUsize,
}

impl FlakyStage {
    /// Fails the first `failures` calls, then returns `output`.
    #[must_use]
    pub fn new(id: impl Into<String>, failures: usize, output: Value) -> Self {
        Self {
            id: id.into(),
            failures,
            output,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FlakyStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, _input: Value) -> Result<Value, StageError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(StageError::new(format!("transient failure {call}")))
        } else {
            Ok(self.output.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_stage_records_inputs() {
        let stage = MockStage::new("m", json!({"ok": true}));
        assert_eq!(stage.invoke(json!({"n": 1})).await.unwrap(), json!({"ok": true}));
        stage.set_output(json!({"ok": false}));
        assert_eq!(stage.invoke(json!({"n": 2})).await.unwrap(), json!({"ok": false}));

        assert_eq!(stage.call_count(), 2);
        assert_eq!(stage.last_input(), Some(json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_failing_and_flaky_stages() {
        let failing = FailingStage::fatal("f", "nope");
        let err = failing.invoke(json!({})).await.unwrap_err();
        assert!(!err.retryable);
        assert_eq!(failing.call_count(), 1);

        let flaky = FlakyStage::new("k", 2, json!(1));
        assert!(flaky.invoke(json!({})).await.is_err());
        assert!(flaky.invoke(json!({})).await.is_err());
        assert_eq!(flaky.invoke(json!({})).await.unwrap(), json!(1));
        assert_eq!(flaky.call_count(), 3);
    }
}
