//! Contract fixtures and an executor harness.
//!
//! The fixtures describe a small content pipeline:
//! `trend` (topic -> trend) then `script` (trend -> script) then
//! `audio` (text -> audio file).

use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::ExecutorConfig;
use crate::contracts::{ContractSource, ContractStore, InMemoryContractSource};
use crate::events::{CollectingEventSink, EventSink};
use crate::pipeline::{PipelineExecutor, StageStep, WorkflowDefinition};
use crate::stages::{Stage, StageRegistry};

/// Descriptor for the `trend` stage.
#[must_use]
pub fn trend_contract() -> Value {
    json!({
        "name": "trend",
        "version": "1.0.0",
        "description": "Picks a trending angle for a topic",
        "input": {
            "required": { "topic": { "type": "string", "min_length": 1 } },
            "optional": {}
        },
        "output": {
            "fields": {
                "trend": { "type": "string" },
                "score": { "type": "number", "min": 0, "max": 1 }
            }
        }
    })
}

/// Descriptor for the `script` stage.
#[must_use]
pub fn script_contract() -> Value {
    json!({
        "name": "script",
        "version": "1.2.0",
        "description": "Writes a narration script",
        "input": {
            "required": { "trend": { "type": "string" } },
            "optional": { "voice": { "type": "enum", "values": ["nova", "alloy"] } }
        },
        "output": {
            "fields": {
                "script": { "type": "string", "min_length": 1 },
                "stats": {
                    "type": "object",
                    "required_fields": { "words": { "type": "integer", "min": 1 } }
                }
            }
        }
    })
}

/// Descriptor for the `audio` stage.
#[must_use]
pub fn audio_contract() -> Value {
    json!({
        "name": "audio",
        "version": "0.3.1",
        "description": "Synthesises narration audio",
        "input": {
            "required": { "text": { "type": "string" } },
            "optional": {}
        },
        "output": {
            "fields": {
                "audio_url": { "type": "url" },
                "duration": { "type": "number", "min": 0 }
            }
        }
    })
}

/// A source holding the three content pipeline contracts.
#[must_use]
pub fn content_source() -> InMemoryContractSource {
    InMemoryContractSource::new()
        .with("trend", trend_contract())
        .with("script", script_contract())
        .with("audio", audio_contract())
}

/// Valid outputs for each content stage.
#[must_use]
pub fn trend_output() -> Value {
    json!({"trend": "rust in embedded", "score": 0.9, "internal_rank": 3})
}

/// See [`trend_output`].
#[must_use]
pub fn script_output() -> Value {
    json!({"script": "Rust is everywhere.", "stats": {"words": 3}, "draft": true})
}

/// See [`trend_output`].
#[must_use]
pub fn audio_output() -> Value {
    json!({"audio_url": "https://cdn.example.com/a.mp3", "duration": 2.5})
}

/// The three-step content workflow.
///
/// `audio` reads its text from `text_path` in the accumulator, so tests can
/// make it depend on step 2 (`"script"`) or only on step 1 (`"trend"`).
#[must_use]
pub fn content_workflow(text_path: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(vec![
        StageStep::new("trend").with_output_mapping(json!({"trend": "trend"})),
        StageStep::new("script")
            .with_input_mapping(json!({"trend": "trend", "voice": "voice"}))
            .with_output_mapping(json!({"script": "script", "word_count": "stats.words"})),
        StageStep::new("audio").with_input_mapping(json!({"text": text_path})),
    ])
    .with_name("content")
}

/// Contract store, stage registry and collected events for one test.
#[derive(Debug)]
pub struct TestHarness {
    /// Contract store.
    pub contracts: Arc<ContractStore>,
    /// Stage registry.
    pub stages: Arc<StageRegistry>,
    /// Every event emitted by executors built from this harness.
    pub events: Arc<CollectingEventSink>,
    /// Executor configuration (fast progress ticks).
    pub config: ExecutorConfig,
}

impl TestHarness {
    /// Harness over `source` with a 5ms progress tick.
    #[must_use]
    pub fn new(source: impl ContractSource + 'static) -> Self {
        Self {
            contracts: Arc::new(ContractStore::new(Arc::new(source))),
            stages: Arc::new(StageRegistry::new()),
            events: Arc::new(CollectingEventSink::new()),
            config: ExecutorConfig::default().with_progress_tick_interval_ms(5),
        }
    }

    /// Harness over [`content_source`].
    #[must_use]
    pub fn content() -> Self {
        Self::new(content_source())
    }

    /// Registers a shared stage so the test can inspect it afterwards.
    #[must_use]
    pub fn with_stage(self, stage: Arc<dyn Stage>) -> Self {
        self.stages.register_arc(stage);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds an executor wired to the harness.
    #[must_use]
    pub fn executor(&self) -> PipelineExecutor {
        PipelineExecutor::new(Arc::clone(&self.contracts), Arc::clone(&self.stages))
            .with_config(self.config.clone())
            .with_event_sink(Arc::clone(&self.events) as Arc<dyn EventSink>)
    }
}
