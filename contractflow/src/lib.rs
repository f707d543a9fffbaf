//! # Contractflow
//!
//! A contract-driven pipeline executor.
//!
//! Every stage publishes a declarative contract describing the input it
//! accepts and the output it promises. A workflow is an ordered list of
//! steps; between steps data flows only through explicit field mappings and
//! is strictly validated against the contracts on both sides of each stage.
//!
//! The crate is organised around four parts:
//!
//! - **Contract store** ([`contracts`]): loads, checks and caches contracts
//! - **Strict validator** ([`validation`]): reports every violation, never coerces
//! - **Field resolver** ([`mapping`]): dotted paths, literals and templates
//! - **Pipeline executor** ([`pipeline`]): sequential runs with progress events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contractflow::prelude::*;
//! use std::sync::Arc;
//!
//! let contracts = Arc::new(ContractStore::new(Arc::new(
//!     DirectoryContractSource::new("contracts/"),
//! )));
//! let stages = Arc::new(StageRegistry::new().with(TrendStage).with(ScriptStage));
//!
//! let definition = WorkflowDefinition::new(vec![
//!     StageStep::new("trend").with_output_mapping(json!({"trend": "trend"})),
//!     StageStep::new("script").with_input_mapping(json!({"trend": "trend"})),
//! ]);
//!
//! let executor = PipelineExecutor::new(contracts, stages)
//!     .with_event_sink(Arc::new(LoggingEventSink::info()));
//! let result = executor.execute(&definition, json!({"topic": "rust"})).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod mapping;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::ExecutorConfig;
    pub use crate::contracts::{
        Contract, ContractError, ContractErrorInfo, ContractSource, ContractStore,
        DirectoryContractSource, FieldSpec, InMemoryContractSource,
    };
    pub use crate::errors::ContractflowError;
    pub use crate::events::{
        CollectingEventSink, EventBus, EventSink, LoggingEventSink, NoOpEventSink, WorkflowEvent,
    };
    pub use crate::mapping::{FieldResolver, MissingPathPolicy};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        FailurePolicy, PipelineExecutor, RetryConfig, StageStep, StepError, StepErrorCode,
        StepResult, WorkflowDefinition, WorkflowError, WorkflowResult, WorkflowStatus,
    };
    pub use crate::stages::{FnStage, Stage, StageError, StageRegistry};
    pub use crate::validation::{Direction, StrictValidator, ValidationFailure, ValidationReport};
    pub use serde_json::{json, Value};
}
